use std::path::Path;

use kestrel_common::ModulePath;
use serde::Deserialize;

/// How values of a generic parameter type are treated before the parameter
/// is specialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenericCopyPolicy {
    /// Generic values are duplicated on use and never moved.
    #[default]
    AssumeCopy,
    /// Generic values move like any non-copy value.
    AssumeMove,
}

/// Settings for a semantic-analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SemaConfig {
    pub generic_copy_policy: GenericCopyPolicy,
    /// Module that owns the builtin scalar types and `String`.
    pub std_module: String,
    /// Keep searching after the first infinite-size type is found.
    pub report_all_cycles: bool,
}

impl Default for SemaConfig {
    fn default() -> Self {
        SemaConfig {
            generic_copy_policy: GenericCopyPolicy::AssumeCopy,
            std_module: "std".to_string(),
            report_all_cycles: true,
        }
    }
}

impl SemaConfig {
    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<SemaConfig, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text. Missing keys take their
    /// defaults.
    pub fn from_toml_str(content: &str) -> Result<SemaConfig, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn std_module_path(&self) -> ModulePath {
        ModulePath::parse(&self.std_module)
    }
}
