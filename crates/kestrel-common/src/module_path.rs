//! Dotted module paths (`std`, `geometry.shapes`).

use std::fmt;

use serde::Serialize;

/// The module a declaration lives in. The empty path is the root module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse `a.b.c`. An empty string is the root module.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self::new(dotted.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_displays_placeholder() {
        assert_eq!(ModulePath::root().to_string(), "<root>");
        assert_eq!(ModulePath::parse("").to_string(), "<root>");
    }

    #[test]
    fn dotted_round_trip() {
        let path = ModulePath::parse("geometry.shapes");
        assert_eq!(path.segments(), ["geometry", "shapes"]);
        assert_eq!(path.to_string(), "geometry.shapes");
        assert_eq!(ModulePath::parse("geometry").child("shapes"), path);
    }
}
