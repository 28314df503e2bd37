//! Every generic template seen during checking, kept as written so a later
//! specializer can instantiate the requested combinations.

use kestrel_ast::{FunctionDecl, StructDecl, TypeParam, UnionDecl};
use kestrel_common::ModulePath;
use rustc_hash::FxHashMap;

use crate::context::DefId;

#[derive(Debug, Clone)]
pub struct GenericTemplate<D> {
    pub def: DefId,
    pub module_path: ModulePath,
    pub decl: D,
}

/// A method from a `given` whose subject is a generic template.
#[derive(Debug, Clone)]
pub struct GenericExtensionMethod {
    pub subject: DefId,
    pub module_path: ModulePath,
    /// Parameters of the `given` itself, standing for the subject's
    /// arguments.
    pub type_params: Vec<TypeParam>,
    pub method: FunctionDecl,
}

#[derive(Debug, Clone, Default)]
pub struct GenericTemplateRegistry {
    pub struct_templates: FxHashMap<String, GenericTemplate<StructDecl>>,
    pub union_templates: FxHashMap<String, GenericTemplate<UnionDecl>>,
    pub function_templates: FxHashMap<String, GenericTemplate<FunctionDecl>>,
    /// Keyed by the subject template's name.
    pub extension_methods: FxHashMap<String, Vec<GenericExtensionMethod>>,
}

impl GenericTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_struct(&mut self, def: DefId, module_path: ModulePath, decl: StructDecl) {
        self.struct_templates
            .insert(decl.name.clone(), GenericTemplate { def, module_path, decl });
    }

    pub fn add_union(&mut self, def: DefId, module_path: ModulePath, decl: UnionDecl) {
        self.union_templates
            .insert(decl.name.clone(), GenericTemplate { def, module_path, decl });
    }

    pub fn add_function(&mut self, def: DefId, module_path: ModulePath, decl: FunctionDecl) {
        self.function_templates
            .insert(decl.name.clone(), GenericTemplate { def, module_path, decl });
    }

    pub fn add_extension_method(&mut self, subject_name: &str, method: GenericExtensionMethod) {
        self.extension_methods
            .entry(subject_name.to_string())
            .or_default()
            .push(method);
    }

    pub fn extension_method(&self, subject_name: &str, method: &str) -> Option<&GenericExtensionMethod> {
        self.extension_methods
            .get(subject_name)?
            .iter()
            .find(|m| m.method.name == method)
    }

    /// Template names of every kind, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .struct_templates
            .keys()
            .chain(self.union_templates.keys())
            .chain(self.function_templates.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.struct_templates.len()
            + self.union_templates.len()
            + self.function_templates.len()
            + self.extension_methods.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
