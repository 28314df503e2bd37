//! What semantic analysis hands to code generation.

use crate::instantiation::{InstantiationRequest, InstantiationSet};
use crate::registry::GenericTemplateRegistry;
use crate::typed::TypedProgram;

#[derive(Debug, Clone)]
pub struct TypeCheckerOutput {
    pub program: TypedProgram,
    /// Concrete specializations requested anywhere in the program, each
    /// template and argument list once.
    pub instantiation_requests: InstantiationSet,
    pub generic_templates: GenericTemplateRegistry,
}

impl TypeCheckerOutput {
    /// Requests for the template called `name`, in first-seen order.
    pub fn requests_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a InstantiationRequest> + 'a {
        self.instantiation_requests
            .iter()
            .filter(move |r| r.template_name == name)
    }
}
