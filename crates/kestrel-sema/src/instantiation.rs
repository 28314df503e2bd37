//! Requests for concrete specializations of generic templates.

use std::fmt;
use std::hash::{Hash, Hasher};

use kestrel_common::Span;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::context::DefId;
use crate::resolved::ResolvedTy;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstantiationKind {
    Struct,
    Union,
    Function,
    /// A method of a generic `given`, specialized with the subject's
    /// arguments.
    Method { name: String },
}

/// One template applied to fully concrete arguments. Two requests are equal
/// when kind, template and arguments agree; the span only records the first
/// site that asked.
#[derive(Debug, Clone, Serialize)]
pub struct InstantiationRequest {
    pub kind: InstantiationKind,
    #[serde(skip)]
    pub template: DefId,
    pub template_name: String,
    pub args: Vec<ResolvedTy>,
    pub span: Span,
}

impl PartialEq for InstantiationRequest {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.template == other.template && self.args == other.args
    }
}

impl Eq for InstantiationRequest {}

impl Hash for InstantiationRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.template.hash(state);
        self.args.hash(state);
    }
}

impl fmt::Display for InstantiationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let InstantiationKind::Method { name } = &self.kind {
            write!(f, "{}.{}", self.template_name, name)?;
        } else {
            write!(f, "{}", self.template_name)?;
        }
        write!(f, "[")?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, "]")
    }
}

/// Deduplicated requests in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct InstantiationSet {
    seen: FxHashSet<InstantiationRequest>,
    ordered: Vec<InstantiationRequest>,
}

impl InstantiationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the request was new.
    pub fn insert(&mut self, request: InstantiationRequest) -> bool {
        if self.seen.contains(&request) {
            return false;
        }
        tracing::trace!(request = %request, "instantiation");
        self.seen.insert(request.clone());
        self.ordered.push(request);
        true
    }

    pub fn contains(&self, request: &InstantiationRequest) -> bool {
        self.seen.contains(request)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstantiationRequest> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn into_vec(self) -> Vec<InstantiationRequest> {
        self.ordered
    }
}

impl Serialize for InstantiationSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ordered.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: Vec<ResolvedTy>, span: Span) -> InstantiationRequest {
        InstantiationRequest {
            kind: InstantiationKind::Function,
            template: DefId(3),
            template_name: "identity".into(),
            args,
            span,
        }
    }

    #[test]
    fn same_arguments_from_two_sites_collapse() {
        let mut set = InstantiationSet::new();
        assert!(set.insert(request(vec![ResolvedTy::Int], Span::new(0, 4))));
        assert!(!set.insert(request(vec![ResolvedTy::Int], Span::new(40, 44))));
        assert!(set.insert(request(vec![ResolvedTy::Bool], Span::new(50, 54))));
        assert_eq!(set.len(), 2);
        let first = set.iter().next().unwrap();
        assert_eq!(first.span, Span::new(0, 4));
        assert_eq!(first.to_string(), "identity[Int]");
    }

    #[test]
    fn method_requests_name_the_method() {
        let req = InstantiationRequest {
            kind: InstantiationKind::Method { name: "push".into() },
            template: DefId(1),
            template_name: "List".into(),
            args: vec![ResolvedTy::Float64],
            span: Span::default(),
        };
        assert_eq!(req.to_string(), "List.push[Float64]");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"]["kind"], "method");
        assert_eq!(json["template_name"], "List");
    }
}
