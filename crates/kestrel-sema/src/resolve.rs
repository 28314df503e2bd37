//! Type annotations to [`Ty`].

use kestrel_ast::TypeNode;
use kestrel_common::Span;

use crate::context::{DefContext, DefKind};
use crate::error::{LocalError, SemanticErrorKind};
use crate::scope::Scope;
use crate::traits::TraitTable;
use crate::ty::{Param, Ty};

/// Resolves [`TypeNode`]s against a scope, the definition context and the
/// declared traits.
pub struct TypeResolver<'a> {
    pub ctx: &'a DefContext,
    pub traits: &'a TraitTable,
}

impl<'a> TypeResolver<'a> {
    pub fn new(ctx: &'a DefContext, traits: &'a TraitTable) -> Self {
        TypeResolver { ctx, traits }
    }

    pub fn resolve(&self, node: &TypeNode, scope: &Scope) -> Result<Ty, LocalError> {
        match node {
            TypeNode::Named { name, span } => self.named(name, *span, scope),
            TypeNode::Generic { base, args, span } => {
                if self.traits.contains(base) && scope.lookup_template(base).is_none() {
                    return Err(bare_trait(base, *span));
                }
                self.generic_instance(base, args, *span, scope)
            }
            TypeNode::Ref(inner) => match self.trait_object(inner, scope)? {
                Some(object) => Ok(Ty::Ref(Box::new(object))),
                None => Ok(Ty::Ref(Box::new(self.resolve(inner, scope)?))),
            },
            TypeNode::Ptr(inner) => Ok(Ty::Ptr(Box::new(self.resolve(inner, scope)?))),
            TypeNode::WeakRef(inner) => match self.trait_object(inner, scope)? {
                Some(object) => Ok(Ty::WeakRef(Box::new(object))),
                None => Ok(Ty::WeakRef(Box::new(self.resolve(inner, scope)?))),
            },
            TypeNode::Function { params, ret, .. } => {
                let params = params
                    .iter()
                    .map(|p| self.resolve(p, scope).map(|t| Param::new(t, false)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Ty::func(params, self.resolve(ret, scope)?))
            }
            TypeNode::SelfType { span } => scope.lookup_type("Self").ok_or_else(|| {
                LocalError::new(
                    SemanticErrorKind::generic("'Self' is only valid inside a trait or given"),
                    *span,
                )
            }),
        }
    }

    fn named(&self, name: &str, span: Span, scope: &Scope) -> Result<Ty, LocalError> {
        if let Some(ty) = scope.lookup_type(name) {
            return Ok(ty);
        }
        if let Some(template) = scope.lookup_template(name) {
            let arity = self.ctx.type_params(template).len();
            return Err(LocalError::new(
                SemanticErrorKind::generic(format!(
                    "Generic type '{name}' requires {arity} type argument(s)"
                )),
                span,
            ));
        }
        if self.traits.contains(name) {
            return Err(bare_trait(name, span));
        }
        Err(LocalError::new(
            SemanticErrorKind::UndefinedType {
                name: name.to_string(),
            },
            span,
        ))
    }

    fn generic_instance(
        &self,
        base: &str,
        args: &[TypeNode],
        span: Span,
        scope: &Scope,
    ) -> Result<Ty, LocalError> {
        let Some(template) = scope.lookup_template(base) else {
            return Err(LocalError::new(
                SemanticErrorKind::UndefinedType {
                    name: base.to_string(),
                },
                span,
            ));
        };
        let expected = self.ctx.type_params(template).len();
        if expected != args.len() {
            return Err(LocalError::new(
                SemanticErrorKind::generic(format!(
                    "Generic type '{base}' expects {expected} type argument(s), got {}",
                    args.len()
                )),
                span,
            ));
        }
        let args = args
            .iter()
            .map(|a| self.resolve(a, scope))
            .collect::<Result<Vec<_>, _>>()?;
        match self.ctx.get_kind(template) {
            Some(DefKind::StructTemplate) => Ok(Ty::GenericStruct { template, args }),
            Some(DefKind::UnionTemplate) => Ok(Ty::GenericUnion { template, args }),
            _ => Err(LocalError::new(
                SemanticErrorKind::generic(format!("'{base}' is not a generic type")),
                span,
            )),
        }
    }

    /// `Trait ref` and `Trait[Args] ref` denote trait objects, provided the
    /// name is not shadowed by a type and the trait is object safe.
    fn trait_object(&self, inner: &TypeNode, scope: &Scope) -> Result<Option<Ty>, LocalError> {
        let (name, arg_nodes, span) = match inner {
            TypeNode::Named { name, span } => (name, &[][..], *span),
            TypeNode::Generic { base, args, span } => (base, args.as_slice(), *span),
            _ => return Ok(None),
        };
        if !self.traits.contains(name)
            || scope.lookup_type(name).is_some()
            || scope.lookup_template(name).is_some()
        {
            return Ok(None);
        }
        if let Err(reasons) = self.traits.object_safety(name) {
            return Err(LocalError::new(
                SemanticErrorKind::generic(format!(
                    "Trait '{name}' is not object safe: {}",
                    reasons.join("; ")
                )),
                span,
            ));
        }
        let args = arg_nodes
            .iter()
            .map(|a| self.resolve(a, scope))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Ty::TraitObject {
            name: name.clone(),
            args,
        }))
    }
}

fn bare_trait(name: &str, span: Span) -> LocalError {
    LocalError::new(
        SemanticErrorKind::generic(format!(
            "Trait '{name}' cannot be used as a value type; use '{name} ref'"
        )),
        span,
    )
}
