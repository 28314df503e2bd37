//! Facts emitted while walking a body, solved later by
//! [`ConstraintSolver`](crate::solver::ConstraintSolver).

use kestrel_common::Span;
use rustc_hash::FxHashSet;

use crate::context::{DefContext, DefId};
use crate::ty::{Ty, TypeVar};

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Both sides must be the same type.
    Equal { lhs: Ty, rhs: Ty, span: Span },
    /// `var` is a use of `template` specialized with `args`.
    Instantiate {
        var: TypeVar,
        template: DefId,
        args: Vec<Ty>,
        span: Span,
    },
    TraitBound { ty: Ty, trait_name: String, span: Span },
    /// Pin to `Int` if nothing else decides the variable.
    DefaultInt { var: TypeVar, span: Span },
    /// Pin to `Float64` if nothing else decides the variable.
    DefaultFloat { var: TypeVar, span: Span },
}

impl Constraint {
    /// Solving order, lowest first.
    pub fn priority(&self) -> u8 {
        match self {
            Constraint::Equal { .. } => 0,
            Constraint::Instantiate { .. } => 1,
            Constraint::TraitBound { .. } => 2,
            Constraint::DefaultInt { .. } | Constraint::DefaultFloat { .. } => 10,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Constraint::DefaultInt { .. } | Constraint::DefaultFloat { .. })
    }

    pub fn span(&self) -> Span {
        match self {
            Constraint::Equal { span, .. }
            | Constraint::Instantiate { span, .. }
            | Constraint::TraitBound { span, .. }
            | Constraint::DefaultInt { span, .. }
            | Constraint::DefaultFloat { span, .. } => *span,
        }
    }

    pub fn involved_types(&self) -> Vec<Ty> {
        match self {
            Constraint::Equal { lhs, rhs, .. } => vec![lhs.clone(), rhs.clone()],
            Constraint::Instantiate { var, args, .. } => {
                let mut tys = vec![Ty::Var(var.clone())];
                tys.extend(args.iter().cloned());
                tys
            }
            Constraint::TraitBound { ty, .. } => vec![ty.clone()],
            Constraint::DefaultInt { var, .. } | Constraint::DefaultFloat { var, .. } => {
                vec![Ty::Var(var.clone())]
            }
        }
    }

    pub fn involved_type_variables(&self, ctx: &DefContext) -> FxHashSet<TypeVar> {
        self.involved_types()
            .iter()
            .flat_map(|t| t.free_type_variables(ctx))
            .collect()
    }

    pub fn describe(&self, ctx: &DefContext) -> String {
        match self {
            Constraint::Equal { lhs, rhs, .. } => {
                format!("{} = {}", lhs.display(ctx), rhs.display(ctx))
            }
            Constraint::Instantiate {
                var,
                template,
                args,
                ..
            } => {
                let args: Vec<String> = args.iter().map(|a| a.display(ctx).to_string()).collect();
                format!(
                    "{} ~ {}[{}]",
                    var,
                    ctx.get_name(*template).unwrap_or("<unknown>"),
                    args.join(", ")
                )
            }
            Constraint::TraitBound { ty, trait_name, .. } => {
                format!("{}: {}", ty.display(ctx), trait_name)
            }
            Constraint::DefaultInt { var, .. } => format!("{var} ?= Int"),
            Constraint::DefaultFloat { var, .. } => format!("{var} ?= Float64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefKind;
    use crate::ty::TypeVarGen;
    use kestrel_common::ModulePath;

    #[test]
    fn descriptions() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let list = ctx.allocate(DefKind::StructTemplate, "List", ModulePath::root(), Span::default());
        let v = gen.fresh(None, Span::default());
        let eq = Constraint::Equal {
            lhs: Ty::Var(v.clone()),
            rhs: Ty::Bool,
            span: Span::default(),
        };
        let inst = Constraint::Instantiate {
            var: v.clone(),
            template: list,
            args: vec![Ty::Int],
            span: Span::default(),
        };
        let bound = Constraint::TraitBound {
            ty: Ty::Int,
            trait_name: "Show".into(),
            span: Span::default(),
        };
        let dflt = Constraint::DefaultFloat {
            var: v,
            span: Span::default(),
        };
        assert_eq!(eq.describe(&ctx), "?T0 = Bool");
        assert_eq!(inst.describe(&ctx), "?T0 ~ List[Int]");
        assert_eq!(bound.describe(&ctx), "Int: Show");
        assert_eq!(dflt.describe(&ctx), "?T0 ?= Float64");
    }

    #[test]
    fn involved_variables_of_instantiation() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let v = gen.fresh(None, Span::default());
        let w = gen.fresh(None, Span::default());
        let c = Constraint::Instantiate {
            var: v.clone(),
            template: DefId(0),
            args: vec![Ty::Ptr(Box::new(Ty::Var(w.clone())))],
            span: Span::default(),
        };
        let vars = c.involved_type_variables(&ctx);
        assert!(vars.contains(&v) && vars.contains(&w));
        assert_eq!(c.priority(), 1);
        assert!(!c.is_default());
    }
}
