//! Priority-ordered constraint solving.
//!
//! Equalities feed the unifier first, then instantiations, then trait
//! bounds; literal defaults run last and only pin variables nothing else
//! decided. Bounds that still mention open variables when first seen are
//! re-checked once defaulting is done.

use kestrel_common::Span;

use crate::constraint::Constraint;
use crate::context::{DefContext, DefId, DefKind};
use crate::error::InferError;
use crate::subst::Substitution;
use crate::ty::Ty;
use crate::unify::{LiteralClass, Unifier};

/// Answers whether a concrete type satisfies a trait.
pub trait TraitOracle {
    fn satisfies(&self, ty: &Ty, trait_name: &str) -> bool;
}

/// A constraint that could not be satisfied, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveError {
    pub error: InferError,
    pub span: Span,
}

/// An instantiation constraint after solving, with its arguments resolved
/// as far as the solved constraints allow.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedInstantiation {
    pub template: DefId,
    pub args: Vec<Ty>,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct ConstraintSolver {
    constraints: Vec<Constraint>,
    unifier: Unifier,
    /// Constraints already fed to the unifier by `solve_structural`.
    structural_done: usize,
}

impl ConstraintSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: Constraint) {
        if let Constraint::DefaultInt { var, .. } = &constraint {
            self.unifier.mark_literal(var, LiteralClass::Integer);
        }
        if let Constraint::DefaultFloat { var, .. } = &constraint {
            self.unifier.mark_literal(var, LiteralClass::Float);
        }
        self.constraints.push(constraint);
    }

    pub fn equal(&mut self, lhs: Ty, rhs: Ty, span: Span) {
        self.add(Constraint::Equal { lhs, rhs, span });
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Sorted view of the constraint set, lowest priority first. Ties keep
    /// insertion order.
    pub fn ordered(&self) -> Vec<&Constraint> {
        let mut ordered: Vec<&Constraint> = self.constraints.iter().collect();
        ordered.sort_by_key(|c| c.priority());
        ordered
    }

    /// Feed equalities and instantiations added since the last call to the
    /// unifier, so a caller walking a body can look at what is known so far.
    pub fn solve_structural(&mut self, ctx: &DefContext) -> Result<(), SolveError> {
        let pending: Vec<Constraint> = self.constraints[self.structural_done..].to_vec();
        self.structural_done = self.constraints.len();
        let mut pending: Vec<&Constraint> = pending.iter().collect();
        pending.sort_by_key(|c| c.priority());
        for c in pending {
            if c.priority() <= 1 {
                self.apply_structural(c, ctx)?;
            }
        }
        Ok(())
    }

    /// Current best knowledge of `ty`.
    pub fn resolve(&mut self, ty: &Ty) -> Ty {
        self.unifier.resolve(ty)
    }

    fn apply_structural(&mut self, c: &Constraint, ctx: &DefContext) -> Result<(), SolveError> {
        let at = |error| SolveError {
            error,
            span: c.span(),
        };
        match c {
            Constraint::Equal { lhs, rhs, .. } => self.unifier.unify(lhs, rhs).map_err(at),
            Constraint::Instantiate {
                var, template, args, ..
            } => {
                let instance = match ctx.get_kind(*template) {
                    Some(DefKind::StructTemplate) => Ty::GenericStruct {
                        template: *template,
                        args: args.clone(),
                    },
                    Some(DefKind::UnionTemplate) => Ty::GenericUnion {
                        template: *template,
                        args: args.clone(),
                    },
                    // Function and method templates fix their type through
                    // equalities on the instantiated signature.
                    _ => return Ok(()),
                };
                self.unifier.unify(&Ty::Var(var.clone()), &instance).map_err(at)
            }
            _ => Ok(()),
        }
    }

    /// Solve every constraint and return the resulting substitution.
    ///
    /// Solving again after adding nothing yields the same substitution:
    /// every step is idempotent against an already-solved unifier.
    #[tracing::instrument(level = "debug", skip_all, fields(constraints = self.constraints.len()))]
    pub fn solve(
        &mut self,
        ctx: &DefContext,
        oracle: &dyn TraitOracle,
    ) -> Result<Substitution, SolveError> {
        let constraints = self.constraints.clone();
        let mut ordered: Vec<&Constraint> = constraints.iter().collect();
        ordered.sort_by_key(|c| c.priority());

        let mut deferred = Vec::new();
        for c in ordered {
            tracing::trace!(constraint = %c.describe(ctx), "solve");
            match c {
                Constraint::Equal { .. } | Constraint::Instantiate { .. } => {
                    self.apply_structural(c, ctx)?
                }
                Constraint::TraitBound { ty, trait_name, span } => {
                    let resolved = self.unifier.resolve(ty);
                    if resolved.structural_vars().is_empty() {
                        check_bound(oracle, &resolved, trait_name, *span)?;
                    } else {
                        deferred.push((ty.clone(), trait_name.clone(), *span));
                    }
                }
                Constraint::DefaultInt { var, span } => {
                    self.apply_default(var, LiteralClass::Integer, *span)?
                }
                Constraint::DefaultFloat { var, span } => {
                    self.apply_default(var, LiteralClass::Float, *span)?
                }
            }
        }

        for (ty, trait_name, span) in deferred {
            let resolved = self.unifier.resolve(&ty);
            if !resolved.structural_vars().is_empty() {
                return Err(SolveError {
                    error: InferError::AmbiguousTraitBound {
                        ty: resolved,
                        trait_name,
                    },
                    span,
                });
            }
            check_bound(oracle, &resolved, &trait_name, span)?;
        }

        self.structural_done = self.constraints.len();
        let subst = self.unifier.substitution();
        tracing::debug!(bound = subst.len(), "solved");
        Ok(subst)
    }

    fn apply_default(
        &mut self,
        var: &crate::ty::TypeVar,
        class: LiteralClass,
        span: Span,
    ) -> Result<(), SolveError> {
        self.unifier
            .apply_default(var, class)
            .map(|_| ())
            .map_err(|error| SolveError { error, span })
    }

    /// Every instantiation constraint with its arguments resolved.
    pub fn instantiations(&mut self) -> Vec<SolvedInstantiation> {
        let mut out = Vec::new();
        for c in &self.constraints {
            if let Constraint::Instantiate {
                template,
                args,
                span,
                ..
            } = c
            {
                out.push(SolvedInstantiation {
                    template: *template,
                    args: args.iter().map(|a| self.unifier.resolve(a)).collect(),
                    span: *span,
                });
            }
        }
        out
    }
}

fn check_bound(
    oracle: &dyn TraitOracle,
    ty: &Ty,
    trait_name: &str,
    span: Span,
) -> Result<(), SolveError> {
    if oracle.satisfies(ty, trait_name) {
        Ok(())
    } else {
        Err(SolveError {
            error: InferError::TraitNotSatisfied {
                ty: ty.clone(),
                trait_name: trait_name.to_string(),
            },
            span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeVarGen;
    use kestrel_common::ModulePath;

    struct IntsAreShow;

    impl TraitOracle for IntsAreShow {
        fn satisfies(&self, ty: &Ty, trait_name: &str) -> bool {
            trait_name == "Show" && ty.is_integer()
        }
    }

    fn sp() -> Span {
        Span::default()
    }

    #[test]
    fn defaults_pin_only_open_literals() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let (a, b) = (gen.fresh(None, sp()), gen.fresh(None, sp()));
        let mut solver = ConstraintSolver::new();
        solver.add(Constraint::DefaultInt { var: a.clone(), span: sp() });
        solver.add(Constraint::DefaultInt { var: b.clone(), span: sp() });
        solver.equal(Ty::Var(b.clone()), Ty::UInt16, sp());
        let subst = solver.solve(&ctx, &IntsAreShow).unwrap();
        assert_eq!(subst.get(&a), Some(&Ty::Int));
        assert_eq!(subst.get(&b), Some(&Ty::UInt16));
    }

    #[test]
    fn equalities_win_over_defaults_regardless_of_order() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let a = gen.fresh(None, sp());
        let mut solver = ConstraintSolver::new();
        solver.add(Constraint::DefaultFloat { var: a.clone(), span: sp() });
        solver.equal(Ty::Float32, Ty::Var(a.clone()), sp());
        let subst = solver.solve(&ctx, &IntsAreShow).unwrap();
        assert_eq!(subst.get(&a), Some(&Ty::Float32));
    }

    #[test]
    fn bound_on_literal_checked_after_defaulting() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let a = gen.fresh(None, sp());
        let mut solver = ConstraintSolver::new();
        solver.add(Constraint::TraitBound {
            ty: Ty::Var(a.clone()),
            trait_name: "Show".into(),
            span: sp(),
        });
        solver.add(Constraint::DefaultInt { var: a, span: sp() });
        assert!(solver.solve(&ctx, &IntsAreShow).is_ok());
    }

    #[test]
    fn unresolvable_bound_is_an_error() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let a = gen.fresh(None, sp());
        let mut solver = ConstraintSolver::new();
        solver.add(Constraint::TraitBound {
            ty: Ty::Var(a),
            trait_name: "Show".into(),
            span: Span::new(4, 9),
        });
        let err = solver.solve(&ctx, &IntsAreShow).unwrap_err();
        assert!(matches!(err.error, InferError::AmbiguousTraitBound { .. }));
        assert_eq!(err.span, Span::new(4, 9));
    }

    #[test]
    fn unsatisfied_bound() {
        let ctx = DefContext::new();
        let mut solver = ConstraintSolver::new();
        solver.add(Constraint::TraitBound {
            ty: Ty::Bool,
            trait_name: "Show".into(),
            span: sp(),
        });
        let err = solver.solve(&ctx, &IntsAreShow).unwrap_err();
        assert!(matches!(err.error, InferError::TraitNotSatisfied { .. }));
    }

    #[test]
    fn instantiate_binds_struct_instance() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let boxed = ctx.allocate(DefKind::StructTemplate, "Box", ModulePath::root(), sp());
        let (r, t) = (gen.fresh(None, sp()), gen.fresh(None, sp()));
        let mut solver = ConstraintSolver::new();
        solver.add(Constraint::Instantiate {
            var: r.clone(),
            template: boxed,
            args: vec![Ty::Var(t.clone())],
            span: sp(),
        });
        solver.add(Constraint::DefaultInt { var: t, span: sp() });
        let subst = solver.solve(&ctx, &IntsAreShow).unwrap();
        assert_eq!(
            subst.get(&r),
            Some(&Ty::GenericStruct {
                template: boxed,
                args: vec![Ty::Int]
            })
        );
        let inst = solver.instantiations();
        assert_eq!(inst.len(), 1);
        assert_eq!(inst[0].args, vec![Ty::Int]);
    }

    #[test]
    fn solving_twice_is_stable() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let (a, b) = (gen.fresh(None, sp()), gen.fresh(None, sp()));
        let mut solver = ConstraintSolver::new();
        solver.equal(Ty::Var(a.clone()), Ty::Var(b.clone()), sp());
        solver.add(Constraint::DefaultInt { var: b, span: sp() });
        let first = solver.solve(&ctx, &IntsAreShow).unwrap();
        let second = solver.solve(&ctx, &IntsAreShow).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get(&a), Some(&Ty::Int));
    }

    #[test]
    fn ordered_groups_by_priority() {
        let gen = TypeVarGen::new();
        let a = gen.fresh(None, sp());
        let mut solver = ConstraintSolver::new();
        solver.add(Constraint::DefaultInt { var: a.clone(), span: sp() });
        solver.add(Constraint::TraitBound { ty: Ty::Int, trait_name: "Show".into(), span: sp() });
        solver.equal(Ty::Int, Ty::Var(a), sp());
        let priorities: Vec<u8> = solver.ordered().iter().map(|c| c.priority()).collect();
        assert_eq!(priorities, vec![0, 2, 10]);
    }

    #[test]
    fn structural_pass_exposes_partial_knowledge() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let a = gen.fresh(None, sp());
        let mut solver = ConstraintSolver::new();
        solver.equal(Ty::Var(a.clone()), Ty::Bool, sp());
        solver.solve_structural(&ctx).unwrap();
        assert_eq!(solver.resolve(&Ty::Var(a)), Ty::Bool);
    }
}
