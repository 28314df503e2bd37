//! Type-variable substitutions.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::{DefContext, DefId, Member, StructInfo, UnionCase, UnionInfo};
use crate::ty::{Param, Ty, TypeVar};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    map: FxHashMap<TypeVar, Ty>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: TypeVar, ty: Ty) {
        self.map.insert(var, ty);
    }

    pub fn get(&self, var: &TypeVar) -> Option<&Ty> {
        self.map.get(var)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn bound_variables(&self) -> FxHashSet<TypeVar> {
        self.map.keys().cloned().collect()
    }

    /// Apply to `ty`, following chains of bindings to their end.
    ///
    /// A nominal struct or union whose registered members still mention a
    /// variable has those members rewritten in `ctx` in place.
    pub fn apply(&self, ty: &Ty, ctx: &mut DefContext) -> Ty {
        let mut active = FxHashSet::default();
        let mut rewriting = FxHashSet::default();
        self.apply_inner(ty, ctx, &mut active, &mut rewriting)
    }

    fn apply_inner(
        &self,
        ty: &Ty,
        ctx: &mut DefContext,
        active: &mut FxHashSet<TypeVar>,
        rewriting: &mut FxHashSet<DefId>,
    ) -> Ty {
        match ty {
            Ty::Var(tv) => {
                let Some(bound) = self.map.get(tv) else {
                    return ty.clone();
                };
                // A cyclic chain stops at the variable that closes it.
                if !active.insert(tv.clone()) {
                    return ty.clone();
                }
                let out = self.apply_inner(bound, ctx, active, rewriting);
                active.remove(tv);
                out
            }
            Ty::Function { params, ret } => Ty::Function {
                params: params
                    .iter()
                    .map(|p| Param {
                        ty: self.apply_inner(&p.ty, ctx, active, rewriting),
                        kind: p.kind,
                    })
                    .collect(),
                ret: Box::new(self.apply_inner(ret, ctx, active, rewriting)),
            },
            Ty::Ref(inner) => Ty::Ref(Box::new(self.apply_inner(inner, ctx, active, rewriting))),
            Ty::Ptr(inner) => Ty::Ptr(Box::new(self.apply_inner(inner, ctx, active, rewriting))),
            Ty::WeakRef(inner) => {
                Ty::WeakRef(Box::new(self.apply_inner(inner, ctx, active, rewriting)))
            }
            Ty::GenericStruct { template, args } => Ty::GenericStruct {
                template: *template,
                args: self.apply_all(args, ctx, active, rewriting),
            },
            Ty::GenericUnion { template, args } => Ty::GenericUnion {
                template: *template,
                args: self.apply_all(args, ctx, active, rewriting),
            },
            Ty::TraitObject { name, args } => Ty::TraitObject {
                name: name.clone(),
                args: self.apply_all(args, ctx, active, rewriting),
            },
            Ty::Struct(id) | Ty::Union(id) => {
                if ctx.members_contain_variable(*id) && rewriting.insert(*id) {
                    self.rewrite_definition(*id, ctx, active, rewriting);
                    rewriting.remove(id);
                }
                ty.clone()
            }
            _ => ty.clone(),
        }
    }

    fn apply_all(
        &self,
        tys: &[Ty],
        ctx: &mut DefContext,
        active: &mut FxHashSet<TypeVar>,
        rewriting: &mut FxHashSet<DefId>,
    ) -> Vec<Ty> {
        tys.iter()
            .map(|t| self.apply_inner(t, ctx, active, rewriting))
            .collect()
    }

    fn rewrite_definition(
        &self,
        id: DefId,
        ctx: &mut DefContext,
        active: &mut FxHashSet<TypeVar>,
        rewriting: &mut FxHashSet<DefId>,
    ) {
        if let Some(info) = ctx.struct_info(id).cloned() {
            let members = self.apply_members(&info.members, ctx, active, rewriting);
            ctx.update_struct_info(id, StructInfo { members, ..info });
        } else if let Some(info) = ctx.union_info(id).cloned() {
            let cases = info
                .cases
                .iter()
                .map(|c| UnionCase {
                    name: c.name.clone(),
                    params: self.apply_members(&c.params, ctx, active, rewriting),
                })
                .collect();
            ctx.update_union_info(id, UnionInfo { cases, ..info });
        }
    }

    fn apply_members(
        &self,
        members: &[Member],
        ctx: &mut DefContext,
        active: &mut FxHashSet<TypeVar>,
        rewriting: &mut FxHashSet<DefId>,
    ) -> Vec<Member> {
        members
            .iter()
            .map(|m| Member {
                name: m.name.clone(),
                ty: self.apply_inner(&m.ty, ctx, active, rewriting),
                mutable: m.mutable,
            })
            .collect()
    }

    /// The substitution equivalent to applying `self` and then `other`.
    ///
    /// Holds as long as `other` does not bind a variable to a type that
    /// mentions one of `self`'s variables.
    pub fn compose(&self, other: &Substitution, ctx: &mut DefContext) -> Substitution {
        let mut map = FxHashMap::default();
        for var in self.map.keys() {
            let through_self = self.apply(&Ty::Var(var.clone()), ctx);
            map.insert(var.clone(), other.apply(&through_self, ctx));
        }
        for (var, ty) in &other.map {
            map.entry(var.clone()).or_insert_with(|| ty.clone());
        }
        Substitution { map }
    }

    /// Variables left open in `ty` after applying this substitution.
    pub fn unsolved_variables(&self, ty: &Ty, ctx: &mut DefContext) -> FxHashSet<TypeVar> {
        let applied = self.apply(ty, ctx);
        applied.free_type_variables(ctx)
    }

    pub fn has_unsolved_variables(&self, ty: &Ty, ctx: &mut DefContext) -> bool {
        !self.unsolved_variables(ty, ctx).is_empty()
    }

    pub fn display<'a>(&'a self, ctx: &'a DefContext) -> SubstitutionDisplay<'a> {
        SubstitutionDisplay { subst: self, ctx }
    }
}

pub struct SubstitutionDisplay<'a> {
    subst: &'a Substitution,
    ctx: &'a DefContext,
}

impl fmt::Display for SubstitutionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&TypeVar, &Ty)> = self.subst.map.iter().collect();
        entries.sort_by_key(|(var, _)| var.id);
        write!(f, "{{")?;
        for (i, (var, ty)) in entries.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{var} -> {}", ty.display(self.ctx))?;
        }
        if entries.is_empty() {
            write!(f, "}}")
        } else {
            write!(f, " }}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefKind;
    use crate::ty::TypeVarGen;
    use kestrel_common::{ModulePath, Span};

    fn var(gen: &TypeVarGen) -> TypeVar {
        gen.fresh(None, Span::default())
    }

    #[test]
    fn unbound_variable_is_unchanged() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let a = var(&gen);
        let s = Substitution::new();
        assert_eq!(s.apply(&Ty::Var(a.clone()), &mut ctx), Ty::Var(a));
    }

    #[test]
    fn chains_are_followed_to_the_end() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let (a, b, c) = (var(&gen), var(&gen), var(&gen));
        let mut s = Substitution::new();
        s.insert(a.clone(), Ty::Var(b.clone()));
        s.insert(b, Ty::Ptr(Box::new(Ty::Var(c.clone()))));
        s.insert(c, Ty::Int);
        let ty = Ty::reference(Ty::Var(a));
        assert_eq!(
            s.apply(&ty, &mut ctx),
            Ty::reference(Ty::Ptr(Box::new(Ty::Int)))
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let (a, b) = (var(&gen), var(&gen));
        let mut s = Substitution::new();
        s.insert(a.clone(), Ty::Var(b.clone()));
        let once = s.apply(&Ty::Var(a), &mut ctx);
        let twice = s.apply(&once, &mut ctx);
        assert_eq!(once, twice);
        assert_eq!(once, Ty::Var(b));
    }

    #[test]
    fn nominal_members_are_rewritten_in_context() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let a = var(&gen);
        let id = ctx.allocate(DefKind::Struct, "Cell", ModulePath::root(), Span::default());
        ctx.update_struct_info(
            id,
            StructInfo {
                type_params: Vec::new(),
                members: vec![Member::new("v", Ty::Var(a.clone()))],
                is_copy: false,
                is_value: false,
            },
        );
        let mut s = Substitution::new();
        s.insert(a, Ty::UInt8);
        assert_eq!(s.apply(&Ty::Struct(id), &mut ctx), Ty::Struct(id));
        assert_eq!(ctx.member_types(id), vec![Ty::UInt8]);
        assert!(!ctx.members_contain_variable(id));
    }

    #[test]
    fn compose_matches_sequential_application() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let (a, b, c) = (var(&gen), var(&gen), var(&gen));
        let mut s1 = Substitution::new();
        s1.insert(a.clone(), Ty::Var(b.clone()));
        s1.insert(b.clone(), Ty::Var(c.clone()));
        let mut s2 = Substitution::new();
        s2.insert(c.clone(), Ty::Bool);
        let composed = s1.compose(&s2, &mut ctx);
        for v in [a, b, c] {
            let t = Ty::func(vec![Param::by_val(Ty::Var(v))], Ty::Void);
            let seq = {
                let once = s1.apply(&t, &mut ctx);
                s2.apply(&once, &mut ctx)
            };
            assert_eq!(composed.apply(&t, &mut ctx), seq);
        }
    }

    /// `other` may bind new variables and leave others open, as long as it
    /// never points back into `self`'s domain.
    #[test]
    fn compose_with_disjoint_other() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let (a, b, d, e) = (var(&gen), var(&gen), var(&gen), var(&gen));
        let mut s1 = Substitution::new();
        s1.insert(a.clone(), Ty::Var(b.clone()));
        let mut s2 = Substitution::new();
        s2.insert(b.clone(), Ty::Int);
        s2.insert(d.clone(), Ty::Ptr(Box::new(Ty::Var(e.clone()))));
        let composed = s1.compose(&s2, &mut ctx);
        for v in [a, b, d, e] {
            let t = Ty::Var(v);
            let once = s1.apply(&t, &mut ctx);
            let seq = s2.apply(&once, &mut ctx);
            assert_eq!(composed.apply(&t, &mut ctx), seq);
        }
    }

    /// When `other` maps into a variable `self` binds, the composition
    /// resolves through `self` where sequential application stops.
    #[test]
    fn compose_resolves_other_through_self() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let (a, d) = (var(&gen), var(&gen));
        let mut s1 = Substitution::new();
        s1.insert(a.clone(), Ty::Int);
        let mut s2 = Substitution::new();
        s2.insert(d.clone(), Ty::Ptr(Box::new(Ty::Var(a.clone()))));
        let composed = s1.compose(&s2, &mut ctx);

        let t = Ty::Var(d);
        let once = s1.apply(&t, &mut ctx);
        assert_eq!(s2.apply(&once, &mut ctx), Ty::Ptr(Box::new(Ty::Var(a))));
        assert_eq!(composed.apply(&t, &mut ctx), Ty::Ptr(Box::new(Ty::Int)));
    }

    #[test]
    fn unsolved_variables_after_apply() {
        let gen = TypeVarGen::new();
        let mut ctx = DefContext::new();
        let (a, b) = (var(&gen), var(&gen));
        let mut s = Substitution::new();
        s.insert(a.clone(), Ty::Int);
        let ty = Ty::func(
            vec![Param::by_val(Ty::Var(a)), Param::by_val(Ty::Var(b.clone()))],
            Ty::Void,
        );
        let open = s.unsolved_variables(&ty, &mut ctx);
        assert_eq!(open.len(), 1);
        assert!(open.contains(&b));
        assert!(s.has_unsolved_variables(&ty, &mut ctx));
    }

    #[test]
    fn display_sorted_by_id() {
        let gen = TypeVarGen::new();
        let ctx = DefContext::new();
        let (a, b) = (var(&gen), var(&gen));
        let mut s = Substitution::new();
        s.insert(b, Ty::Bool);
        s.insert(a, Ty::Int);
        insta::assert_snapshot!(s.display(&ctx).to_string(), @"{ ?T0 -> Int, ?T1 -> Bool }");
        insta::assert_snapshot!(Substitution::new().display(&ctx).to_string(), @"{}");
    }
}
