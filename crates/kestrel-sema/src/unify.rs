//! Unification over [`Ty`] backed by a [`UnionFind`] of type variables.
//!
//! Variables are merged into equivalence classes first; a concrete binding
//! lives on the class root and so applies to every member of the class.

use rustc_hash::FxHashMap;

use crate::error::InferError;
use crate::subst::Substitution;
use crate::ty::{Param, Ty, TypeVar};
use crate::union_find::UnionFind;

/// Restriction placed on a variable introduced by an unsuffixed literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralClass {
    Integer,
    Float,
}

impl LiteralClass {
    fn admits(self, ty: &Ty) -> bool {
        match self {
            LiteralClass::Integer => ty.is_integer() || *ty == Ty::Never,
            LiteralClass::Float => ty.is_float() || *ty == Ty::Never,
        }
    }

    fn default_ty(self) -> Ty {
        match self {
            LiteralClass::Integer => Ty::Int,
            LiteralClass::Float => Ty::Float64,
        }
    }
}

#[derive(Debug, Default)]
pub struct Unifier {
    classes: UnionFind<TypeVar>,
    bindings: FxHashMap<TypeVar, Ty>,
    literals: FxHashMap<TypeVar, LiteralClass>,
}

impl Unifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `var`'s class to integer or float types.
    pub fn mark_literal(&mut self, var: &TypeVar, class: LiteralClass) {
        let root = self.classes.find(var);
        self.literals.entry(root).or_insert(class);
    }

    /// Bind `var`'s class to its literal default if it is still open.
    /// Returns whether a binding was recorded.
    pub fn apply_default(&mut self, var: &TypeVar, class: LiteralClass) -> Result<bool, InferError> {
        let root = self.classes.find(var);
        if self.bindings.contains_key(&root) {
            return Ok(false);
        }
        self.bind_variable(&root, &class.default_ty())?;
        Ok(true)
    }

    pub fn is_bound(&mut self, var: &TypeVar) -> bool {
        let root = self.classes.find(var);
        self.bindings.contains_key(&root)
    }

    pub fn unify(&mut self, a: &Ty, b: &Ty) -> Result<(), InferError> {
        let a = self.shallow(a);
        let b = self.shallow(b);
        match (&a, &b) {
            (Ty::Var(x), _) => self.bind_variable(x, &b),
            (_, Ty::Var(y)) => self.bind_variable(y, &a),
            (Ty::Never, _) | (_, Ty::Never) => Ok(()),
            (
                Ty::Function {
                    params: pa,
                    ret: ra,
                },
                Ty::Function {
                    params: pb,
                    ret: rb,
                },
            ) => {
                if pa.len() != pb.len() {
                    return Err(InferError::ArityMismatch {
                        expected: pa.len(),
                        found: pb.len(),
                    });
                }
                for (x, y) in pa.iter().zip(pb) {
                    if x.kind != y.kind {
                        return Err(self.mismatch(&a, &b));
                    }
                    self.unify(&x.ty, &y.ty)?;
                }
                self.unify(ra, rb)
            }
            (Ty::Struct(x), Ty::Struct(y)) | (Ty::Union(x), Ty::Union(y)) if x == y => Ok(()),
            (Ty::Ref(x), Ty::Ref(y)) | (Ty::Ptr(x), Ty::Ptr(y)) | (Ty::WeakRef(x), Ty::WeakRef(y)) => {
                self.unify(x, y)
            }
            (Ty::GenericParam(x), Ty::GenericParam(y)) if x == y => Ok(()),
            (
                Ty::GenericStruct {
                    template: ta,
                    args: aa,
                },
                Ty::GenericStruct {
                    template: tb,
                    args: ab,
                },
            )
            | (
                Ty::GenericUnion {
                    template: ta,
                    args: aa,
                },
                Ty::GenericUnion {
                    template: tb,
                    args: ab,
                },
            ) => {
                if ta != tb {
                    return Err(InferError::TemplateMismatch {
                        expected: *ta,
                        found: *tb,
                    });
                }
                if aa.len() != ab.len() {
                    return Err(InferError::ArityMismatch {
                        expected: aa.len(),
                        found: ab.len(),
                    });
                }
                for (x, y) in aa.iter().zip(ab) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (Ty::TraitObject { name: na, args: aa }, Ty::TraitObject { name: nb, args: ab })
                if na == nb && aa.len() == ab.len() =>
            {
                for (x, y) in aa.iter().zip(ab) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (x, y) if x == y && !matches!(x, Ty::Struct(_) | Ty::Union(_)) => Ok(()),
            _ => Err(self.mismatch(&a, &b)),
        }
    }

    fn mismatch(&mut self, expected: &Ty, found: &Ty) -> InferError {
        InferError::Mismatch {
            expected: self.resolve(expected),
            found: self.resolve(found),
        }
    }

    /// Resolve a variable at the top level only.
    fn shallow(&mut self, ty: &Ty) -> Ty {
        match ty {
            Ty::Var(tv) => self.classes.resolve_type(tv, &self.bindings),
            other => other.clone(),
        }
    }

    fn bind_variable(&mut self, var: &TypeVar, ty: &Ty) -> Result<(), InferError> {
        let root = self.classes.find(var);

        if let Ty::Var(other) = ty {
            let other_root = self.classes.find(other);
            if other_root == root {
                return Ok(());
            }
            let class = self.merge_literal_classes(&root, &other_root)?;
            let left = self.bindings.remove(&root);
            let right = self.bindings.remove(&other_root);
            let merged = self.classes.union(&root, &other_root);
            if let Some(class) = class {
                self.literals.insert(merged.clone(), class);
            }
            match (left, right) {
                (Some(l), Some(r)) => {
                    self.bindings.insert(merged, l.clone());
                    self.unify(&l, &r)?;
                }
                (Some(t), None) | (None, Some(t)) => {
                    self.bindings.insert(merged, t);
                }
                (None, None) => {}
            }
            return Ok(());
        }

        let resolved = self.resolve(ty);
        if resolved
            .structural_vars()
            .iter()
            .any(|v| self.classes.find(v) == root)
        {
            return Err(InferError::OccursCheck {
                var: var.clone(),
                ty: resolved,
            });
        }
        if let Some(class) = self.literals.get(&root).copied() {
            if !class.admits(&resolved) {
                return Err(InferError::Mismatch {
                    expected: resolved,
                    found: class.default_ty(),
                });
            }
        }
        match self.bindings.get(&root).cloned() {
            Some(existing) => self.unify(&existing, &resolved),
            None => {
                tracing::trace!(var = %var, "bind");
                self.bindings.insert(root, resolved);
                Ok(())
            }
        }
    }

    fn merge_literal_classes(
        &mut self,
        a: &TypeVar,
        b: &TypeVar,
    ) -> Result<Option<LiteralClass>, InferError> {
        let ca = self.literals.remove(a);
        let cb = self.literals.remove(b);
        match (ca, cb) {
            (Some(x), Some(y)) if x != y => Err(InferError::Mismatch {
                expected: x.default_ty(),
                found: y.default_ty(),
            }),
            (Some(x), _) | (None, Some(x)) => {
                for root in [a, b] {
                    if let Some(bound) = self.bindings.get(root) {
                        if !x.admits(bound) {
                            return Err(InferError::Mismatch {
                                expected: bound.clone(),
                                found: x.default_ty(),
                            });
                        }
                    }
                }
                Ok(Some(x))
            }
            (None, None) => Ok(None),
        }
    }

    /// Replace every variable in `ty` by its current binding, recursively.
    pub fn resolve(&mut self, ty: &Ty) -> Ty {
        self.resolve_depth(ty, 0)
    }

    fn resolve_depth(&mut self, ty: &Ty, depth: usize) -> Ty {
        // Bindings pass the occurs check, so chains are finite; the cap only
        // guards against a corrupted table.
        if depth > 256 {
            return ty.clone();
        }
        let next = depth + 1;
        match ty {
            Ty::Var(tv) => match self.classes.resolve_type(tv, &self.bindings) {
                Ty::Var(root) => Ty::Var(root),
                bound => self.resolve_depth(&bound, next),
            },
            Ty::Function { params, ret } => Ty::Function {
                params: params
                    .iter()
                    .map(|p| Param {
                        ty: self.resolve_depth(&p.ty, next),
                        kind: p.kind,
                    })
                    .collect(),
                ret: Box::new(self.resolve_depth(ret, next)),
            },
            Ty::Ref(inner) => Ty::Ref(Box::new(self.resolve_depth(inner, next))),
            Ty::Ptr(inner) => Ty::Ptr(Box::new(self.resolve_depth(inner, next))),
            Ty::WeakRef(inner) => Ty::WeakRef(Box::new(self.resolve_depth(inner, next))),
            Ty::GenericStruct { template, args } => Ty::GenericStruct {
                template: *template,
                args: args.iter().map(|a| self.resolve_depth(a, next)).collect(),
            },
            Ty::GenericUnion { template, args } => Ty::GenericUnion {
                template: *template,
                args: args.iter().map(|a| self.resolve_depth(a, next)).collect(),
            },
            Ty::TraitObject { name, args } => Ty::TraitObject {
                name: name.clone(),
                args: args.iter().map(|a| self.resolve_depth(a, next)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Every known variable mapped to its fully resolved type. Variables
    /// whose class is still open map to the class representative.
    pub fn substitution(&mut self) -> Substitution {
        let vars: Vec<TypeVar> = self.classes.elements().cloned().collect();
        let mut subst = Substitution::new();
        for tv in vars {
            let resolved = self.resolve(&Ty::Var(tv.clone()));
            if resolved != Ty::Var(tv.clone()) {
                subst.insert(tv, resolved);
            }
        }
        subst
    }
}
