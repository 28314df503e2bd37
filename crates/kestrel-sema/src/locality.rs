//! Where a `given` may be declared.
//!
//! A bare `given Subject { .. }` belongs to the module that declares the
//! subject. A conformance `given Subject: Trait { .. }` may live in the
//! module of either the subject or the trait.

use kestrel_common::ModulePath;

use crate::context::DefContext;
use crate::error::SemanticErrorKind;
use crate::ty::Ty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Type,
    Trait,
}

impl OwnerKind {
    fn label(self) -> &'static str {
        match self {
            OwnerKind::Type => "type",
            OwnerKind::Trait => "trait",
        }
    }
}

/// The declaration a `given` attaches to and the module that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GivenOwner {
    pub kind: OwnerKind,
    pub display_name: String,
    pub module_path: ModulePath,
}

impl GivenOwner {
    pub fn trait_owner(name: &str, module_path: ModulePath) -> Self {
        GivenOwner {
            kind: OwnerKind::Trait,
            display_name: name.to_string(),
            module_path,
        }
    }

    /// Owner of a concrete subject type. Builtin scalars and pointers are
    /// owned by `std_module`. Generic parameters and open types have no
    /// owner.
    pub fn of_type(ty: &Ty, ctx: &DefContext, std_module: &ModulePath) -> Option<Self> {
        let owned = |id| {
            Some(GivenOwner {
                kind: OwnerKind::Type,
                display_name: ctx.get_name(id)?.to_string(),
                module_path: ctx.get_module_path(id)?.clone(),
            })
        };
        match ty {
            Ty::Struct(id) | Ty::Union(id) => owned(*id),
            Ty::GenericStruct { template, .. } | Ty::GenericUnion { template, .. } => owned(*template),
            Ty::Ptr(_) => Some(GivenOwner {
                kind: OwnerKind::Type,
                display_name: "Ptr".to_string(),
                module_path: std_module.clone(),
            }),
            Ty::Ref(inner) => Self::of_type(inner, ctx, std_module),
            t if t.is_primitive() => Some(GivenOwner {
                kind: OwnerKind::Type,
                display_name: t.display(ctx).to_string(),
                module_path: std_module.clone(),
            }),
            _ => None,
        }
    }
}

/// A bare `given` must be declared in its owner's module.
pub fn check_bare_given(current: &ModulePath, owner: &GivenOwner) -> Result<(), SemanticErrorKind> {
    if &owner.module_path == current {
        return Ok(());
    }
    Err(SemanticErrorKind::GivenLocality {
        message: format!(
            "Cannot declare 'given {}' in module '{}': {} is declared in '{}'",
            owner.display_name,
            current,
            owner.kind.label(),
            owner.module_path
        ),
    })
}

/// A conformance must be declared next to the type or next to the trait.
pub fn check_conformance(
    current: &ModulePath,
    type_owner: &GivenOwner,
    trait_owner: &GivenOwner,
) -> Result<(), SemanticErrorKind> {
    if &type_owner.module_path == current || &trait_owner.module_path == current {
        return Ok(());
    }
    Err(SemanticErrorKind::GivenLocality {
        message: format!(
            "Cannot declare 'given {}: {}' in module '{}': declaration must be in type module '{}' or trait module '{}'",
            type_owner.display_name,
            trait_owner.display_name,
            current,
            type_owner.module_path,
            trait_owner.module_path
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefKind;
    use kestrel_common::Span;

    fn shapes() -> (DefContext, Ty) {
        let mut ctx = DefContext::new();
        let id = ctx.allocate(DefKind::Struct, "Circle", ModulePath::parse("geo.shapes"), Span::default());
        (ctx, Ty::Struct(id))
    }

    #[test]
    fn bare_given_in_owning_module() {
        let (ctx, circle) = shapes();
        let owner = GivenOwner::of_type(&circle, &ctx, &ModulePath::parse("std")).unwrap();
        assert!(check_bare_given(&ModulePath::parse("geo.shapes"), &owner).is_ok());
        let err = check_bare_given(&ModulePath::parse("app"), &owner).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Cannot declare 'given Circle' in module 'app': type is declared in 'geo.shapes'"
        );
    }

    #[test]
    fn primitives_belong_to_std() {
        let ctx = DefContext::new();
        let std = ModulePath::parse("std");
        let owner = GivenOwner::of_type(&Ty::Int, &ctx, &std).unwrap();
        assert_eq!(owner.module_path, std);
        let err = check_bare_given(&ModulePath::root(), &owner).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Cannot declare 'given Int' in module '<root>': type is declared in 'std'"
        );
        assert!(GivenOwner::of_type(&Ty::GenericParam("T".into()), &ctx, &std).is_none());
    }

    #[test]
    fn conformance_needs_one_local_side() {
        let (ctx, circle) = shapes();
        let std = ModulePath::parse("std");
        let ty_owner = GivenOwner::of_type(&circle, &ctx, &std).unwrap();
        let show = GivenOwner::trait_owner("Show", ModulePath::parse("fmt"));
        assert!(check_conformance(&ModulePath::parse("geo.shapes"), &ty_owner, &show).is_ok());
        assert!(check_conformance(&ModulePath::parse("fmt"), &ty_owner, &show).is_ok());
        let err = check_conformance(&ModulePath::parse("app"), &ty_owner, &show).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Cannot declare 'given Circle: Show' in module 'app': declaration must be in type module 'geo.shapes' or trait module 'fmt'"
        );
    }

    #[test]
    fn trait_extension_owned_by_trait_module() {
        let owner = GivenOwner::trait_owner("Show", ModulePath::parse("fmt"));
        let err = check_bare_given(&ModulePath::parse("app"), &owner).unwrap_err();
        assert!(err.to_string().ends_with("trait is declared in 'fmt'"));
    }
}
