//! Self-contained types for the typed program.
//!
//! A [`ResolvedTy`] holds no type variables and no [`DefId`]s: nominal types
//! carry their name and declaring module, so two resolved types are equal
//! exactly when they are structurally equal. Lowering from [`Ty`] happens
//! once a function's constraints are solved.

use std::fmt;

use kestrel_common::ModulePath;
use serde::Serialize;

use crate::context::{DefContext, DefId};
use crate::ty::{PassKind, Ty, TypeVar};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedParam {
    pub ty: ResolvedTy,
    pub kind: PassKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ResolvedTy {
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    Void,
    Never,
    Function {
        params: Vec<ResolvedParam>,
        ret: Box<ResolvedTy>,
    },
    Struct {
        name: String,
        module: ModulePath,
    },
    Union {
        name: String,
        module: ModulePath,
    },
    Ref(Box<ResolvedTy>),
    Ptr(Box<ResolvedTy>),
    WeakRef(Box<ResolvedTy>),
    /// Still generic inside a template body.
    GenericParam(String),
    GenericStruct {
        name: String,
        module: ModulePath,
        args: Vec<ResolvedTy>,
    },
    GenericUnion {
        name: String,
        module: ModulePath,
        args: Vec<ResolvedTy>,
    },
    TraitObject {
        name: String,
        args: Vec<ResolvedTy>,
    },
    Module(ModulePath),
}

impl ResolvedTy {
    /// Lower `ty`, or report the first variable that is still open.
    pub fn from_ty(ty: &Ty, ctx: &DefContext) -> Result<ResolvedTy, TypeVar> {
        let nominal = |id: DefId| {
            (
                ctx.get_name(id).unwrap_or("<unknown>").to_string(),
                ctx.get_module_path(id).cloned().unwrap_or_default(),
            )
        };
        let list = |tys: &[Ty]| {
            tys.iter()
                .map(|t| ResolvedTy::from_ty(t, ctx))
                .collect::<Result<Vec<_>, _>>()
        };
        let boxed = |t: &Ty| ResolvedTy::from_ty(t, ctx).map(Box::new);
        Ok(match ty {
            Ty::Int => ResolvedTy::Int,
            Ty::Int8 => ResolvedTy::Int8,
            Ty::Int16 => ResolvedTy::Int16,
            Ty::Int32 => ResolvedTy::Int32,
            Ty::Int64 => ResolvedTy::Int64,
            Ty::UInt => ResolvedTy::UInt,
            Ty::UInt8 => ResolvedTy::UInt8,
            Ty::UInt16 => ResolvedTy::UInt16,
            Ty::UInt32 => ResolvedTy::UInt32,
            Ty::UInt64 => ResolvedTy::UInt64,
            Ty::Float32 => ResolvedTy::Float32,
            Ty::Float64 => ResolvedTy::Float64,
            Ty::Bool => ResolvedTy::Bool,
            Ty::Void => ResolvedTy::Void,
            Ty::Never => ResolvedTy::Never,
            Ty::Function { params, ret } => ResolvedTy::Function {
                params: params
                    .iter()
                    .map(|p| {
                        Ok(ResolvedParam {
                            ty: ResolvedTy::from_ty(&p.ty, ctx)?,
                            kind: p.kind,
                        })
                    })
                    .collect::<Result<Vec<_>, TypeVar>>()?,
                ret: boxed(ret)?,
            },
            Ty::Struct(id) => {
                let (name, module) = nominal(*id);
                ResolvedTy::Struct { name, module }
            }
            Ty::Union(id) => {
                let (name, module) = nominal(*id);
                ResolvedTy::Union { name, module }
            }
            Ty::Ref(inner) => ResolvedTy::Ref(boxed(inner)?),
            Ty::Ptr(inner) => ResolvedTy::Ptr(boxed(inner)?),
            Ty::WeakRef(inner) => ResolvedTy::WeakRef(boxed(inner)?),
            Ty::GenericParam(name) => ResolvedTy::GenericParam(name.clone()),
            Ty::GenericStruct { template, args } => {
                let (name, module) = nominal(*template);
                ResolvedTy::GenericStruct {
                    name,
                    module,
                    args: list(args)?,
                }
            }
            Ty::GenericUnion { template, args } => {
                let (name, module) = nominal(*template);
                ResolvedTy::GenericUnion {
                    name,
                    module,
                    args: list(args)?,
                }
            }
            Ty::Var(tv) => return Err(tv.clone()),
            Ty::TraitObject { name, args } => ResolvedTy::TraitObject {
                name: name.clone(),
                args: list(args)?,
            },
            Ty::Module(path) => ResolvedTy::Module(path.clone()),
        })
    }

    pub fn contains_generic_param(&self) -> bool {
        match self {
            ResolvedTy::GenericParam(_) => true,
            ResolvedTy::Function { params, ret } => {
                params.iter().any(|p| p.ty.contains_generic_param()) || ret.contains_generic_param()
            }
            ResolvedTy::Ref(inner) | ResolvedTy::Ptr(inner) | ResolvedTy::WeakRef(inner) => {
                inner.contains_generic_param()
            }
            ResolvedTy::GenericStruct { args, .. }
            | ResolvedTy::GenericUnion { args, .. }
            | ResolvedTy::TraitObject { args, .. } => args.iter().any(ResolvedTy::contains_generic_param),
            _ => false,
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[ResolvedTy]) -> fmt::Result {
    write!(f, "[")?;
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    write!(f, "]")
}

impl fmt::Display for ResolvedTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedTy::Int => write!(f, "Int"),
            ResolvedTy::Int8 => write!(f, "Int8"),
            ResolvedTy::Int16 => write!(f, "Int16"),
            ResolvedTy::Int32 => write!(f, "Int32"),
            ResolvedTy::Int64 => write!(f, "Int64"),
            ResolvedTy::UInt => write!(f, "UInt"),
            ResolvedTy::UInt8 => write!(f, "UInt8"),
            ResolvedTy::UInt16 => write!(f, "UInt16"),
            ResolvedTy::UInt32 => write!(f, "UInt32"),
            ResolvedTy::UInt64 => write!(f, "UInt64"),
            ResolvedTy::Float32 => write!(f, "Float32"),
            ResolvedTy::Float64 => write!(f, "Float64"),
            ResolvedTy::Bool => write!(f, "Bool"),
            ResolvedTy::Void => write!(f, "Void"),
            ResolvedTy::Never => write!(f, "Never"),
            ResolvedTy::Function { params, ret } => {
                let params: Vec<ResolvedTy> = params.iter().map(|p| p.ty.clone()).collect();
                write_args(f, &params)?;
                write!(f, "{ret}")
            }
            ResolvedTy::Struct { name, .. } | ResolvedTy::Union { name, .. } => write!(f, "{name}"),
            ResolvedTy::Ref(inner) => write!(f, "{inner} ref"),
            ResolvedTy::Ptr(inner) => write!(f, "{inner} ptr"),
            ResolvedTy::WeakRef(inner) => write!(f, "{inner} weakref"),
            ResolvedTy::GenericParam(name) => write!(f, "{name}"),
            ResolvedTy::GenericStruct { name, args, .. } | ResolvedTy::GenericUnion { name, args, .. } => {
                write!(f, "{name}")?;
                write_args(f, args)
            }
            ResolvedTy::TraitObject { name, args } => {
                write!(f, "{name}")?;
                if args.is_empty() {
                    Ok(())
                } else {
                    write_args(f, args)
                }
            }
            ResolvedTy::Module(path) => write!(f, "module {path}"),
        }
    }
}
