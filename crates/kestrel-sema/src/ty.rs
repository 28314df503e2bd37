//! Inference-phase type representation.
//!
//! [`Ty`] may hold open [`TypeVar`]s and refers to nominal structs and unions
//! by [`DefId`], so most structural questions (free variables, copy
//! classification, layout keys, display) are answered against a
//! [`DefContext`]. Once a function is solved its types are lowered to the
//! self-contained [`ResolvedTy`](crate::resolved::ResolvedTy).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use kestrel_common::{ModulePath, Span};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::config::GenericCopyPolicy;
use crate::context::{DefContext, DefId};

// ── Type Variables ─────────────────────────────────────────────────────

/// An inference placeholder. Identity is the id alone; the label and span
/// only improve messages.
#[derive(Debug, Clone)]
pub struct TypeVar {
    pub id: u64,
    pub name: Option<String>,
    pub span: Span,
}

impl PartialEq for TypeVar {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeVar {}

impl Hash for TypeVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "?{}_{}", name, self.id),
            None => write!(f, "?T{}", self.id),
        }
    }
}

impl TypeVar {
    /// Display form plus the source range the variable was introduced at.
    pub fn detailed_description(&self) -> String {
        format!(
            "{} (introduced at {}..{})",
            self, self.span.start, self.span.end
        )
    }
}

/// Mints globally unique type variables.
///
/// Cloning shares the counter, so sibling checking tasks holding clones of
/// one generator never hand out the same id.
#[derive(Debug, Clone, Default)]
pub struct TypeVarGen {
    next: Arc<Mutex<u64>>,
}

impl TypeVarGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self, name: Option<&str>, span: Span) -> TypeVar {
        let mut next = self.next.lock();
        let id = *next;
        *next += 1;
        TypeVar {
            id,
            name: name.map(str::to_string),
            span,
        }
    }

    pub fn fresh_ty(&self, name: Option<&str>, span: Span) -> Ty {
        Ty::Var(self.fresh(name, span))
    }
}

// ── Types ──────────────────────────────────────────────────────────────

/// How an argument is handed to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PassKind {
    ByVal,
    ByRef,
    ByMutRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub ty: Ty,
    pub kind: PassKind,
}

impl Param {
    pub fn by_val(ty: Ty) -> Self {
        Param {
            ty,
            kind: PassKind::ByVal,
        }
    }

    /// A parameter declared as `[mut] name ty`. Reference types pass by
    /// reference, everything else by value.
    pub fn new(ty: Ty, mutable: bool) -> Self {
        let kind = match (&ty, mutable) {
            (Ty::Ref(_), false) => PassKind::ByRef,
            (Ty::Ref(_), true) => PassKind::ByMutRef,
            _ => PassKind::ByVal,
        };
        Param { ty, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
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
    Function { params: Vec<Param>, ret: Box<Ty> },
    Struct(DefId),
    Union(DefId),
    Ref(Box<Ty>),
    Ptr(Box<Ty>),
    WeakRef(Box<Ty>),
    GenericParam(String),
    /// A use of a generic struct template that has not been specialized.
    GenericStruct { template: DefId, args: Vec<Ty> },
    GenericUnion { template: DefId, args: Vec<Ty> },
    Var(TypeVar),
    TraitObject { name: String, args: Vec<Ty> },
    Module(ModulePath),
}

impl Ty {
    pub fn func(params: Vec<Param>, ret: Ty) -> Ty {
        Ty::Function {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn reference(inner: Ty) -> Ty {
        Ty::Ref(Box::new(inner))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Ty::Int
                | Ty::Int8
                | Ty::Int16
                | Ty::Int32
                | Ty::Int64
                | Ty::UInt
                | Ty::UInt8
                | Ty::UInt16
                | Ty::UInt32
                | Ty::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::Float32 | Ty::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_primitive(&self) -> bool {
        self.is_numeric() || matches!(self, Ty::Bool | Ty::Void | Ty::Never)
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Ty::Var(_))
    }

    /// The pointee of a reference, or the type itself.
    pub fn strip_ref(&self) -> &Ty {
        match self {
            Ty::Ref(inner) => inner,
            other => other,
        }
    }

    /// Whether values of this type are implicitly duplicated on use.
    ///
    /// Structs and unions carry the flag fixed at their definition; generic
    /// parameters follow `policy`.
    pub fn is_copy(&self, ctx: &DefContext, policy: GenericCopyPolicy) -> bool {
        match self {
            Ty::Int
            | Ty::Int8
            | Ty::Int16
            | Ty::Int32
            | Ty::Int64
            | Ty::UInt
            | Ty::UInt8
            | Ty::UInt16
            | Ty::UInt32
            | Ty::UInt64
            | Ty::Float32
            | Ty::Float64
            | Ty::Bool
            | Ty::Void
            | Ty::Never
            | Ty::Function { .. }
            | Ty::Ref(_)
            | Ty::Ptr(_)
            | Ty::WeakRef(_)
            | Ty::Module(_) => true,
            Ty::Struct(id) | Ty::Union(id) => ctx.is_copy(*id),
            Ty::GenericStruct { template, args } | Ty::GenericUnion { template, args } => {
                ctx.is_copy(*template) && args.iter().all(|a| a.is_copy(ctx, policy))
            }
            Ty::GenericParam(_) => policy == GenericCopyPolicy::AssumeCopy,
            // Unknown until solved; treated as movable so a later use is still checked.
            Ty::Var(_) => false,
            Ty::TraitObject { .. } => false,
        }
    }

    // ── Free Variables ─────────────────────────────────────────────────

    /// Every open type variable reachable from this type, including through
    /// the registered members of nominal structs and unions.
    pub fn free_type_variables(&self, ctx: &DefContext) -> FxHashSet<TypeVar> {
        let mut out = FxHashSet::default();
        let mut seen = FxHashSet::default();
        self.collect_vars(Some(ctx), &mut seen, &mut out);
        out
    }

    pub fn contains_type_variable(&self, ctx: &DefContext) -> bool {
        !self.free_type_variables(ctx).is_empty()
    }

    /// Open type variables that appear syntactically in this type. Nominal
    /// definitions are not entered.
    pub fn structural_vars(&self) -> FxHashSet<TypeVar> {
        let mut out = FxHashSet::default();
        let mut seen = FxHashSet::default();
        self.collect_vars(None, &mut seen, &mut out);
        out
    }

    fn collect_vars(
        &self,
        ctx: Option<&DefContext>,
        seen: &mut FxHashSet<DefId>,
        out: &mut FxHashSet<TypeVar>,
    ) {
        match self {
            Ty::Var(tv) => {
                out.insert(tv.clone());
            }
            Ty::Function { params, ret } => {
                for p in params {
                    p.ty.collect_vars(ctx, seen, out);
                }
                ret.collect_vars(ctx, seen, out);
            }
            Ty::Ref(inner) | Ty::Ptr(inner) | Ty::WeakRef(inner) => {
                inner.collect_vars(ctx, seen, out)
            }
            Ty::GenericStruct { args, .. }
            | Ty::GenericUnion { args, .. }
            | Ty::TraitObject { args, .. } => {
                for a in args {
                    a.collect_vars(ctx, seen, out);
                }
            }
            Ty::Struct(id) | Ty::Union(id) => {
                let Some(ctx) = ctx else { return };
                if !seen.insert(*id) {
                    return;
                }
                for member_ty in ctx.member_types(*id) {
                    member_ty.collect_vars(Some(ctx), seen, out);
                }
            }
            _ => {}
        }
    }

    pub fn contains_generic_param(&self) -> bool {
        match self {
            Ty::GenericParam(_) => true,
            Ty::Function { params, ret } => {
                params.iter().any(|p| p.ty.contains_generic_param()) || ret.contains_generic_param()
            }
            Ty::Ref(inner) | Ty::Ptr(inner) | Ty::WeakRef(inner) => inner.contains_generic_param(),
            Ty::GenericStruct { args, .. }
            | Ty::GenericUnion { args, .. }
            | Ty::TraitObject { args, .. } => args.iter().any(Ty::contains_generic_param),
            _ => false,
        }
    }

    /// Replace generic parameters by name. Parameters missing from `map`
    /// are left in place.
    pub fn substitute_params(&self, map: &FxHashMap<String, Ty>) -> Ty {
        match self {
            Ty::GenericParam(name) => map.get(name).cloned().unwrap_or_else(|| self.clone()),
            Ty::Function { params, ret } => Ty::Function {
                params: params
                    .iter()
                    .map(|p| Param {
                        ty: p.ty.substitute_params(map),
                        kind: p.kind,
                    })
                    .collect(),
                ret: Box::new(ret.substitute_params(map)),
            },
            Ty::Ref(inner) => Ty::Ref(Box::new(inner.substitute_params(map))),
            Ty::Ptr(inner) => Ty::Ptr(Box::new(inner.substitute_params(map))),
            Ty::WeakRef(inner) => Ty::WeakRef(Box::new(inner.substitute_params(map))),
            Ty::GenericStruct { template, args } => Ty::GenericStruct {
                template: *template,
                args: args.iter().map(|a| a.substitute_params(map)).collect(),
            },
            Ty::GenericUnion { template, args } => Ty::GenericUnion {
                template: *template,
                args: args.iter().map(|a| a.substitute_params(map)).collect(),
            },
            Ty::TraitObject { name, args } => Ty::TraitObject {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute_params(map)).collect(),
            },
            other => other.clone(),
        }
    }

    // ── Layout & Canonical Form ────────────────────────────────────────

    /// A string naming the physical shape of this type. Two types with the
    /// same key share one specialization.
    pub fn layout_key(&self, ctx: &DefContext) -> String {
        let mut visiting = FxHashSet::default();
        self.layout_key_inner(ctx, &mut visiting)
    }

    fn layout_key_inner(&self, ctx: &DefContext, visiting: &mut FxHashSet<DefId>) -> String {
        match self {
            Ty::Int => "I".into(),
            Ty::Int8 => "I8".into(),
            Ty::Int16 => "I16".into(),
            Ty::Int32 => "I32".into(),
            Ty::Int64 => "I64".into(),
            Ty::UInt => "U".into(),
            Ty::UInt8 => "U8".into(),
            Ty::UInt16 => "U16".into(),
            Ty::UInt32 => "U32".into(),
            Ty::UInt64 => "U64".into(),
            Ty::Float32 => "F32".into(),
            Ty::Float64 => "F64".into(),
            Ty::Bool => "B".into(),
            Ty::Void => "V".into(),
            Ty::Never => "N".into(),
            Ty::Function { params, ret } => {
                let params: Vec<Ty> = params.iter().map(|p| p.ty.clone()).collect();
                format!(
                    "Fn({})->{}",
                    join_layout_keys(&params, ctx, visiting),
                    ret.layout_key_inner(ctx, visiting)
                )
            }
            Ty::Ref(_) => "R_".into(),
            Ty::Ptr(inner) => format!("P_{}", inner.layout_key_inner(ctx, visiting)),
            Ty::WeakRef(_) => "W_".into(),
            Ty::GenericParam(name) => format!("Param_{name}"),
            Ty::Var(tv) => format!("TV_{}", tv.id),
            Ty::Module(path) => format!("M_{path}"),
            Ty::TraitObject { name, .. } => format!("Dyn_{name}"),
            Ty::Struct(id) | Ty::Union(id) => {
                let prefix = if matches!(self, Ty::Struct(_)) { "S" } else { "E" };
                let name = ctx.get_name(*id).unwrap_or("?");
                if !visiting.insert(*id) {
                    return format!("{prefix}_{name}");
                }
                let members = ctx.member_types(*id);
                let key = format!("{prefix}_{name}{{{}}}", join_layout_keys(&members, ctx, visiting));
                visiting.remove(id);
                key
            }
            Ty::GenericStruct { template, args } => format!(
                "GS_{}[{}]",
                ctx.get_name(*template).unwrap_or("?"),
                join_layout_keys(args, ctx, visiting)
            ),
            Ty::GenericUnion { template, args } => format!(
                "GE_{}[{}]",
                ctx.get_name(*template).unwrap_or("?"),
                join_layout_keys(args, ctx, visiting)
            ),
        }
    }

    /// Normal form for set and map membership: every reference collapses to
    /// `Void ref`, pointer and generic arguments are normalized recursively.
    pub fn canonical(&self) -> Ty {
        match self {
            Ty::Ref(_) => Ty::Ref(Box::new(Ty::Void)),
            Ty::Ptr(inner) => Ty::Ptr(Box::new(inner.canonical())),
            Ty::GenericStruct { template, args } => Ty::GenericStruct {
                template: *template,
                args: args.iter().map(Ty::canonical).collect(),
            },
            Ty::GenericUnion { template, args } => Ty::GenericUnion {
                template: *template,
                args: args.iter().map(Ty::canonical).collect(),
            },
            other => other.clone(),
        }
    }

    /// Renders the type with nominal names looked up in `ctx`.
    pub fn display<'a>(&'a self, ctx: &'a DefContext) -> TyDisplay<'a> {
        TyDisplay { ty: self, ctx }
    }
}

fn join_layout_keys(tys: &[Ty], ctx: &DefContext, visiting: &mut FxHashSet<DefId>) -> String {
    tys.iter()
        .map(|t| t.layout_key_inner(ctx, visiting))
        .collect::<Vec<_>>()
        .join(",")
}

fn write_list<'a>(
    f: &mut fmt::Formatter<'_>,
    tys: impl Iterator<Item = &'a Ty>,
    ctx: &DefContext,
) -> fmt::Result {
    for (i, t) in tys.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", t.display(ctx))?;
    }
    Ok(())
}

pub struct TyDisplay<'a> {
    ty: &'a Ty,
    ctx: &'a DefContext,
}

impl fmt::Display for TyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.ctx;
        match self.ty {
            Ty::Int => write!(f, "Int"),
            Ty::Int8 => write!(f, "Int8"),
            Ty::Int16 => write!(f, "Int16"),
            Ty::Int32 => write!(f, "Int32"),
            Ty::Int64 => write!(f, "Int64"),
            Ty::UInt => write!(f, "UInt"),
            Ty::UInt8 => write!(f, "UInt8"),
            Ty::UInt16 => write!(f, "UInt16"),
            Ty::UInt32 => write!(f, "UInt32"),
            Ty::UInt64 => write!(f, "UInt64"),
            Ty::Float32 => write!(f, "Float32"),
            Ty::Float64 => write!(f, "Float64"),
            Ty::Bool => write!(f, "Bool"),
            Ty::Void => write!(f, "Void"),
            Ty::Never => write!(f, "Never"),
            Ty::Function { params, ret } => {
                write!(f, "[")?;
                write_list(f, params.iter().map(|p| &p.ty), ctx)?;
                write!(f, "]{}", ret.display(ctx))
            }
            Ty::Struct(id) | Ty::Union(id) => write!(f, "{}", ctx.get_name(*id).unwrap_or("<unknown>")),
            Ty::Ref(inner) => write!(f, "{} ref", inner.display(ctx)),
            Ty::Ptr(inner) => write!(f, "{} ptr", inner.display(ctx)),
            Ty::WeakRef(inner) => write!(f, "{} weakref", inner.display(ctx)),
            Ty::GenericParam(name) => write!(f, "{name}"),
            Ty::GenericStruct { template, args } | Ty::GenericUnion { template, args } => {
                write!(f, "{}[", ctx.get_name(*template).unwrap_or("<unknown>"))?;
                write_list(f, args.iter(), ctx)?;
                write!(f, "]")
            }
            Ty::Var(tv) => write!(f, "{tv}"),
            Ty::TraitObject { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    write_list(f, args.iter(), ctx)?;
                    write!(f, "]")?;
                }
                Ok(())
            }
            Ty::Module(path) => write!(f, "module {path}"),
        }
    }
}
