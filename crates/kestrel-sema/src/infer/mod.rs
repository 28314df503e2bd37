//! The checker.
//!
//! Checking runs in three passes over every module of the program:
//!
//! 1. [`collect`]: declare every struct, union and trait so later passes can
//!    name them regardless of declaration order.
//! 2. [`collect`]: resolve fields, trait signatures, function signatures and
//!    `given` blocks, verify conformances, then reject infinite-size value
//!    types.
//! 3. [`body`], [`expr`] and [`pattern`]: walk each global and function
//!    body, emit constraints, solve them per body and lower the typed tree
//!    to [`ResolvedTy`].
//!
//! The first error aborts the run.

mod body;
mod collect;
mod expr;
mod pattern;

use kestrel_ast::{FunctionDecl, Program, TypeNode};
use kestrel_common::{LineIndex, ModulePath, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::SemaConfig;
use crate::constraint::Constraint;
use crate::context::{DefContext, DefId, StructInfo};
use crate::context::DefKind;
use crate::error::{LocalError, SemanticError, SemanticErrorKind};
use crate::instantiation::{InstantiationKind, InstantiationRequest, InstantiationSet};
use crate::output::TypeCheckerOutput;
use crate::recursive::{RecursionCycle, RecursiveTypeChecker};
use crate::registry::GenericTemplateRegistry;
use crate::resolve::TypeResolver;
use crate::resolved::ResolvedTy;
use crate::scope::Scope;
use crate::solver::{ConstraintSolver, SolveError, TraitOracle};
use crate::subst::Substitution;
use crate::traits::{TraitConstraint, TraitTable};
use crate::ty::{Ty, TypeVar, TypeVarGen};

/// Bounds declared on type parameters, by parameter name.
pub(crate) type Bounds = FxHashMap<String, Vec<TraitConstraint>>;

// ── Implementation Keys ────────────────────────────────────────────────

/// What a `given` attaches methods and conformances to. All
/// specializations of a generic template share one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ImplKey {
    Concrete(Ty),
    Template(DefId),
}

impl ImplKey {
    pub(crate) fn of(ty: &Ty) -> Option<ImplKey> {
        match ty.strip_ref() {
            Ty::GenericStruct { template, .. } | Ty::GenericUnion { template, .. } => {
                Some(ImplKey::Template(*template))
            }
            Ty::Var(_) | Ty::GenericParam(_) | Ty::TraitObject { .. } | Ty::Module(_) | Ty::Never => None,
            other => Some(ImplKey::Concrete(other.clone())),
        }
    }
}

/// A method declared in a `given`.
#[derive(Debug, Clone)]
pub(crate) struct MethodEntry {
    pub def: DefId,
    /// Display name of the subject (`Point`, `Box`, or a trait name).
    pub owner: String,
    pub decl: FunctionDecl,
    /// Full signature; the receiver comes first when `has_self`.
    pub ty: Ty,
    pub has_self: bool,
    /// Parameters of the `given` standing for the subject's arguments, in
    /// argument order. Empty unless the subject is a generic template.
    pub subject_params: Vec<String>,
    /// Method-level type parameters.
    pub type_params: Vec<String>,
    pub bounds: Bounds,
}

/// Signature of a generic function.
#[derive(Debug, Clone)]
pub(crate) struct FnTemplate {
    pub def: DefId,
    pub type_params: Vec<String>,
    pub bounds: Bounds,
    pub ty: Ty,
}

#[derive(Debug, Clone)]
pub(crate) enum GivenTarget {
    Type(ImplKey),
    /// `given Trait { .. }`: methods for every conforming type.
    Trait(String),
}

/// A resolved `given`, kept for body checking.
#[derive(Debug, Clone)]
pub(crate) struct GivenPlan {
    pub target: GivenTarget,
    pub subject: Ty,
    pub conformance: Option<(TraitConstraint, Span)>,
    /// Binds the given's type parameters and `Self`.
    pub scope: Scope,
    pub bounds: Bounds,
    pub span: Span,
}

// ── Trait Oracle ───────────────────────────────────────────────────────

/// When a declared conformance holds. For a generic subject, each argument
/// must meet the bounds of the given parameter standing for it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ImplCondition {
    pub subject_params: Vec<String>,
    pub bounds: Bounds,
}

/// Declared conformances by implementation key, then trait name.
pub(crate) type ImplTable = FxHashMap<ImplKey, FxHashMap<String, ImplCondition>>;

/// Conformance as known after declaration collection, plus the bounds in
/// force inside the body being solved.
pub(crate) struct Conformance<'a> {
    pub traits: &'a TraitTable,
    pub impls: &'a ImplTable,
    pub bounds: &'a Bounds,
}

impl TraitOracle for Conformance<'_> {
    fn satisfies(&self, ty: &Ty, trait_name: &str) -> bool {
        match ty {
            Ty::Never => true,
            Ty::Ref(inner) => self.satisfies(inner, trait_name),
            Ty::GenericParam(name) => self
                .bounds
                .get(name)
                .is_some_and(|b| self.traits.has_trait_bound(b, trait_name)),
            Ty::TraitObject { name, .. } => self.traits.inherits(name, trait_name),
            other => {
                let Some(condition) = ImplKey::of(other)
                    .and_then(|key| self.impls.get(&key))
                    .and_then(|table| table.get(trait_name))
                else {
                    return false;
                };
                let args: &[Ty] = match other {
                    Ty::GenericStruct { args, .. } | Ty::GenericUnion { args, .. } => args,
                    _ => &[],
                };
                condition
                    .subject_params
                    .iter()
                    .zip(args)
                    .all(|(param, arg)| {
                        condition.bounds.get(param).map_or(true, |bounds| {
                            bounds.iter().all(|b| self.satisfies(arg, &b.base_name))
                        })
                    })
            }
        }
    }
}

// ── Per-body State ─────────────────────────────────────────────────────

/// A specialization asked for while checking a body. Arguments are lowered
/// once the body is solved.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub kind: InstantiationKind,
    pub template: DefId,
    pub template_name: String,
    pub args: Vec<Ty>,
    pub span: Span,
}

/// Everything that lives for the checking of one body.
pub(crate) struct FnCx {
    pub scope: Scope,
    pub solver: ConstraintSolver,
    pub ret: Ty,
    pub loop_depth: u32,
    pub bounds: Bounds,
    pub pending: Vec<PendingRequest>,
}

impl FnCx {
    pub(crate) fn new(scope: Scope, ret: Ty, bounds: Bounds) -> Self {
        FnCx {
            scope,
            solver: ConstraintSolver::new(),
            ret,
            loop_depth: 0,
            bounds,
            pending: Vec::new(),
        }
    }
}

// ── Checker ────────────────────────────────────────────────────────────

struct FileInfo {
    file_name: String,
    path: ModulePath,
    lines: LineIndex,
}

pub(crate) struct Checker<'p> {
    program: &'p Program,
    config: SemaConfig,
    files: Vec<FileInfo>,
    ctx: DefContext,
    traits: TraitTable,
    gen: TypeVarGen,
    root: Scope,
    string_def: DefId,
    registry: GenericTemplateRegistry,
    requests: InstantiationSet,
    impls: ImplTable,
    declared_conformances: FxHashSet<(ImplKey, String)>,
    methods: FxHashMap<ImplKey, FxHashMap<String, MethodEntry>>,
    trait_extensions: FxHashMap<String, FxHashMap<String, MethodEntry>>,
    fn_templates: FxHashMap<String, FnTemplate>,
    /// Definitions of structs and unions by (module, item) index.
    defs: FxHashMap<(usize, usize), DefId>,
    plans: FxHashMap<(usize, usize), GivenPlan>,
}

fn builtin_types(string_def: DefId) -> FxHashMap<String, Ty> {
    let mut map = FxHashMap::default();
    for (name, ty) in [
        ("Int", Ty::Int),
        ("Int8", Ty::Int8),
        ("Int16", Ty::Int16),
        ("Int32", Ty::Int32),
        ("Int64", Ty::Int64),
        ("UInt", Ty::UInt),
        ("UInt8", Ty::UInt8),
        ("UInt16", Ty::UInt16),
        ("UInt32", Ty::UInt32),
        ("UInt64", Ty::UInt64),
        ("Float", Ty::Float64),
        ("Float32", Ty::Float32),
        ("Float64", Ty::Float64),
        ("Bool", Ty::Bool),
        ("Void", Ty::Void),
        ("String", Ty::Struct(string_def)),
    ] {
        map.insert(name.to_string(), ty);
    }
    map
}

impl<'p> Checker<'p> {
    pub(crate) fn new(program: &'p Program, config: &SemaConfig) -> Self {
        let mut ctx = DefContext::new();
        let string_def = ctx.allocate(
            DefKind::Struct,
            "String",
            config.std_module_path(),
            Span::default(),
        );
        ctx.update_struct_info(
            string_def,
            StructInfo {
                type_params: Vec::new(),
                members: Vec::new(),
                is_copy: false,
                is_value: false,
            },
        );
        let files = program
            .modules
            .iter()
            .map(|m| FileInfo {
                file_name: m.file_name.clone(),
                path: m.path.clone(),
                lines: LineIndex::new(&m.source),
            })
            .collect();
        Checker {
            program,
            config: config.clone(),
            files,
            ctx,
            traits: TraitTable::new(),
            gen: TypeVarGen::new(),
            root: Scope::root(builtin_types(string_def)),
            string_def,
            registry: GenericTemplateRegistry::new(),
            requests: InstantiationSet::new(),
            impls: FxHashMap::default(),
            declared_conformances: FxHashSet::default(),
            methods: FxHashMap::default(),
            trait_extensions: FxHashMap::default(),
            fn_templates: FxHashMap::default(),
            defs: FxHashMap::default(),
            plans: FxHashMap::default(),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(modules = self.program.modules.len()))]
    pub(crate) fn run(mut self) -> Result<TypeCheckerOutput, SemanticError> {
        self.declare_types()?;
        self.resolve_type_bodies()?;
        self.resolve_signatures()?;
        self.reject_infinite_types()?;
        let program = self.check_bodies()?;
        tracing::debug!(
            defs = self.ctx.len(),
            requests = self.requests.len(),
            templates = self.registry.len(),
            "check done"
        );
        Ok(TypeCheckerOutput {
            program,
            instantiation_requests: self.requests,
            generic_templates: self.registry,
        })
    }

    /// Declare and resolve nominal types only, then report every cycle.
    pub(crate) fn find_cycles(mut self) -> Result<Vec<RecursionCycle>, SemanticError> {
        self.declare_types()?;
        self.resolve_type_bodies()?;
        Ok(self.cycles())
    }

    fn cycles(&self) -> Vec<RecursionCycle> {
        let checker = RecursiveTypeChecker::new(&self.ctx);
        if self.config.report_all_cycles {
            checker.check()
        } else {
            checker.first_cycle().into_iter().collect()
        }
    }

    // ── Locations ──────────────────────────────────────────────────────

    fn locate(&self, module: usize, err: LocalError) -> SemanticError {
        match self.files.get(module) {
            Some(file) => err.locate(&file.file_name, &file.lines),
            None => err.locate("<unknown>", &LineIndex::new("")),
        }
    }

    /// Locate an error in the file that declares `path`.
    fn locate_path(&self, path: &ModulePath, err: LocalError) -> SemanticError {
        let module = self
            .files
            .iter()
            .position(|f| &f.path == path)
            .unwrap_or(usize::MAX);
        self.locate(module, err)
    }

    fn module_path(&self, module: usize) -> ModulePath {
        self.files
            .get(module)
            .map(|f| f.path.clone())
            .unwrap_or_default()
    }

    // ── Shared Helpers ─────────────────────────────────────────────────

    fn resolve_type(&self, node: &TypeNode, scope: &Scope) -> Result<Ty, LocalError> {
        TypeResolver::new(&self.ctx, &self.traits).resolve(node, scope)
    }

    fn conforms(&self, ty: &Ty, trait_name: &str, bounds: &Bounds) -> bool {
        Conformance {
            traits: &self.traits,
            impls: &self.impls,
            bounds,
        }
        .satisfies(ty, trait_name)
    }

    fn solve_error(&self, err: SolveError) -> LocalError {
        LocalError::new(err.error.to_kind(&self.ctx), err.span)
    }

    /// Feed everything added to the solver so far to the unifier.
    fn settle(&self, cx: &mut FnCx) -> Result<(), LocalError> {
        cx.solver
            .solve_structural(&self.ctx)
            .map_err(|e| self.solve_error(e))
    }

    fn unify(&self, cx: &mut FnCx, expected: Ty, actual: Ty, span: Span) -> Result<(), LocalError> {
        cx.solver.equal(expected, actual, span);
        self.settle(cx)
    }

    fn instantiate(&self, cx: &mut FnCx, var: &TypeVar, template: DefId, args: &[Ty], span: Span) -> Result<(), LocalError> {
        cx.solver.add(Constraint::Instantiate {
            var: var.clone(),
            template,
            args: args.to_vec(),
            span,
        });
        self.settle(cx)
    }

    /// Request every concrete generic instance mentioned by `ty`. Used for
    /// annotations, which never hold type variables.
    fn note_type_uses(&mut self, ty: &Ty, span: Span) -> Result<(), LocalError> {
        let mut found = Vec::new();
        generic_instances(ty, &mut found);
        for (kind, template, args) in found {
            let request = PendingRequest {
                kind,
                template_name: self.ctx.get_name(template).unwrap_or("<unknown>").to_string(),
                template,
                args,
                span,
            };
            self.record_request(&Substitution::new(), request)?;
        }
        Ok(())
    }

    // ── Phase Boundary ─────────────────────────────────────────────────

    /// Solve a finished body and record its instantiation requests. The
    /// returned substitution lowers the body's annotations.
    fn finish(&mut self, cx: FnCx) -> Result<Substitution, LocalError> {
        let FnCx {
            mut solver,
            bounds,
            pending,
            ..
        } = cx;
        let subst = {
            let oracle = Conformance {
                traits: &self.traits,
                impls: &self.impls,
                bounds: &bounds,
            };
            solver
                .solve(&self.ctx, &oracle)
                .map_err(|e| self.solve_error(e))?
        };
        for request in pending {
            self.record_request(&subst, request)?;
        }
        Ok(subst)
    }

    fn lower(&mut self, subst: &Substitution, ty: &Ty) -> Result<ResolvedTy, LocalError> {
        let applied = subst.apply(ty, &mut self.ctx);
        ResolvedTy::from_ty(&applied, &self.ctx).map_err(cannot_infer)
    }

    fn record_request(&mut self, subst: &Substitution, request: PendingRequest) -> Result<(), LocalError> {
        let args = request
            .args
            .iter()
            .map(|a| self.lower(subst, a))
            .collect::<Result<Vec<_>, _>>()?;
        // Uses inside a template body are requested again when the
        // template itself is specialized.
        if args.iter().any(ResolvedTy::contains_generic_param) {
            return Ok(());
        }
        self.requests.insert(InstantiationRequest {
            kind: request.kind,
            template: request.template,
            template_name: request.template_name,
            args,
            span: request.span,
        });
        Ok(())
    }
}

fn cannot_infer(tv: TypeVar) -> LocalError {
    let span = tv.span;
    LocalError::new(
        SemanticErrorKind::generic("Cannot infer a type here; add a type annotation"),
        span,
    )
}

/// Generic struct and union instances inside `ty`, outermost first.
fn generic_instances(ty: &Ty, out: &mut Vec<(InstantiationKind, DefId, Vec<Ty>)>) {
    match ty {
        Ty::GenericStruct { template, args } => {
            out.push((InstantiationKind::Struct, *template, args.clone()));
            args.iter().for_each(|a| generic_instances(a, out));
        }
        Ty::GenericUnion { template, args } => {
            out.push((InstantiationKind::Union, *template, args.clone()));
            args.iter().for_each(|a| generic_instances(a, out));
        }
        Ty::Function { params, ret } => {
            params.iter().for_each(|p| generic_instances(&p.ty, out));
            generic_instances(ret, out);
        }
        Ty::Ref(inner) | Ty::Ptr(inner) | Ty::WeakRef(inner) => generic_instances(inner, out),
        Ty::TraitObject { args, .. } => args.iter().for_each(|a| generic_instances(a, out)),
        _ => {}
    }
}
