//! Trait declarations, inheritance, object safety and the expected shape
//! of trait methods for a given implementing type.

use kestrel_ast::{ParamDecl, TypeNode, TypeParam};
use kestrel_common::{ModulePath, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::{DefContext, DefId};
use crate::error::{LocalError, SemanticErrorKind};
use crate::resolve::TypeResolver;
use crate::scope::Scope;
use crate::ty::{Param, Ty};

/// `Trait` or `Trait[Args]` as a bound or super-trait.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitConstraint {
    pub base_name: String,
    pub type_args: Vec<Ty>,
}

impl TraitConstraint {
    pub fn named(name: &str) -> Self {
        TraitConstraint {
            base_name: name.to_string(),
            type_args: Vec::new(),
        }
    }
}

/// A method requirement, kept as written so it can be resolved against any
/// implementing type.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitMethodSignature {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<ParamDecl>,
    pub ret: TypeNode,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitDeclInfo {
    pub name: String,
    pub def: DefId,
    pub type_params: Vec<String>,
    pub super_traits: Vec<TraitConstraint>,
    pub methods: Vec<TraitMethodSignature>,
    pub module_path: ModulePath,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct TraitTable {
    traits: FxHashMap<String, TraitDeclInfo>,
}

impl TraitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: TraitDeclInfo) -> Result<(), LocalError> {
        if self.traits.contains_key(&info.name) {
            return Err(LocalError::new(
                SemanticErrorKind::DuplicateTypeDefinition {
                    name: info.name.clone(),
                },
                info.span,
            ));
        }
        self.traits.insert(info.name.clone(), info);
        Ok(())
    }

    /// Replace the super-traits and methods of an already inserted trait.
    pub fn complete(
        &mut self,
        name: &str,
        super_traits: Vec<TraitConstraint>,
        methods: Vec<TraitMethodSignature>,
    ) {
        if let Some(info) = self.traits.get_mut(name) {
            info.super_traits = super_traits;
            info.methods = methods;
        }
    }

    pub fn get(&self, name: &str) -> Option<&TraitDeclInfo> {
        self.traits.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.traits.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.traits.keys().map(String::as_str)
    }

    fn undefined(name: &str) -> LocalError {
        LocalError::new(
            SemanticErrorKind::generic(format!("Undefined trait: {name}")),
            Span::default(),
        )
    }

    // ── Inheritance ────────────────────────────────────────────────────

    /// Whether `trait_name` is `target` or inherits from it, directly or
    /// through any chain of super-traits.
    pub fn inherits(&self, trait_name: &str, target: &str) -> bool {
        let mut visited = FxHashSet::default();
        self.inherits_inner(trait_name, target, &mut visited)
    }

    fn inherits_inner<'a>(
        &'a self,
        trait_name: &'a str,
        target: &str,
        visited: &mut FxHashSet<&'a str>,
    ) -> bool {
        if trait_name == target {
            return true;
        }
        if !visited.insert(trait_name) {
            return false;
        }
        let Some(info) = self.traits.get(trait_name) else {
            return false;
        };
        info.super_traits
            .iter()
            .any(|s| self.inherits_inner(&s.base_name, target, visited))
    }

    /// Whether a generic parameter declared with `bounds` satisfies
    /// `trait_name`, either directly or through a bound's super-traits.
    pub fn has_trait_bound(&self, bounds: &[TraitConstraint], trait_name: &str) -> bool {
        bounds.iter().any(|b| b.base_name == trait_name)
            || bounds.iter().any(|b| self.inherits(&b.base_name, trait_name))
    }

    /// The bound on a parameter that provides `trait_name`, if any.
    pub fn find_trait_constraint<'b>(
        &self,
        bounds: &'b [TraitConstraint],
        trait_name: &str,
    ) -> Option<&'b TraitConstraint> {
        bounds.iter().find(|b| b.base_name == trait_name)
    }

    /// `trait_name` and every trait it inherits from, nearest first.
    pub fn ancestors(&self, trait_name: &str) -> Vec<String> {
        let mut out = vec![trait_name.to_string()];
        let mut i = 0;
        while i < out.len() {
            if let Some(info) = self.traits.get(&out[i]) {
                for s in &info.super_traits {
                    if !out.contains(&s.base_name) {
                        out.push(s.base_name.clone());
                    }
                }
            }
            i += 1;
        }
        out
    }

    // ── Methods ────────────────────────────────────────────────────────

    /// All methods a conforming type must provide, super-trait methods
    /// first. A name already contributed by a parent is not repeated.
    pub fn ordered_methods(
        &self,
        trait_name: &str,
    ) -> Result<Vec<(String, TraitMethodSignature)>, LocalError> {
        let mut visited = FxHashSet::default();
        self.ordered_methods_inner(trait_name, &mut visited)
    }

    fn ordered_methods_inner(
        &self,
        trait_name: &str,
        visited: &mut FxHashSet<String>,
    ) -> Result<Vec<(String, TraitMethodSignature)>, LocalError> {
        if !visited.insert(trait_name.to_string()) {
            return Ok(Vec::new());
        }
        let info = self.get(trait_name).ok_or_else(|| Self::undefined(trait_name))?;
        let mut out: Vec<(String, TraitMethodSignature)> = Vec::new();
        let mut seen = FxHashSet::default();
        for parent in &info.super_traits {
            for entry in self.ordered_methods_inner(&parent.base_name, visited)? {
                if seen.insert(entry.1.name.clone()) {
                    out.push(entry);
                }
            }
        }
        for m in &info.methods {
            if seen.insert(m.name.clone()) {
                out.push((trait_name.to_string(), m.clone()));
            }
        }
        Ok(out)
    }

    /// Slot of `method` in the dispatch table of `trait_name`.
    pub fn method_index(&self, trait_name: &str, method: &str) -> Result<usize, LocalError> {
        self.ordered_methods(trait_name)?
            .iter()
            .position(|(_, m)| m.name == method)
            .ok_or_else(|| {
                LocalError::new(
                    SemanticErrorKind::generic(format!(
                        "Method '{method}' not found in trait '{trait_name}'"
                    )),
                    Span::default(),
                )
            })
    }

    /// Find a method by name among `trait_name` and its ancestors. Returns
    /// the declaring trait along with the signature.
    pub fn find_method(&self, trait_name: &str, method: &str) -> Option<(String, TraitMethodSignature)> {
        self.ordered_methods(trait_name)
            .ok()?
            .into_iter()
            .find(|(_, m)| m.name == method)
    }

    /// `Ok` if the trait can be used behind `ref` as a trait object,
    /// otherwise every reason it cannot.
    pub fn object_safety(&self, trait_name: &str) -> Result<(), Vec<String>> {
        let mut visited = FxHashSet::default();
        let reasons = self.object_safety_reasons(trait_name, &mut visited);
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }

    fn object_safety_reasons(&self, trait_name: &str, visited: &mut FxHashSet<String>) -> Vec<String> {
        if !visited.insert(trait_name.to_string()) {
            return Vec::new();
        }
        let Some(info) = self.get(trait_name) else {
            return vec![format!("trait '{trait_name}' is not declared")];
        };
        let mut reasons = Vec::new();
        for m in &info.methods {
            if !m.type_params.is_empty() {
                reasons.push(format!("method '{}' has generic type parameters", m.name));
            }
            for (i, p) in m.params.iter().enumerate() {
                if i == 0 && p.name == "self" {
                    continue;
                }
                if mentions_self(&p.ty) {
                    reasons.push(format!("method '{}' uses Self in parameter '{}'", m.name, p.name));
                }
            }
            if mentions_self(&m.ret) {
                reasons.push(format!("method '{}' uses Self in return type", m.name));
            }
        }
        for parent in &info.super_traits {
            for r in self.object_safety_reasons(&parent.base_name, visited) {
                reasons.push(format!("inherited from {}: {r}", parent.base_name));
            }
        }
        reasons
    }

    // ── Method Signatures ──────────────────────────────────────────────

    /// A scope for resolving `method` of `trait_name` with `Self` bound to
    /// `self_ty`, trait parameters bound to `trait_args` by position and
    /// method parameters left generic.
    fn method_scope(
        &self,
        scope: &Scope,
        self_ty: Ty,
        trait_name: &str,
        trait_args: &[Ty],
        method: &TraitMethodSignature,
    ) -> Scope {
        let inner = scope.child();
        inner.define_type("Self", self_ty);
        if let Some(info) = self.get(trait_name) {
            for (param, arg) in info.type_params.iter().zip(trait_args) {
                inner.define_type(param, arg.clone());
            }
        }
        for tp in &method.type_params {
            inner.define_type(&tp.name, Ty::GenericParam(tp.name.clone()));
        }
        inner
    }

    /// The function type an implementation of `method` for `self_ty` must
    /// have. A reference `self_ty` is looked through.
    pub fn expected_method_type(
        &self,
        resolver: &TypeResolver<'_>,
        scope: &Scope,
        self_ty: &Ty,
        trait_name: &str,
        trait_args: &[Ty],
        method: &TraitMethodSignature,
    ) -> Result<Ty, LocalError> {
        let inner = self.method_scope(scope, self_ty.strip_ref().clone(), trait_name, trait_args, method);
        let params = method
            .params
            .iter()
            .map(|p| resolver.resolve(&p.ty, &inner).map(|t| Param::new(t, p.mutable)))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = resolver.resolve(&method.ret, &inner)?;
        Ok(Ty::func(params, ret))
    }

    /// `name(mut p T, q U) Ret` with `Self` and trait parameters filled in.
    pub fn format_method_signature(
        &self,
        resolver: &TypeResolver<'_>,
        scope: &Scope,
        self_ty: &Ty,
        trait_name: &str,
        trait_args: &[Ty],
        method: &TraitMethodSignature,
    ) -> Result<String, LocalError> {
        let ctx: &DefContext = resolver.ctx;
        let inner = self.method_scope(scope, self_ty.clone(), trait_name, trait_args, method);
        let mut params = Vec::with_capacity(method.params.len());
        for p in &method.params {
            let ty = resolver.resolve(&p.ty, &inner)?;
            let prefix = if p.mutable { "mut " } else { "" };
            params.push(format!("{prefix}{} {}", p.name, ty.display(ctx)));
        }
        let ret = resolver.resolve(&method.ret, &inner)?;
        Ok(format!("{}({}) {}", method.name, params.join(", "), ret.display(ctx)))
    }
}

fn mentions_self(node: &TypeNode) -> bool {
    match node {
        TypeNode::SelfType { .. } => true,
        TypeNode::Named { name, .. } => name == "Self",
        TypeNode::Ref(inner) | TypeNode::Ptr(inner) | TypeNode::WeakRef(inner) => mentions_self(inner),
        TypeNode::Generic { args, .. } => args.iter().any(mentions_self),
        TypeNode::Function { params, ret, .. } => params.iter().any(mentions_self) || mentions_self(ret),
    }
}
