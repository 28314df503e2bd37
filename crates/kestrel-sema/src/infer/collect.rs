//! Declaration passes: names first, then everything a body can refer to.

use kestrel_ast::{
    FieldDecl, FunctionDecl, GivenDecl, Item, StructDecl, TraitDecl, TraitRef, TypeNode, TypeParam,
    UnionDecl,
};
use kestrel_common::{ModulePath, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{Bounds, Checker, FnTemplate, GivenPlan, GivenTarget, ImplCondition, ImplKey, MethodEntry};
use crate::config::GenericCopyPolicy;
use crate::context::{DefId, DefKind, Member, StructInfo, UnionCase, UnionInfo};
use crate::error::{LocalError, SemanticError, SemanticErrorKind};
use crate::locality::{check_bare_given, check_conformance, GivenOwner};
use crate::registry::GenericExtensionMethod;
use crate::resolve::TypeResolver;
use crate::scope::{Scope, Symbol};
use crate::traits::{TraitConstraint, TraitDeclInfo, TraitMethodSignature};
use crate::ty::{Param, Ty};

fn err(message: impl Into<String>, span: Span) -> LocalError {
    LocalError::new(SemanticErrorKind::generic(message), span)
}

fn duplicate(name: impl Into<String>, span: Span) -> LocalError {
    LocalError::new(SemanticErrorKind::DuplicateDefinition { name: name.into() }, span)
}

fn param_names(params: &[TypeParam]) -> Vec<String> {
    params.iter().map(|p| p.name.clone()).collect()
}

fn check_type_params(params: &[TypeParam]) -> Result<(), LocalError> {
    let mut seen = FxHashSet::default();
    for p in params {
        if !seen.insert(p.name.as_str()) {
            return Err(duplicate(&p.name, p.span));
        }
    }
    Ok(())
}

/// Whether a value of `ty` keeps a reference inline, looking through the
/// arguments of generic instances.
fn holds_reference(ty: &Ty) -> bool {
    match ty {
        Ty::Ref(_) | Ty::WeakRef(_) => true,
        Ty::GenericStruct { args, .. } | Ty::GenericUnion { args, .. } => {
            args.iter().any(holds_reference)
        }
        _ => false,
    }
}

impl Checker<'_> {
    // ── Pass 1: Declare ────────────────────────────────────────────────

    pub(super) fn declare_types(&mut self) -> Result<(), SemanticError> {
        let program = self.program;
        for (mi, module) in program.modules.iter().enumerate() {
            for (ii, item) in module.items.iter().enumerate() {
                self.declare_item(mi, ii, item)
                    .map_err(|e| self.locate(mi, e))?;
            }
        }
        tracing::debug!(defs = self.ctx.len(), "types declared");
        Ok(())
    }

    fn claim_type_name(&self, name: &str, span: Span) -> Result<(), LocalError> {
        if self.root.lookup_type(name).is_some()
            || self.root.lookup_template(name).is_some()
            || self.traits.contains(name)
        {
            return Err(LocalError::new(
                SemanticErrorKind::DuplicateTypeDefinition {
                    name: name.to_string(),
                },
                span,
            ));
        }
        Ok(())
    }

    fn declare_item(&mut self, mi: usize, ii: usize, item: &Item) -> Result<(), LocalError> {
        let path = self.module_path(mi);
        match item {
            Item::Struct(decl) => {
                self.claim_type_name(&decl.name, decl.span)?;
                check_type_params(&decl.type_params)?;
                let type_params = param_names(&decl.type_params);
                let kind = if type_params.is_empty() {
                    DefKind::Struct
                } else {
                    DefKind::StructTemplate
                };
                let id = self.ctx.allocate(kind, &decl.name, path.clone(), decl.span);
                self.ctx.update_struct_info(
                    id,
                    StructInfo {
                        type_params: type_params.clone(),
                        members: Vec::new(),
                        is_copy: false,
                        is_value: decl.is_value,
                    },
                );
                if type_params.is_empty() {
                    self.root.define_type(&decl.name, Ty::Struct(id));
                } else {
                    self.root.define_template(&decl.name, id);
                    self.registry.add_struct(id, path, decl.clone());
                }
                self.defs.insert((mi, ii), id);
            }
            Item::Union(decl) => {
                self.claim_type_name(&decl.name, decl.span)?;
                check_type_params(&decl.type_params)?;
                let type_params = param_names(&decl.type_params);
                let kind = if type_params.is_empty() {
                    DefKind::Union
                } else {
                    DefKind::UnionTemplate
                };
                let id = self.ctx.allocate(kind, &decl.name, path.clone(), decl.span);
                self.ctx.update_union_info(
                    id,
                    UnionInfo {
                        type_params: type_params.clone(),
                        cases: Vec::new(),
                        is_copy: false,
                        is_value: decl.is_value,
                    },
                );
                if type_params.is_empty() {
                    self.root.define_type(&decl.name, Ty::Union(id));
                } else {
                    self.root.define_template(&decl.name, id);
                    self.registry.add_union(id, path, decl.clone());
                }
                self.defs.insert((mi, ii), id);
            }
            Item::Trait(decl) => {
                self.claim_type_name(&decl.name, decl.span)?;
                check_type_params(&decl.type_params)?;
                let def = self.ctx.allocate(DefKind::Trait, &decl.name, path.clone(), decl.span);
                self.traits.insert(TraitDeclInfo {
                    name: decl.name.clone(),
                    def,
                    type_params: param_names(&decl.type_params),
                    super_traits: Vec::new(),
                    methods: Vec::new(),
                    module_path: path,
                    span: decl.span,
                })?;
            }
            Item::GlobalVar(_) | Item::Function(_) | Item::Given(_) => {}
        }
        Ok(())
    }

    // ── Pass 2a: Type Bodies ───────────────────────────────────────────

    /// A child of the root scope binding each parameter to itself.
    pub(super) fn generic_scope(&self, params: &[TypeParam]) -> Scope {
        let scope = self.root.child();
        for p in params {
            scope.define_type(&p.name, Ty::GenericParam(p.name.clone()));
        }
        scope
    }

    pub(super) fn resolve_type_bodies(&mut self) -> Result<(), SemanticError> {
        let program = self.program;
        for (mi, module) in program.modules.iter().enumerate() {
            for (ii, item) in module.items.iter().enumerate() {
                let Some(&id) = self.defs.get(&(mi, ii)) else {
                    continue;
                };
                let result = match item {
                    Item::Struct(decl) => self.resolve_struct(id, decl),
                    Item::Union(decl) => self.resolve_union(id, decl),
                    _ => Ok(()),
                };
                result.map_err(|e| self.locate(mi, e))?;
            }
        }
        self.settle_copy_flags();
        Ok(())
    }

    fn resolve_fields(
        &mut self,
        owner: &str,
        is_value: bool,
        fields: &[FieldDecl],
        scope: &Scope,
    ) -> Result<Vec<Member>, LocalError> {
        let mut seen = FxHashSet::default();
        let mut members = Vec::with_capacity(fields.len());
        for f in fields {
            if !seen.insert(f.name.as_str()) {
                return Err(duplicate(format!("{owner}.{}", f.name), f.span));
            }
            let ty = self.resolve_type(&f.ty, scope)?;
            if is_value {
                if holds_reference(&ty) {
                    return Err(LocalError::new(
                        SemanticErrorKind::InvalidFieldTypeInValueType {
                            ty: owner.to_string(),
                            field: f.name.clone(),
                            field_ty: ty.display(&self.ctx).to_string(),
                        },
                        f.span,
                    ));
                }
                if f.mutable {
                    return Err(LocalError::new(
                        SemanticErrorKind::InvalidMutableFieldInValueType {
                            ty: owner.to_string(),
                            field: f.name.clone(),
                        },
                        f.span,
                    ));
                }
            }
            self.note_type_uses(&ty, f.span)?;
            members.push(Member {
                name: f.name.clone(),
                ty,
                mutable: f.mutable,
            });
        }
        Ok(members)
    }

    fn resolve_struct(&mut self, id: DefId, decl: &StructDecl) -> Result<(), LocalError> {
        let scope = self.generic_scope(&decl.type_params);
        self.resolve_bounds(&decl.type_params, &scope)?;
        let members = self.resolve_fields(&decl.name, decl.is_value, &decl.fields, &scope)?;
        self.ctx.update_struct_info(
            id,
            StructInfo {
                type_params: param_names(&decl.type_params),
                members,
                is_copy: false,
                is_value: decl.is_value,
            },
        );
        Ok(())
    }

    fn resolve_union(&mut self, id: DefId, decl: &UnionDecl) -> Result<(), LocalError> {
        let scope = self.generic_scope(&decl.type_params);
        self.resolve_bounds(&decl.type_params, &scope)?;
        let mut seen = FxHashSet::default();
        let mut cases = Vec::with_capacity(decl.cases.len());
        for case in &decl.cases {
            let qualified = format!("{}.{}", decl.name, case.name);
            if !seen.insert(case.name.as_str()) {
                return Err(duplicate(qualified, case.span));
            }
            let params = self.resolve_fields(&qualified, decl.is_value, &case.params, &scope)?;
            cases.push(UnionCase {
                name: case.name.clone(),
                params,
            });
        }
        self.ctx.update_union_info(
            id,
            UnionInfo {
                type_params: param_names(&decl.type_params),
                cases,
                is_copy: false,
                is_value: decl.is_value,
            },
        );
        Ok(())
    }

    /// Value types whose members are all copy become copy, repeated until
    /// nothing changes. Reference types never are.
    fn settle_copy_flags(&mut self) {
        let mut ids: Vec<DefId> = self
            .defs
            .values()
            .copied()
            .filter(|id| self.ctx.is_value_type(*id))
            .collect();
        ids.sort();
        loop {
            let mut changed = false;
            for &id in &ids {
                if self.ctx.is_copy(id) {
                    continue;
                }
                let all_copy = self
                    .ctx
                    .member_types(id)
                    .iter()
                    .all(|t| t.is_copy(&self.ctx, GenericCopyPolicy::AssumeCopy));
                if !all_copy {
                    continue;
                }
                if let Some(mut info) = self.ctx.struct_info(id).cloned() {
                    info.is_copy = true;
                    self.ctx.update_struct_info(id, info);
                } else if let Some(mut info) = self.ctx.union_info(id).cloned() {
                    info.is_copy = true;
                    self.ctx.update_union_info(id, info);
                }
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }

    // ── Pass 2b: Signatures ────────────────────────────────────────────

    pub(super) fn resolve_signatures(&mut self) -> Result<(), SemanticError> {
        let program = self.program;
        for (mi, module) in program.modules.iter().enumerate() {
            for item in &module.items {
                if let Item::Trait(decl) = item {
                    self.resolve_trait(decl).map_err(|e| self.locate(mi, e))?;
                }
            }
        }
        for (mi, module) in program.modules.iter().enumerate() {
            for item in &module.items {
                if let Item::Trait(decl) = item {
                    self.check_trait_acyclic(decl).map_err(|e| self.locate(mi, e))?;
                }
            }
        }
        for (mi, module) in program.modules.iter().enumerate() {
            for item in &module.items {
                if let Item::Function(decl) = item {
                    self.declare_function(mi, decl)
                        .map_err(|e| self.locate(mi, e))?;
                }
            }
        }
        for (mi, module) in program.modules.iter().enumerate() {
            for (ii, item) in module.items.iter().enumerate() {
                if let Item::Given(decl) = item {
                    self.plan_given(mi, ii, decl)
                        .map_err(|e| self.locate(mi, e))?;
                }
            }
        }
        tracing::debug!(
            functions = self.fn_templates.len(),
            givens = self.plans.len(),
            "signatures resolved"
        );
        Ok(())
    }

    pub(super) fn trait_constraint(&self, r: &TraitRef, scope: &Scope) -> Result<TraitConstraint, LocalError> {
        let Some(info) = self.traits.get(&r.name) else {
            return Err(err(format!("Undefined trait: {}", r.name), r.span));
        };
        if info.type_params.len() != r.args.len() {
            return Err(err(
                format!(
                    "Trait '{}' expects {} type argument(s), got {}",
                    r.name,
                    info.type_params.len(),
                    r.args.len()
                ),
                r.span,
            ));
        }
        let type_args = r
            .args
            .iter()
            .map(|a| self.resolve_type(a, scope))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TraitConstraint {
            base_name: r.name.clone(),
            type_args,
        })
    }

    pub(super) fn resolve_bounds(&self, params: &[TypeParam], scope: &Scope) -> Result<Bounds, LocalError> {
        let mut bounds = FxHashMap::default();
        for p in params {
            let resolved = p
                .bounds
                .iter()
                .map(|b| self.trait_constraint(b, scope))
                .collect::<Result<Vec<_>, _>>()?;
            if !resolved.is_empty() {
                bounds.insert(p.name.clone(), resolved);
            }
        }
        Ok(bounds)
    }

    fn resolve_trait(&mut self, decl: &TraitDecl) -> Result<(), LocalError> {
        let scope = self.generic_scope(&decl.type_params);
        scope.define_type("Self", Ty::GenericParam("Self".to_string()));
        let supers = decl
            .super_traits
            .iter()
            .map(|r| self.trait_constraint(r, &scope))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = FxHashSet::default();
        let mut methods = Vec::with_capacity(decl.methods.len());
        for m in &decl.methods {
            if !seen.insert(m.name.as_str()) {
                return Err(duplicate(format!("{}.{}", decl.name, m.name), m.span));
            }
            check_type_params(&m.type_params)?;
            let inner = self.generic_scope_in(&scope, &m.type_params);
            self.resolve_bounds(&m.type_params, &inner)?;
            for p in &m.params {
                self.resolve_type(&p.ty, &inner)?;
            }
            self.resolve_type(&m.ret, &inner)?;
            methods.push(TraitMethodSignature {
                name: m.name.clone(),
                type_params: m.type_params.clone(),
                params: m.params.clone(),
                ret: m.ret.clone(),
                span: m.span,
            });
        }
        self.traits.complete(&decl.name, supers, methods);
        Ok(())
    }

    fn generic_scope_in(&self, outer: &Scope, params: &[TypeParam]) -> Scope {
        let scope = outer.child();
        for p in params {
            scope.define_type(&p.name, Ty::GenericParam(p.name.clone()));
        }
        scope
    }

    fn check_trait_acyclic(&self, decl: &TraitDecl) -> Result<(), LocalError> {
        let Some(info) = self.traits.get(&decl.name) else {
            return Ok(());
        };
        for parent in &info.super_traits {
            if self.traits.inherits(&parent.base_name, &decl.name) {
                return Err(err(
                    format!(
                        "Trait '{}' inherits from itself through '{}'",
                        decl.name, parent.base_name
                    ),
                    decl.span,
                ));
            }
        }
        Ok(())
    }

    /// `[A, B]R` for a declaration, resolved in `scope`.
    pub(super) fn signature(&self, decl: &FunctionDecl, scope: &Scope) -> Result<Ty, LocalError> {
        let mut seen = FxHashSet::default();
        let mut params = Vec::with_capacity(decl.params.len());
        for p in &decl.params {
            if !seen.insert(p.name.as_str()) {
                return Err(duplicate(&p.name, p.span));
            }
            params.push(Param::new(self.resolve_type(&p.ty, scope)?, p.mutable));
        }
        Ok(Ty::func(params, self.resolve_type(&decl.ret, scope)?))
    }

    fn declare_function(&mut self, mi: usize, decl: &FunctionDecl) -> Result<(), LocalError> {
        if self.root.lookup(&decl.name).is_some() || self.fn_templates.contains_key(&decl.name) {
            return Err(duplicate(&decl.name, decl.span));
        }
        check_type_params(&decl.type_params)?;
        let path = self.module_path(mi);
        let scope = self.generic_scope(&decl.type_params);
        let bounds = self.resolve_bounds(&decl.type_params, &scope)?;
        let ty = self.signature(decl, &scope)?;
        if decl.type_params.is_empty() {
            let def = self.ctx.allocate(DefKind::Function, &decl.name, path, decl.span);
            self.note_type_uses(&ty, decl.span)?;
            self.root
                .define_symbol(Symbol::function(&decl.name, ty, def));
        } else {
            let def = self
                .ctx
                .allocate(DefKind::FunctionTemplate, &decl.name, path.clone(), decl.span);
            self.registry.add_function(def, path, decl.clone());
            self.fn_templates.insert(
                decl.name.clone(),
                FnTemplate {
                    def,
                    type_params: param_names(&decl.type_params),
                    bounds,
                    ty,
                },
            );
        }
        Ok(())
    }

    // ── Pass 2c: Givens ────────────────────────────────────────────────

    fn plan_given(&mut self, mi: usize, ii: usize, g: &GivenDecl) -> Result<(), LocalError> {
        if let TypeNode::Named { name, .. } = &g.subject {
            if self.traits.contains(name) && self.root.lookup_type(name).is_none() {
                return self.plan_trait_extension(mi, ii, name, g);
            }
        }

        let path = self.module_path(mi);
        check_type_params(&g.type_params)?;
        let scope = self.generic_scope(&g.type_params);
        let bounds = self.resolve_bounds(&g.type_params, &scope)?;
        let subject = self
            .resolve_type(&g.subject, &scope)?
            .strip_ref()
            .clone();
        let subject_span = g.subject.span();

        let (key, subject_params) = match &subject {
            Ty::GenericStruct { template, args } | Ty::GenericUnion { template, args } => {
                let mut names = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Ty::GenericParam(n)
                            if g.type_params.iter().any(|p| &p.name == n) && !names.contains(n) =>
                        {
                            names.push(n.clone())
                        }
                        _ => {
                            return Err(err(
                                "A given for a generic type must name it with its own distinct type parameters, as in 'given[T] Box[T]'",
                                subject_span,
                            ))
                        }
                    }
                }
                if names.len() != g.type_params.len() {
                    return Err(err("Every type parameter of a given must appear in its subject", g.span));
                }
                (ImplKey::Template(*template), names)
            }
            Ty::GenericParam(n) => {
                return Err(err(
                    format!("Cannot declare a given for type parameter '{n}'"),
                    subject_span,
                ))
            }
            other => {
                if !g.type_params.is_empty() {
                    return Err(err("Every type parameter of a given must appear in its subject", g.span));
                }
                let key = ImplKey::of(other).ok_or_else(|| {
                    err(
                        format!("Cannot declare a given for '{}'", other.display(&self.ctx)),
                        subject_span,
                    )
                })?;
                (key, Vec::new())
            }
        };

        let owner = GivenOwner::of_type(&subject, &self.ctx, &self.config.std_module_path())
            .ok_or_else(|| {
                err(
                    format!("Cannot declare a given for '{}'", subject.display(&self.ctx)),
                    subject_span,
                )
            })?;
        let conformance = match &g.conformance {
            Some(r) => {
                let c = self.trait_constraint(r, &scope)?;
                let trait_path = self
                    .traits
                    .get(&r.name)
                    .map(|t| t.module_path.clone())
                    .unwrap_or_default();
                check_conformance(&path, &owner, &GivenOwner::trait_owner(&r.name, trait_path))
                    .map_err(|k| LocalError::new(k, g.span))?;
                Some((c, r.span))
            }
            None => {
                check_bare_given(&path, &owner).map_err(|k| LocalError::new(k, g.span))?;
                None
            }
        };

        scope.define_type("Self", subject.clone());
        let owner_name = owner.display_name;
        for m in &g.methods {
            let entry = self.method_entry(&owner_name, m, &scope, &bounds, subject_params.clone(), &path)?;
            let table = self.methods.entry(key.clone()).or_default();
            if table.contains_key(&m.name) {
                return Err(duplicate(format!("{owner_name}.{}", m.name), m.span));
            }
            table.insert(m.name.clone(), entry);
            if let ImplKey::Template(template) = &key {
                self.registry.add_extension_method(
                    &owner_name,
                    GenericExtensionMethod {
                        subject: *template,
                        module_path: path.clone(),
                        type_params: g.type_params.clone(),
                        method: m.clone(),
                    },
                );
            }
        }

        if let Some((c, span)) = &conformance {
            let condition = ImplCondition {
                subject_params,
                bounds: bounds.clone(),
            };
            self.verify_conformance(&key, &subject, &owner_name, c, condition, g, &scope, *span)?;
        }
        self.plans.insert(
            (mi, ii),
            GivenPlan {
                target: GivenTarget::Type(key),
                subject,
                conformance,
                scope,
                bounds,
                span: g.span,
            },
        );
        Ok(())
    }

    fn plan_trait_extension(
        &mut self,
        mi: usize,
        ii: usize,
        trait_name: &str,
        g: &GivenDecl,
    ) -> Result<(), LocalError> {
        let Some(info) = self.traits.get(trait_name) else {
            return Err(err(format!("Undefined trait: {trait_name}"), g.span));
        };
        if g.conformance.is_some() || !g.type_params.is_empty() || !info.type_params.is_empty() {
            return Err(err(
                format!("A trait extension 'given {trait_name}' takes no type parameters or conformance"),
                g.span,
            ));
        }
        let path = self.module_path(mi);
        let owner = GivenOwner::trait_owner(trait_name, info.module_path.clone());
        check_bare_given(&path, &owner).map_err(|k| LocalError::new(k, g.span))?;

        let self_ty = Ty::GenericParam("Self".to_string());
        let scope = self.root.child();
        scope.define_type("Self", self_ty.clone());
        let mut bounds = FxHashMap::default();
        bounds.insert("Self".to_string(), vec![TraitConstraint::named(trait_name)]);

        for m in &g.methods {
            if self.traits.find_method(trait_name, &m.name).is_some() {
                return Err(duplicate(format!("{trait_name}.{}", m.name), m.span));
            }
            let entry = self.method_entry(trait_name, m, &scope, &bounds, Vec::new(), &path)?;
            let table = self.trait_extensions.entry(trait_name.to_string()).or_default();
            if table.contains_key(&m.name) {
                return Err(duplicate(format!("{trait_name}.{}", m.name), m.span));
            }
            table.insert(m.name.clone(), entry);
        }
        self.plans.insert(
            (mi, ii),
            GivenPlan {
                target: GivenTarget::Trait(trait_name.to_string()),
                subject: self_ty,
                conformance: None,
                scope,
                bounds,
                span: g.span,
            },
        );
        Ok(())
    }

    fn method_entry(
        &mut self,
        owner: &str,
        m: &FunctionDecl,
        scope: &Scope,
        outer_bounds: &Bounds,
        subject_params: Vec<String>,
        path: &ModulePath,
    ) -> Result<MethodEntry, LocalError> {
        check_type_params(&m.type_params)?;
        let inner = self.generic_scope_in(scope, &m.type_params);
        let mut bounds = outer_bounds.clone();
        bounds.extend(self.resolve_bounds(&m.type_params, &inner)?);
        let ty = self.signature(m, &inner)?;
        self.note_type_uses(&ty, m.span)?;
        let def = self.ctx.allocate(
            DefKind::Method,
            &format!("{owner}.{}", m.name),
            path.clone(),
            m.span,
        );
        Ok(MethodEntry {
            def,
            owner: owner.to_string(),
            decl: m.clone(),
            ty,
            has_self: m.params.first().is_some_and(|p| p.name == "self"),
            subject_params,
            type_params: param_names(&m.type_params),
            bounds,
        })
    }

    /// Arguments `c` implies for its ancestor `target`, with `Self` bound
    /// to `subject`.
    pub(super) fn inherited_args(&self, c: &TraitConstraint, target: &str, subject: &Ty) -> Option<Vec<Ty>> {
        if c.base_name == target {
            return Some(c.type_args.clone());
        }
        let info = self.traits.get(&c.base_name)?;
        let mut map: FxHashMap<String, Ty> = info
            .type_params
            .iter()
            .cloned()
            .zip(c.type_args.iter().cloned())
            .collect();
        map.insert("Self".to_string(), subject.clone());
        info.super_traits.iter().find_map(|s| {
            let parent = TraitConstraint {
                base_name: s.base_name.clone(),
                type_args: s.type_args.iter().map(|t| t.substitute_params(&map)).collect(),
            };
            self.inherited_args(&parent, target, subject)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_conformance(
        &mut self,
        key: &ImplKey,
        subject: &Ty,
        subject_name: &str,
        c: &TraitConstraint,
        condition: ImplCondition,
        g: &GivenDecl,
        scope: &Scope,
        span: Span,
    ) -> Result<(), LocalError> {
        let trait_name = &c.base_name;
        if !self
            .declared_conformances
            .insert((key.clone(), trait_name.clone()))
        {
            return Err(err(
                format!("Conflicting conformance: 'given {subject_name}: {trait_name}' is already declared"),
                span,
            ));
        }
        let required = self
            .traits
            .ordered_methods(trait_name)
            .map_err(|e| LocalError::new(e.kind, span))?;
        let resolver = TypeResolver::new(&self.ctx, &self.traits);
        let declared = self.methods.get(key);
        for (owner_trait, sig) in &required {
            let args = self
                .inherited_args(c, owner_trait, subject)
                .unwrap_or_default();
            let expected = self
                .traits
                .expected_method_type(&resolver, scope, subject, owner_trait, &args, sig)?;
            let found = declared
                .and_then(|t| t.get(&sig.name))
                .filter(|_| g.methods.iter().any(|m| m.name == sig.name));
            let Some(found) = found else {
                let text = self
                    .traits
                    .format_method_signature(&resolver, scope, subject, owner_trait, &args, sig)?;
                return Err(err(
                    format!(
                        "Given '{subject_name}: {trait_name}' is missing method '{text}' required by trait '{owner_trait}'"
                    ),
                    span,
                ));
            };
            let renamed: FxHashMap<String, Ty> = found
                .type_params
                .iter()
                .cloned()
                .zip(sig.type_params.iter().map(|p| Ty::GenericParam(p.name.clone())))
                .collect();
            let found_ty = found.ty.substitute_params(&renamed);
            if found.type_params.len() != sig.type_params.len() || found_ty != expected {
                return Err(LocalError::new(
                    SemanticErrorKind::generic(format!(
                        "Method '{}' of '{subject_name}' does not match trait '{owner_trait}': expected '{}', found '{}'",
                        sig.name,
                        expected.display(&self.ctx),
                        found.ty.display(&self.ctx)
                    )),
                    found.decl.span,
                ));
            }
        }
        let ancestors = self.traits.ancestors(trait_name);
        let table = self.impls.entry(key.clone()).or_default();
        for ancestor in ancestors {
            table.entry(ancestor).or_insert_with(|| condition.clone());
        }
        Ok(())
    }

    // ── Pass 2d: Layout ────────────────────────────────────────────────

    pub(super) fn reject_infinite_types(&self) -> Result<(), SemanticError> {
        let cycles = self.cycles();
        let Some(first) = cycles.first() else {
            return Ok(());
        };
        let kind = if cycles.len() == 1 {
            first.to_error_kind()
        } else {
            SemanticErrorKind::generic(format!(
                "{} infinite-size value types: {} (break each cycle with ref, ptr or weakref)",
                cycles.len(),
                cycles
                    .iter()
                    .map(|c| c.detailed_path_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            ))
        };
        let node = first.path.get(first.start_index).or(first.path.first());
        let span = node.map(|n| n.span).unwrap_or_default();
        let path = node
            .and_then(|n| self.ctx.get_module_path(n.def))
            .cloned()
            .unwrap_or_default();
        Err(self.locate_path(&path, LocalError::new(kind, span)))
    }
}
