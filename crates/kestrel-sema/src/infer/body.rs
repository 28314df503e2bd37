//! Pass 3: globals, function bodies and statements.

use std::mem;

use kestrel_ast::{Expr, ExprKind, FunctionDecl, GivenDecl, GlobalVarDecl, Item, Stmt};
use kestrel_common::Span;

use super::{cannot_infer, Bounds, Checker, FnCx, GivenTarget, ImplKey};
use crate::error::{LocalError, SemanticError, SemanticErrorKind};
use crate::resolved::ResolvedTy;
use crate::scope::{Scope, SymbolKind};
use crate::subst::Substitution;
use crate::ty::Ty;
use crate::typed::{
    TemplateKind, TypedCase, TypedExpr, TypedExprKind, TypedField, TypedFunction, TypedGlobal,
    TypedItem, TypedModule, TypedParam, TypedProgram, TypedStmt,
};

impl Checker<'_> {
    pub(super) fn check_bodies(&mut self) -> Result<TypedProgram, SemanticError> {
        let program = self.program;
        let mut slots: Vec<Vec<Option<TypedItem>>> = program
            .modules
            .iter()
            .map(|m| m.items.iter().map(|_| None).collect())
            .collect();

        // Globals are visible to every body, so they go first, in order.
        for (mi, module) in program.modules.iter().enumerate() {
            for (ii, item) in module.items.iter().enumerate() {
                if let Item::GlobalVar(decl) = item {
                    let typed = self.check_global(decl).map_err(|e| self.locate(mi, e))?;
                    slots[mi][ii] = Some(typed);
                }
            }
        }

        for (mi, module) in program.modules.iter().enumerate() {
            for (ii, item) in module.items.iter().enumerate() {
                let typed = match item {
                    Item::GlobalVar(_) => continue,
                    Item::Function(decl) => self.check_function_item(decl),
                    Item::Struct(_) | Item::Union(_) => self.type_item(mi, ii),
                    Item::Trait(decl) => Ok(TypedItem::Trait {
                        name: decl.name.clone(),
                        methods: decl.methods.iter().map(|m| m.name.clone()).collect(),
                    }),
                    Item::Given(decl) => self.check_given(mi, ii, decl),
                };
                slots[mi][ii] = Some(typed.map_err(|e| self.locate(mi, e))?);
            }
        }

        let modules = program
            .modules
            .iter()
            .zip(slots)
            .map(|(m, items)| TypedModule {
                path: m.path.clone(),
                file_name: m.file_name.clone(),
                items: items.into_iter().flatten().collect(),
            })
            .collect();
        Ok(TypedProgram { modules })
    }

    fn lower_expr(&mut self, subst: &Substitution, e: TypedExpr<Ty>) -> Result<TypedExpr<ResolvedTy>, LocalError> {
        e.try_map(&mut |t| self.lower(subst, &t))
    }

    // ── Items ──────────────────────────────────────────────────────────

    fn check_global(&mut self, decl: &GlobalVarDecl) -> Result<TypedItem, LocalError> {
        if self.root.lookup(&decl.name).is_some() || self.fn_templates.contains_key(&decl.name) {
            return Err(LocalError::new(
                SemanticErrorKind::DuplicateDefinition {
                    name: decl.name.clone(),
                },
                decl.span,
            ));
        }
        let mut cx = FnCx::new(self.root.child(), Ty::Void, Bounds::default());
        let mut value = self.infer_expr(&mut cx, &decl.value)?;
        let declared = match &decl.ty {
            Some(node) => {
                let ty = self.resolve_type(node, &self.root)?;
                self.note_pending(&mut cx, &ty, node.span());
                value = self.coerce(&mut cx, &ty, value, decl.value.span)?;
                ty
            }
            None => value.ty.clone(),
        };
        let subst = self.finish(cx)?;
        let ty = subst.apply(&declared, &mut self.ctx);
        // Rejects globals whose type is still open.
        self.lower(&subst, &ty)?;
        let value = self.lower_expr(&subst, value)?;
        self.root.define(&decl.name, ty, decl.mutable);
        Ok(TypedItem::Global(TypedGlobal {
            name: decl.name.clone(),
            mutable: decl.mutable,
            value,
        }))
    }

    fn check_function_item(&mut self, decl: &FunctionDecl) -> Result<TypedItem, LocalError> {
        if let Some(template) = self.fn_templates.get(&decl.name).cloned() {
            let scope = self.generic_scope(&decl.type_params);
            self.check_function(decl, &scope, template.bounds, &template.ty, decl.name.clone())?;
            return Ok(TypedItem::Template {
                name: decl.name.clone(),
                kind: TemplateKind::Function,
            });
        }
        let ty = self
            .root
            .lookup_type_of(&decl.name)
            .ok_or(LocalError::new(SemanticErrorKind::InvalidNode, decl.span))?;
        let root = self.root.clone();
        let f = self.check_function(decl, &root, Bounds::default(), &ty, decl.name.clone())?;
        Ok(TypedItem::Function(f))
    }

    /// Check one body against its resolved signature `fn_ty`.
    pub(super) fn check_function(
        &mut self,
        decl: &FunctionDecl,
        scope: &Scope,
        bounds: Bounds,
        fn_ty: &Ty,
        name: String,
    ) -> Result<TypedFunction, LocalError> {
        let _span = tracing::debug_span!("check_function", name = %name).entered();
        let Ty::Function { params, ret } = fn_ty else {
            return Err(LocalError::new(SemanticErrorKind::InvalidNode, decl.span));
        };
        let fscope = scope.child();
        for (p, param) in decl.params.iter().zip(params) {
            fscope.define(&p.name, param.ty.clone(), p.mutable);
        }
        let mut cx = FnCx::new(fscope, (**ret).clone(), bounds);
        let mut body = self.infer_expr(&mut cx, &decl.body)?;
        if **ret != Ty::Void {
            body = self.coerce(&mut cx, ret, body, decl.body.span)?;
        }
        let subst = self.finish(cx)?;

        let mut typed_params = Vec::with_capacity(params.len());
        for (p, param) in decl.params.iter().zip(params) {
            typed_params.push(TypedParam {
                name: p.name.clone(),
                mutable: p.mutable,
                ty: self.lower(&subst, &param.ty)?,
            });
        }
        let ret = self.lower(&subst, ret)?;
        let body = self.lower_expr(&subst, body)?;
        Ok(TypedFunction {
            name,
            params: typed_params,
            ret,
            body,
        })
    }

    fn type_item(&self, mi: usize, ii: usize) -> Result<TypedItem, LocalError> {
        let Some(&id) = self.defs.get(&(mi, ii)) else {
            return Err(LocalError::new(SemanticErrorKind::InvalidNode, Span::default()));
        };
        let name = self.ctx.get_name(id).unwrap_or_default().to_string();
        let lower_field = |m: &crate::context::Member| -> Result<TypedField, LocalError> {
            Ok(TypedField {
                name: m.name.clone(),
                ty: ResolvedTy::from_ty(&m.ty, &self.ctx).map_err(cannot_infer)?,
                mutable: m.mutable,
            })
        };
        if let Some(info) = self.ctx.struct_info(id) {
            if !info.type_params.is_empty() {
                return Ok(TypedItem::Template {
                    name,
                    kind: TemplateKind::Struct,
                });
            }
            return Ok(TypedItem::Struct {
                name,
                fields: info.members.iter().map(lower_field).collect::<Result<_, _>>()?,
                is_copy: info.is_copy,
                is_value: info.is_value,
            });
        }
        match self.ctx.union_info(id) {
            Some(info) if !info.type_params.is_empty() => Ok(TypedItem::Template {
                name,
                kind: TemplateKind::Union,
            }),
            Some(info) => {
                let cases = info
                    .cases
                    .iter()
                    .map(|c| -> Result<TypedCase, LocalError> {
                        Ok(TypedCase {
                            name: c.name.clone(),
                            params: c.params.iter().map(lower_field).collect::<Result<_, _>>()?,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TypedItem::Union {
                    name,
                    cases,
                    is_copy: info.is_copy,
                    is_value: info.is_value,
                })
            }
            None => Err(LocalError::new(SemanticErrorKind::InvalidNode, Span::default())),
        }
    }

    fn check_given(&mut self, mi: usize, ii: usize, decl: &GivenDecl) -> Result<TypedItem, LocalError> {
        let Some(plan) = self.plans.get(&(mi, ii)).cloned() else {
            return Err(LocalError::new(SemanticErrorKind::InvalidNode, decl.span));
        };
        let mut methods = Vec::with_capacity(decl.methods.len());
        for m in &decl.methods {
            let entry = match &plan.target {
                GivenTarget::Type(key) => self.methods.get(key).and_then(|t| t.get(&m.name)),
                GivenTarget::Trait(name) => self.trait_extensions.get(name).and_then(|t| t.get(&m.name)),
            };
            let Some(entry) = entry.cloned() else {
                return Err(LocalError::new(SemanticErrorKind::InvalidNode, m.span));
            };
            let scope = plan.scope.child();
            for tp in &m.type_params {
                scope.define_type(&tp.name, Ty::GenericParam(tp.name.clone()));
            }
            let name = format!("{}.{}", entry.owner, m.name);
            methods.push(self.check_function(m, &scope, entry.bounds.clone(), &entry.ty, name)?);
        }

        match &plan.target {
            GivenTarget::Type(ImplKey::Concrete(subject)) => Ok(TypedItem::Given {
                subject: ResolvedTy::from_ty(subject, &self.ctx).map_err(cannot_infer)?,
                trait_name: plan.conformance.map(|(c, _)| c.base_name),
                methods,
            }),
            GivenTarget::Type(ImplKey::Template(template)) => Ok(TypedItem::Template {
                name: self.ctx.get_name(*template).unwrap_or_default().to_string(),
                kind: TemplateKind::Given,
            }),
            GivenTarget::Trait(name) => Ok(TypedItem::Template {
                name: name.clone(),
                kind: TemplateKind::Given,
            }),
        }
    }

    // ── Statements ─────────────────────────────────────────────────────

    /// Check a statement. The flag is set when control never reaches the
    /// next statement.
    pub(super) fn check_stmt(&self, cx: &mut FnCx, stmt: &Stmt) -> Result<(TypedStmt<Ty>, bool), LocalError> {
        match stmt {
            Stmt::Let {
                name,
                ty,
                value,
                mutable,
                span,
            } => {
                let mut typed = self.infer_expr(cx, value)?;
                let declared = match ty {
                    Some(node) => {
                        let declared = self.resolve_type(node, &cx.scope)?;
                        self.note_pending(cx, &declared, node.span());
                        typed = self.coerce(cx, &declared, typed, *span)?;
                        declared
                    }
                    None => typed.ty.clone(),
                };
                self.consume(cx, &typed);
                let diverges = self.diverges(cx, &typed);
                cx.scope.define(name, declared, *mutable);
                Ok((
                    TypedStmt::Let {
                        name: name.clone(),
                        mutable: *mutable,
                        value: typed,
                    },
                    diverges,
                ))
            }
            Stmt::Assign { target, value, span } => self.check_assign(cx, target, value, *span),
            Stmt::CompoundAssign {
                target,
                op,
                value,
                span,
            } => {
                let expanded = Expr {
                    kind: ExprKind::Binary {
                        op: *op,
                        lhs: Box::new(target.clone()),
                        rhs: Box::new(value.clone()),
                    },
                    span: *span,
                };
                self.check_assign(cx, target, &expanded, *span)
            }
            Stmt::Expr(e) => {
                let typed = self.infer_expr(cx, e)?;
                let diverges = self.diverges(cx, &typed);
                Ok((TypedStmt::Expr(typed), diverges))
            }
            Stmt::Return { value, span } => {
                let ret = cx.ret.clone();
                let typed = match value {
                    Some(v) => {
                        let typed = self.infer_expr(cx, v)?;
                        let typed = self.coerce(cx, &ret, typed, v.span)?;
                        self.consume(cx, &typed);
                        Some(typed)
                    }
                    None => {
                        self.unify(cx, ret, Ty::Void, *span)?;
                        None
                    }
                };
                Ok((TypedStmt::Return(typed), true))
            }
            Stmt::Break { span } | Stmt::Continue { span } => {
                let is_break = matches!(stmt, Stmt::Break { .. });
                if cx.loop_depth == 0 {
                    let word = if is_break { "break" } else { "continue" };
                    return Err(LocalError::new(
                        SemanticErrorKind::generic(format!("'{word}' outside of a loop")),
                        *span,
                    ));
                }
                let typed = if is_break {
                    TypedStmt::Break
                } else {
                    TypedStmt::Continue
                };
                Ok((typed, true))
            }
        }
    }

    fn check_assign(
        &self,
        cx: &mut FnCx,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> Result<(TypedStmt<Ty>, bool), LocalError> {
        let typed_target = match &target.kind {
            ExprKind::Ident(name) => {
                let Some(symbol) = cx.scope.lookup(name) else {
                    return Err(LocalError::new(
                        SemanticErrorKind::UndefinedVariable { name: name.clone() },
                        target.span,
                    ));
                };
                if !matches!(symbol.kind, SymbolKind::Variable(_)) || !symbol.is_mutable() {
                    return Err(LocalError::new(
                        SemanticErrorKind::AssignToImmutable { name: name.clone() },
                        target.span,
                    ));
                }
                TypedExpr::new(TypedExprKind::Var(name.clone()), symbol.ty, target.span)
            }
            ExprKind::Member { .. } => {
                let typed = self.infer_expr(cx, target)?;
                self.check_field_assignment(cx, &typed)?;
                typed
            }
            ExprKind::Deref(_) => self.infer_expr(cx, target)?,
            _ => return Err(LocalError::new(SemanticErrorKind::InvalidNode, target.span)),
        };

        let typed_value = self.infer_expr(cx, value)?;
        let typed_value = self.coerce(cx, &typed_target.ty, typed_value, span)?;
        self.consume(cx, &typed_value);
        if let ExprKind::Ident(name) = &target.kind {
            cx.scope.reinitialize(name);
        }
        let diverges = self.diverges(cx, &typed_value);
        Ok((
            TypedStmt::Assign {
                target: typed_target,
                value: typed_value,
            },
            diverges,
        ))
    }

    /// `base.field = ..` needs a mutable field and a writable base.
    fn check_field_assignment(&self, cx: &mut FnCx, target: &TypedExpr<Ty>) -> Result<(), LocalError> {
        let TypedExprKind::Member { base, name, index } = &target.kind else {
            return Ok(());
        };
        let base_ty = cx.solver.resolve(&base.ty);
        let owner = match base_ty.strip_ref() {
            Ty::Struct(id) => Some(*id),
            Ty::GenericStruct { template, .. } => Some(*template),
            _ => None,
        };
        let mutable = owner
            .and_then(|id| self.ctx.get_struct_members(id))
            .and_then(|members| members.get(*index))
            .is_some_and(|m| m.mutable);
        if !mutable {
            return Err(LocalError::new(
                SemanticErrorKind::ImmutableFieldAssignment {
                    ty: base_ty.strip_ref().display(&self.ctx).to_string(),
                    field: name.clone(),
                },
                target.span,
            ));
        }
        self.check_writable(cx, base)
    }

    fn check_writable(&self, cx: &mut FnCx, place: &TypedExpr<Ty>) -> Result<(), LocalError> {
        let ty = cx.solver.resolve(&place.ty);
        if matches!(ty, Ty::Ref(_) | Ty::Ptr(_)) {
            return Ok(());
        }
        match &place.kind {
            TypedExprKind::Var(name) => {
                if cx.scope.is_mutable(name) == Some(true) {
                    Ok(())
                } else {
                    Err(LocalError::new(
                        SemanticErrorKind::AssignToImmutable { name: name.clone() },
                        place.span,
                    ))
                }
            }
            TypedExprKind::Member { base, .. } => self.check_writable(cx, base),
            TypedExprKind::Deref(_) => Ok(()),
            _ => Err(LocalError::new(SemanticErrorKind::InvalidNode, place.span)),
        }
    }

    fn diverges(&self, cx: &mut FnCx, e: &TypedExpr<Ty>) -> bool {
        cx.solver.resolve(&e.ty) == Ty::Never
    }

    /// A by-value use of a non-copy variable moves it. Globals and values
    /// whose type is still open are not tracked.
    pub(super) fn consume(&self, cx: &mut FnCx, e: &TypedExpr<Ty>) {
        let TypedExprKind::Var(name) = &e.kind else {
            return;
        };
        if cx.scope.is_global(name) {
            return;
        }
        let ty = cx.solver.resolve(&e.ty);
        if ty.structural_vars().is_empty() && !ty.is_copy(&self.ctx, self.config.generic_copy_policy) {
            tracing::trace!(name = %name, "moved");
            cx.scope.mark_moved(name);
        }
    }

    /// Run `f` in a fresh child scope of the current one.
    pub(super) fn in_child_scope<R>(
        &self,
        cx: &mut FnCx,
        f: impl FnOnce(&Self, &mut FnCx) -> Result<R, LocalError>,
    ) -> Result<R, LocalError> {
        let child = cx.scope.child();
        let outer = mem::replace(&mut cx.scope, child);
        let result = f(self, cx);
        cx.scope = outer;
        result
    }
}
