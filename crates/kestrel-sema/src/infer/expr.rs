//! Expression inference.
//!
//! Every expression gets a [`Ty`], possibly an open variable. Equalities
//! are settled as they are emitted, so later expressions see what earlier
//! ones decided; trait bounds and literal defaults wait for
//! [`Checker::finish`].

use kestrel_ast::{BinaryOp, Expr, ExprKind, NumSuffix, TypeNode, UnaryOp};
use kestrel_common::Span;
use rustc_hash::FxHashMap;

use super::{generic_instances, Checker, FnCx, FnTemplate, ImplKey, MethodEntry, PendingRequest};
use crate::constraint::Constraint;
use crate::context::{DefId, DefKind};
use crate::error::{LocalError, SemanticErrorKind};
use crate::instantiation::InstantiationKind;
use crate::resolve::TypeResolver;
use crate::scope::SymbolKind;
use crate::traits::TraitConstraint;
use crate::ty::{Param, PassKind, Ty};
use crate::typed::{TypedExpr, TypedExprKind};

type Typed = TypedExpr<Ty>;

fn err(message: impl Into<String>, span: Span) -> LocalError {
    LocalError::new(SemanticErrorKind::generic(message), span)
}

fn suffix_ty(suffix: NumSuffix) -> Ty {
    match suffix {
        NumSuffix::I => Ty::Int,
        NumSuffix::I8 => Ty::Int8,
        NumSuffix::I16 => Ty::Int16,
        NumSuffix::I32 => Ty::Int32,
        NumSuffix::I64 => Ty::Int64,
        NumSuffix::U => Ty::UInt,
        NumSuffix::U8 => Ty::UInt8,
        NumSuffix::U16 => Ty::UInt16,
        NumSuffix::U32 => Ty::UInt32,
        NumSuffix::U64 => Ty::UInt64,
        NumSuffix::F32 => Ty::Float32,
        NumSuffix::F64 => Ty::Float64,
    }
}

fn boxed(e: Typed) -> Box<Typed> {
    Box::new(e)
}

/// A method signature ready to be applied to a receiver and arguments.
struct MethodSig {
    ty: Ty,
    has_self: bool,
    owner: String,
}

impl Checker<'_> {
    pub(super) fn infer_expr(&self, cx: &mut FnCx, e: &Expr) -> Result<Typed, LocalError> {
        let span = e.span;
        match &e.kind {
            ExprKind::Int { digits, suffix } => Ok(self.int_literal(cx, digits, *suffix, span)),
            ExprKind::Float { digits, suffix } => self.float_literal(cx, digits, *suffix, span),
            ExprKind::Str(s) => Ok(TypedExpr::new(
                TypedExprKind::Str(s.clone()),
                Ty::Struct(self.string_def),
                span,
            )),
            ExprKind::Bool(b) => Ok(TypedExpr::new(TypedExprKind::Bool(*b), Ty::Bool, span)),
            ExprKind::Ident(name) => self.infer_ident(cx, name, span),
            ExprKind::Binary { op, lhs, rhs } => self.infer_binary(cx, *op, lhs, rhs, span),
            ExprKind::Unary { op, operand } => self.infer_unary(cx, *op, operand, span),
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.infer_call(cx, callee, type_args, args, span),
            ExprKind::UnionCase { ty, case, args } => self.infer_union_case(cx, ty, case, args, span),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.infer_method_call(cx, receiver, method, args, span),
            ExprKind::Member { base, name } => self.infer_member(cx, base, name, span),
            ExprKind::Ref(inner) => {
                let inner = self.infer_expr(cx, inner)?;
                let ty = Ty::reference(inner.ty.clone());
                Ok(TypedExpr::new(TypedExprKind::Ref(boxed(inner)), ty, span))
            }
            ExprKind::Deref(inner) => {
                let inner = self.infer_expr(cx, inner)?;
                let ty = self.pointee(cx, &inner.ty, span)?;
                Ok(TypedExpr::new(TypedExprKind::Deref(boxed(inner)), ty, span))
            }
            ExprKind::Block { stmts, tail } => self.in_child_scope(cx, |this, cx| {
                let mut typed = Vec::with_capacity(stmts.len());
                let mut diverged = false;
                for stmt in stmts {
                    let (s, d) = this.check_stmt(cx, stmt)?;
                    diverged |= d;
                    typed.push(s);
                }
                let tail = tail.as_deref().map(|t| this.infer_expr(cx, t)).transpose()?;
                let ty = match &tail {
                    Some(t) => t.ty.clone(),
                    None if diverged => Ty::Never,
                    None => Ty::Void,
                };
                Ok(TypedExpr::new(
                    TypedExprKind::Block {
                        stmts: typed,
                        tail: tail.map(boxed),
                    },
                    ty,
                    span,
                ))
            }),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.infer_expr(cx, cond)?;
                let c = self.coerce(cx, &Ty::Bool, c, cond.span)?;
                // Each branch starts from the moves made before the `if`.
                // Afterwards a variable counts as moved if any branch that
                // falls through moved it.
                let before = cx.scope.moved_state();
                let then = self.infer_expr(cx, then_branch)?;
                let then_ty = cx.solver.resolve(&then.ty);
                let after_then = cx.scope.moved_state();
                cx.scope.restore_moved(&before);
                let (else_typed, ty) = match else_branch {
                    Some(other) => {
                        let other = self.infer_expr(cx, other)?;
                        let else_ty = cx.solver.resolve(&other.ty);
                        if else_ty == Ty::Never {
                            cx.scope.restore_moved(&before);
                        }
                        let ty = if then_ty == Ty::Never {
                            else_ty
                        } else if else_ty == Ty::Never {
                            then_ty.clone()
                        } else {
                            self.unify(cx, then_ty.clone(), else_ty, other.span)?;
                            then_ty.clone()
                        };
                        (Some(other), ty)
                    }
                    None => (None, Ty::Void),
                };
                if then_ty != Ty::Never {
                    cx.scope.merge_moved(&after_then);
                }
                Ok(TypedExpr::new(
                    TypedExprKind::If {
                        cond: boxed(c),
                        then_branch: boxed(then),
                        else_branch: else_typed.map(boxed),
                    },
                    ty,
                    span,
                ))
            }
            ExprKind::While { cond, body } => {
                let c = self.infer_expr(cx, cond)?;
                let c = self.coerce(cx, &Ty::Bool, c, cond.span)?;
                cx.loop_depth += 1;
                let body = self.infer_expr(cx, body);
                cx.loop_depth -= 1;
                Ok(TypedExpr::new(
                    TypedExprKind::While {
                        cond: boxed(c),
                        body: boxed(body?),
                    },
                    Ty::Void,
                    span,
                ))
            }
            ExprKind::Match { subject, arms } => self.infer_match(cx, subject, arms, span),
        }
    }

    /// Queue requests for generic instances named by an annotation.
    pub(super) fn note_pending(&self, cx: &mut FnCx, ty: &Ty, span: Span) {
        let mut found = Vec::new();
        generic_instances(ty, &mut found);
        for (kind, template, args) in found {
            cx.pending.push(PendingRequest {
                kind,
                template_name: self.template_name(template),
                template,
                args,
                span,
            });
        }
    }

    fn template_name(&self, template: DefId) -> String {
        self.ctx.get_name(template).unwrap_or("<unknown>").to_string()
    }

    fn fresh(&self, name: &str, span: Span) -> Ty {
        self.gen.fresh_ty(Some(name), span)
    }

    fn display(&self, cx: &mut FnCx, ty: &Ty) -> String {
        cx.solver.resolve(ty).display(&self.ctx).to_string()
    }

    // ── Literals & Names ───────────────────────────────────────────────

    pub(super) fn int_literal(&self, cx: &mut FnCx, digits: &str, suffix: Option<NumSuffix>, span: Span) -> Typed {
        match suffix {
            Some(s @ (NumSuffix::F32 | NumSuffix::F64)) => {
                TypedExpr::new(TypedExprKind::Float(digits.to_string()), suffix_ty(s), span)
            }
            Some(s) => TypedExpr::new(TypedExprKind::Int(digits.to_string()), suffix_ty(s), span),
            None => {
                let var = self.gen.fresh(Some("int"), span);
                cx.solver.add(Constraint::DefaultInt {
                    var: var.clone(),
                    span,
                });
                TypedExpr::new(TypedExprKind::Int(digits.to_string()), Ty::Var(var), span)
            }
        }
    }

    fn float_literal(
        &self,
        cx: &mut FnCx,
        digits: &str,
        suffix: Option<NumSuffix>,
        span: Span,
    ) -> Result<Typed, LocalError> {
        let ty = match suffix {
            Some(s @ (NumSuffix::F32 | NumSuffix::F64)) => suffix_ty(s),
            Some(_) => {
                return Err(err(
                    format!("Float literal '{digits}' cannot take an integer suffix"),
                    span,
                ))
            }
            None => {
                let var = self.gen.fresh(Some("float"), span);
                cx.solver.add(Constraint::DefaultFloat {
                    var: var.clone(),
                    span,
                });
                Ty::Var(var)
            }
        };
        Ok(TypedExpr::new(TypedExprKind::Float(digits.to_string()), ty, span))
    }

    fn infer_ident(&self, cx: &mut FnCx, name: &str, span: Span) -> Result<Typed, LocalError> {
        if let Some(symbol) = cx.scope.lookup(name) {
            return match symbol.kind {
                SymbolKind::Function => Ok(TypedExpr::new(
                    TypedExprKind::Function(name.to_string()),
                    symbol.ty,
                    span,
                )),
                SymbolKind::Variable(_) => {
                    if cx.scope.is_moved(name) {
                        return Err(LocalError::new(
                            SemanticErrorKind::VariableMoved {
                                name: name.to_string(),
                            },
                            span,
                        ));
                    }
                    Ok(TypedExpr::new(TypedExprKind::Var(name.to_string()), symbol.ty, span))
                }
                SymbolKind::Type => Err(LocalError::new(SemanticErrorKind::InvalidNode, span)),
            };
        }
        if self.fn_templates.contains_key(name) {
            return Err(err(format!("Generic function '{name}' must be called"), span));
        }
        Err(LocalError::new(
            SemanticErrorKind::UndefinedVariable {
                name: name.to_string(),
            },
            span,
        ))
    }

    // ── Operators ──────────────────────────────────────────────────────

    fn infer_binary(
        &self,
        cx: &mut FnCx,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<Typed, LocalError> {
        let l = self.infer_expr(cx, lhs)?;
        let r = self.infer_expr(cx, rhs)?;
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let l = self.coerce(cx, &Ty::Bool, l, lhs.span)?;
            let r = self.coerce(cx, &Ty::Bool, r, rhs.span)?;
            return Ok(binary(op, l, r, Ty::Bool, span));
        }

        let lt = cx.solver.resolve(&l.ty).strip_ref().clone();
        let rt = cx.solver.resolve(&r.ty).strip_ref().clone();
        let invalid = || {
            LocalError::new(
                SemanticErrorKind::InvalidOperation {
                    op: op.symbol().to_string(),
                    lhs: lt.display(&self.ctx).to_string(),
                    rhs: rt.display(&self.ctx).to_string(),
                },
                span,
            )
        };
        self.unify(cx, lt.clone(), rt.clone(), span).map_err(|_| invalid())?;
        let operand = cx.solver.resolve(&lt);
        let supported = match &operand {
            Ty::Var(_) | Ty::Never => true,
            t if op.is_arithmetic() => t.is_numeric(),
            t if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => t.is_numeric() || *t == Ty::Bool,
            t => t.is_numeric(),
        };
        if !supported {
            return Err(invalid());
        }
        let ty = if op.is_comparison() { Ty::Bool } else { operand };
        Ok(binary(op, l, r, ty, span))
    }

    fn infer_unary(&self, cx: &mut FnCx, op: UnaryOp, operand: &Expr, span: Span) -> Result<Typed, LocalError> {
        let typed = self.infer_expr(cx, operand)?;
        let (typed, ty) = match op {
            UnaryOp::Not => {
                let typed = self.coerce(cx, &Ty::Bool, typed, operand.span)?;
                (typed, Ty::Bool)
            }
            UnaryOp::Neg => {
                let ty = cx.solver.resolve(&typed.ty).strip_ref().clone();
                if !(ty.is_numeric() || ty.is_var()) {
                    return Err(LocalError::new(
                        SemanticErrorKind::InvalidOperation {
                            op: "-".to_string(),
                            lhs: ty.display(&self.ctx).to_string(),
                            rhs: ty.display(&self.ctx).to_string(),
                        },
                        span,
                    ));
                }
                (typed, ty)
            }
        };
        Ok(TypedExpr::new(
            TypedExprKind::Unary {
                op,
                operand: boxed(typed),
            },
            ty,
            span,
        ))
    }

    fn pointee(&self, cx: &mut FnCx, ty: &Ty, span: Span) -> Result<Ty, LocalError> {
        match cx.solver.resolve(ty) {
            Ty::Ref(inner) | Ty::Ptr(inner) => Ok(*inner),
            Ty::Var(v) => {
                let inner = self.fresh("deref", span);
                self.unify(cx, Ty::reference(inner.clone()), Ty::Var(v), span)?;
                Ok(inner)
            }
            other => Err(err(
                format!("Cannot dereference a value of type '{}'", other.display(&self.ctx)),
                span,
            )),
        }
    }

    // ── Coercion & Arguments ───────────────────────────────────────────

    /// Check `actual` where `expected` is wanted. A reference to a copy
    /// value is read through when a plain value is expected.
    pub(super) fn coerce(&self, cx: &mut FnCx, expected: &Ty, actual: Typed, span: Span) -> Result<Typed, LocalError> {
        let want = cx.solver.resolve(expected);
        let have = cx.solver.resolve(&actual.ty);
        if let Ty::Ref(inner) = &have {
            let inner = (**inner).clone();
            if !matches!(want, Ty::Ref(_) | Ty::Var(_))
                && inner.is_copy(&self.ctx, self.config.generic_copy_policy)
            {
                self.unify(cx, want, inner.clone(), span)?;
                return Ok(TypedExpr::new(TypedExprKind::Deref(boxed(actual)), inner, span));
            }
        }
        self.unify(cx, expected.clone(), actual.ty.clone(), span)?;
        Ok(actual)
    }

    fn check_args(&self, cx: &mut FnCx, params: &[Param], args: &[Expr]) -> Result<Vec<Typed>, LocalError> {
        let mut typed = Vec::with_capacity(args.len());
        for (param, arg) in params.iter().zip(args) {
            let e = self.infer_expr(cx, arg)?;
            let e = self.coerce(cx, &param.ty, e, arg.span)?;
            if param.kind == PassKind::ByVal {
                self.consume(cx, &e);
            }
            typed.push(e);
        }
        Ok(typed)
    }

    pub(super) fn arity(function: &str, expected: usize, got: usize, span: Span) -> Result<(), LocalError> {
        if expected == got {
            return Ok(());
        }
        Err(LocalError::new(
            SemanticErrorKind::InvalidArgumentCount {
                function: function.to_string(),
                expected,
                got,
            },
            span,
        ))
    }

    /// Explicit type arguments, or one fresh variable per parameter.
    fn type_arguments(
        &self,
        cx: &mut FnCx,
        what: &str,
        params: &[String],
        explicit: &[TypeNode],
        span: Span,
    ) -> Result<Vec<Ty>, LocalError> {
        if explicit.is_empty() {
            return Ok(params.iter().map(|p| self.fresh(p, span)).collect());
        }
        if explicit.len() != params.len() {
            return Err(err(
                format!(
                    "'{what}' expects {} type argument(s), got {}",
                    params.len(),
                    explicit.len()
                ),
                span,
            ));
        }
        let mut args = Vec::with_capacity(explicit.len());
        for node in explicit {
            let ty = self.resolve_type(node, &cx.scope)?;
            self.note_pending(cx, &ty, node.span());
            args.push(ty);
        }
        Ok(args)
    }

    // ── Calls ──────────────────────────────────────────────────────────

    fn infer_call(
        &self,
        cx: &mut FnCx,
        callee: &Expr,
        type_args: &[TypeNode],
        args: &[Expr],
        span: Span,
    ) -> Result<Typed, LocalError> {
        if let ExprKind::Ident(name) = &callee.kind {
            if cx.scope.lookup(name).is_none() {
                if let Some(template) = self.fn_templates.get(name) {
                    return self.call_generic_function(cx, name, template, type_args, args, callee.span, span);
                }
                if let Some(ty) = cx.scope.lookup_type(name) {
                    return self.construct(cx, name, ty, args, span);
                }
                if let Some(template) = cx.scope.lookup_template(name) {
                    return self.construct_generic(cx, name, template, type_args, args, span);
                }
            }
        }
        if !type_args.is_empty() {
            return Err(err("Only generic functions and types take type arguments", span));
        }

        let callee = self.infer_expr(cx, callee)?;
        let (params, ret) = match cx.solver.resolve(&callee.ty) {
            Ty::Function { params, ret } => (params, *ret),
            Ty::Var(v) => {
                let params: Vec<Param> = args
                    .iter()
                    .map(|a| Param::by_val(self.fresh("arg", a.span)))
                    .collect();
                let ret = self.fresh("ret", span);
                self.unify(cx, Ty::func(params.clone(), ret.clone()), Ty::Var(v), span)?;
                (params, ret)
            }
            other => {
                return Err(err(
                    format!("Value of type '{}' is not callable", other.display(&self.ctx)),
                    callee.span,
                ))
            }
        };
        let function = match &callee.kind {
            TypedExprKind::Function(n) | TypedExprKind::Var(n) => n.clone(),
            _ => "<expression>".to_string(),
        };
        Self::arity(&function, params.len(), args.len(), span)?;
        let args = self.check_args(cx, &params, args)?;
        Ok(TypedExpr::new(
            TypedExprKind::Call {
                callee: boxed(callee),
                args,
            },
            ret,
            span,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn call_generic_function(
        &self,
        cx: &mut FnCx,
        name: &str,
        template: &FnTemplate,
        type_args: &[TypeNode],
        args: &[Expr],
        callee_span: Span,
        span: Span,
    ) -> Result<Typed, LocalError> {
        let targs = self.type_arguments(cx, name, &template.type_params, type_args, span)?;
        let map: FxHashMap<String, Ty> = template
            .type_params
            .iter()
            .cloned()
            .zip(targs.iter().cloned())
            .collect();
        let sig = template.ty.substitute_params(&map);
        let var = self.gen.fresh(Some(name), span);
        self.instantiate(cx, &var, template.def, &targs, span)?;
        self.unify(cx, Ty::Var(var), sig.clone(), span)?;

        let Ty::Function { params, ret } = &sig else {
            return Err(LocalError::new(SemanticErrorKind::InvalidNode, span));
        };
        Self::arity(name, params.len(), args.len(), span)?;
        let typed_args = self.check_args(cx, params, args)?;
        for (param, bounds) in &template.bounds {
            let Some(ty) = map.get(param) else { continue };
            for bound in bounds {
                cx.solver.add(Constraint::TraitBound {
                    ty: ty.clone(),
                    trait_name: bound.base_name.clone(),
                    span,
                });
            }
        }
        cx.pending.push(PendingRequest {
            kind: InstantiationKind::Function,
            template: template.def,
            template_name: name.to_string(),
            args: targs,
            span,
        });
        let ret = (**ret).clone();
        Ok(TypedExpr::new(
            TypedExprKind::Call {
                callee: boxed(TypedExpr::new(
                    TypedExprKind::Function(name.to_string()),
                    sig.clone(),
                    callee_span,
                )),
                args: typed_args,
            },
            ret,
            span,
        ))
    }

    /// `Point(1, 2)`: arguments in field order.
    fn construct(&self, cx: &mut FnCx, name: &str, ty: Ty, args: &[Expr], span: Span) -> Result<Typed, LocalError> {
        let Ty::Struct(id) = ty else {
            return Err(err(
                format!("Type '{name}' cannot be constructed with call syntax"),
                span,
            ));
        };
        let params: Vec<Param> = self
            .ctx
            .get_struct_members(id)
            .unwrap_or_default()
            .iter()
            .map(|m| Param::by_val(m.ty.clone()))
            .collect();
        Self::arity(name, params.len(), args.len(), span)?;
        let args = self.check_args(cx, &params, args)?;
        Ok(TypedExpr::new(
            TypedExprKind::Construct {
                type_name: name.to_string(),
                args,
            },
            Ty::Struct(id),
            span,
        ))
    }

    fn construct_generic(
        &self,
        cx: &mut FnCx,
        name: &str,
        template: DefId,
        type_args: &[TypeNode],
        args: &[Expr],
        span: Span,
    ) -> Result<Typed, LocalError> {
        if self.ctx.get_kind(template) != Some(DefKind::StructTemplate) {
            return Err(err(
                format!("Type '{name}' cannot be constructed with call syntax"),
                span,
            ));
        }
        let type_params = self.ctx.type_params(template).to_vec();
        let targs = self.type_arguments(cx, name, &type_params, type_args, span)?;
        let map: FxHashMap<String, Ty> = type_params.into_iter().zip(targs.iter().cloned()).collect();
        let params: Vec<Param> = self
            .ctx
            .get_struct_members(template)
            .unwrap_or_default()
            .iter()
            .map(|m| Param::by_val(m.ty.substitute_params(&map)))
            .collect();
        Self::arity(name, params.len(), args.len(), span)?;
        let var = self.gen.fresh(Some(name), span);
        self.instantiate(cx, &var, template, &targs, span)?;
        let args = self.check_args(cx, &params, args)?;
        cx.pending.push(PendingRequest {
            kind: InstantiationKind::Struct,
            template,
            template_name: name.to_string(),
            args: targs,
            span,
        });
        Ok(TypedExpr::new(
            TypedExprKind::Construct {
                type_name: name.to_string(),
                args,
            },
            Ty::Var(var),
            span,
        ))
    }

    fn infer_union_case(
        &self,
        cx: &mut FnCx,
        ty: &TypeNode,
        case: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<Typed, LocalError> {
        let union_ty = match ty {
            TypeNode::Named { name, .. } if cx.scope.lookup_type(name).is_none() => {
                match cx.scope.lookup_template(name) {
                    Some(template) => {
                        let params = self.ctx.type_params(template).to_vec();
                        let targs = self.type_arguments(cx, name, &params, &[], span)?;
                        match self.ctx.get_kind(template) {
                            Some(DefKind::UnionTemplate) => Ty::GenericUnion {
                                template,
                                args: targs,
                            },
                            _ => Ty::GenericStruct {
                                template,
                                args: targs,
                            },
                        }
                    }
                    None => self.resolve_type(ty, &cx.scope)?,
                }
            }
            _ => self.resolve_type(ty, &cx.scope)?,
        };

        let (id, targs) = match &union_ty {
            Ty::Union(id) => (*id, Vec::new()),
            Ty::GenericUnion { template, args } => (*template, args.clone()),
            other => {
                return Err(err(
                    format!("'{}' is not a union type", other.display(&self.ctx)),
                    ty.span(),
                ))
            }
        };
        let map: FxHashMap<String, Ty> = self
            .ctx
            .type_params(id)
            .iter()
            .cloned()
            .zip(targs.iter().cloned())
            .collect();
        let cases = self.ctx.get_union_cases(id).unwrap_or_default();
        let Some(tag) = cases.iter().position(|c| c.name == case) else {
            return Err(LocalError::new(
                SemanticErrorKind::UndefinedMember {
                    member: case.to_string(),
                    ty: union_ty.display(&self.ctx).to_string(),
                },
                span,
            ));
        };
        let params: Vec<Param> = cases[tag]
            .params
            .iter()
            .map(|m| Param::by_val(m.ty.substitute_params(&map)))
            .collect();
        let union_name = self.template_name(id);
        Self::arity(&format!("{union_name}.{case}"), params.len(), args.len(), span)?;
        let args = self.check_args(cx, &params, args)?;

        let result_ty = if targs.is_empty() {
            union_ty
        } else {
            let var = self.gen.fresh(Some(union_name.as_str()), span);
            self.instantiate(cx, &var, id, &targs, span)?;
            cx.pending.push(PendingRequest {
                kind: InstantiationKind::Union,
                template: id,
                template_name: union_name,
                args: targs,
                span,
            });
            Ty::Var(var)
        };
        Ok(TypedExpr::new(
            TypedExprKind::UnionCase {
                case: case.to_string(),
                tag,
                args,
            },
            result_ty,
            span,
        ))
    }

    // ── Methods ────────────────────────────────────────────────────────

    /// The signature of `entry` for `subject`: `Self` and the given's
    /// parameters replaced, method parameters fresh, bounds queued.
    fn instantiate_method(&self, cx: &mut FnCx, entry: &MethodEntry, subject: &Ty, span: Span) -> Ty {
        let mut map: FxHashMap<String, Ty> = FxHashMap::default();
        map.insert("Self".to_string(), subject.clone());
        let subject_args = match subject {
            Ty::GenericStruct { args, .. } | Ty::GenericUnion { args, .. } => args.clone(),
            _ => Vec::new(),
        };
        for (param, arg) in entry.subject_params.iter().zip(&subject_args) {
            map.insert(param.clone(), arg.clone());
        }
        let mut method_args = Vec::with_capacity(entry.type_params.len());
        for param in &entry.type_params {
            let fresh = self.fresh(param, span);
            method_args.push(fresh.clone());
            map.insert(param.clone(), fresh);
        }
        for (param, bounds) in &entry.bounds {
            if param == "Self" {
                continue;
            }
            let Some(ty) = map.get(param) else { continue };
            for bound in bounds {
                cx.solver.add(Constraint::TraitBound {
                    ty: ty.clone(),
                    trait_name: bound.base_name.clone(),
                    span,
                });
            }
        }
        if let (false, Some(ImplKey::Template(template))) =
            (entry.subject_params.is_empty(), ImplKey::of(subject))
        {
            let mut args = subject_args;
            args.extend(method_args);
            cx.pending.push(PendingRequest {
                kind: InstantiationKind::Method {
                    name: entry.decl.name.clone(),
                },
                template,
                template_name: entry.owner.clone(),
                args,
                span,
            });
        }
        entry.ty.substitute_params(&map)
    }

    fn find_method(&self, cx: &mut FnCx, base: &Ty, method: &str, span: Span) -> Result<MethodSig, LocalError> {
        if let Some(entry) = ImplKey::of(base)
            .and_then(|key| self.methods.get(&key))
            .and_then(|table| table.get(method))
        {
            return Ok(MethodSig {
                ty: self.instantiate_method(cx, entry, base, span),
                has_self: entry.has_self,
                owner: entry.owner.clone(),
            });
        }

        let mut extensions: Vec<&String> = self
            .trait_extensions
            .iter()
            .filter(|(_, table)| table.contains_key(method))
            .map(|(name, _)| name)
            .collect();
        extensions.sort();
        for trait_name in extensions {
            if !self.conforms(base, trait_name, &cx.bounds) {
                continue;
            }
            if let Some(entry) = self.trait_extensions.get(trait_name).and_then(|t| t.get(method)) {
                return Ok(MethodSig {
                    ty: self.instantiate_method(cx, entry, base, span),
                    has_self: entry.has_self,
                    owner: entry.owner.clone(),
                });
            }
        }

        let candidates: Vec<TraitConstraint> = match base {
            Ty::GenericParam(name) => cx.bounds.get(name).cloned().unwrap_or_default(),
            Ty::TraitObject { name, args } => vec![TraitConstraint {
                base_name: name.clone(),
                type_args: args.clone(),
            }],
            _ => Vec::new(),
        };
        let resolver = TypeResolver::new(&self.ctx, &self.traits);
        for c in &candidates {
            let Some((owner, sig)) = self.traits.find_method(&c.base_name, method) else {
                continue;
            };
            let args = self
                .inherited_args(c, &owner, base)
                .unwrap_or_default();
            let ty = self
                .traits
                .expected_method_type(&resolver, &cx.scope, base, &owner, &args, &sig)
                .map_err(|e| LocalError::new(e.kind, span))?;
            let map: FxHashMap<String, Ty> = sig
                .type_params
                .iter()
                .map(|p| (p.name.clone(), self.fresh(&p.name, span)))
                .collect();
            return Ok(MethodSig {
                ty: ty.substitute_params(&map),
                has_self: sig.params.first().is_some_and(|p| p.name == "self"),
                owner,
            });
        }

        Err(LocalError::new(
            SemanticErrorKind::UndefinedMember {
                member: method.to_string(),
                ty: base.display(&self.ctx).to_string(),
            },
            span,
        ))
    }

    /// A type name used as a method receiver, as in `Point.origin()`.
    fn static_subject(&self, cx: &mut FnCx, receiver: &Expr, span: Span) -> Option<Ty> {
        let ExprKind::Ident(name) = &receiver.kind else {
            return None;
        };
        if cx.scope.lookup(name).is_some() {
            return None;
        }
        if let Some(ty) = cx.scope.lookup_type(name) {
            return Some(ty);
        }
        let template = cx.scope.lookup_template(name)?;
        let args = self
            .ctx
            .type_params(template)
            .iter()
            .map(|p| self.fresh(p, span))
            .collect();
        Some(match self.ctx.get_kind(template) {
            Some(DefKind::UnionTemplate) => Ty::GenericUnion { template, args },
            _ => Ty::GenericStruct { template, args },
        })
    }

    fn infer_method_call(
        &self,
        cx: &mut FnCx,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<Typed, LocalError> {
        if let Some(subject) = self.static_subject(cx, receiver, receiver.span) {
            return self.call_static(cx, &subject, method, args, span);
        }

        let recv = self.infer_expr(cx, receiver)?;
        let base = cx.solver.resolve(&recv.ty).strip_ref().clone();
        if base.is_var() {
            return Err(err(
                format!("Cannot call method '{method}' on a value of unknown type; add a type annotation"),
                receiver.span,
            ));
        }
        let sig = self.find_method(cx, &base, method, span)?;
        let qualified = format!("{}.{method}", sig.owner);
        let Ty::Function { params, ret } = sig.ty else {
            return Err(LocalError::new(SemanticErrorKind::InvalidNode, span));
        };
        let Some((self_param, rest)) = params.split_first().filter(|_| sig.has_self) else {
            return Err(err(
                format!("Method '{method}' of '{}' takes no 'self'; call it as '{qualified}(..)'", sig.owner),
                span,
            ));
        };
        Self::arity(&qualified, rest.len(), args.len(), span)?;
        let recv = self.adapt_receiver(cx, recv, self_param, receiver.span)?;
        let args = self.check_args(cx, rest, args)?;
        Ok(TypedExpr::new(
            TypedExprKind::MethodCall {
                receiver: boxed(recv),
                method: method.to_string(),
                args,
            },
            *ret,
            span,
        ))
    }

    /// `Type.method(args)`: every parameter, `self` included, is explicit.
    fn call_static(&self, cx: &mut FnCx, subject: &Ty, method: &str, args: &[Expr], span: Span) -> Result<Typed, LocalError> {
        let sig = self.find_method(cx, subject, method, span)?;
        let qualified = format!("{}.{method}", sig.owner);
        let Ty::Function { params, ret } = &sig.ty else {
            return Err(LocalError::new(SemanticErrorKind::InvalidNode, span));
        };
        Self::arity(&qualified, params.len(), args.len(), span)?;
        let typed_args = self.check_args(cx, params, args)?;
        let ret = (**ret).clone();
        Ok(TypedExpr::new(
            TypedExprKind::Call {
                callee: boxed(TypedExpr::new(TypedExprKind::Function(qualified), sig.ty, span)),
                args: typed_args,
            },
            ret,
            span,
        ))
    }

    /// Take a reference to, or read through, the receiver so it matches
    /// how the method declares `self`.
    fn adapt_receiver(&self, cx: &mut FnCx, recv: Typed, param: &Param, span: Span) -> Result<Typed, LocalError> {
        let want = cx.solver.resolve(&param.ty);
        let have = cx.solver.resolve(&recv.ty);
        let recv = match (&want, &have) {
            (Ty::Ref(_), Ty::Ref(_)) => recv,
            (Ty::Ref(_), _) => {
                let ty = Ty::reference(recv.ty.clone());
                TypedExpr::new(TypedExprKind::Ref(boxed(recv)), ty, span)
            }
            (_, Ty::Ref(inner)) => {
                let inner = (**inner).clone();
                TypedExpr::new(TypedExprKind::Deref(boxed(recv)), inner, span)
            }
            _ => recv,
        };
        self.unify(cx, param.ty.clone(), recv.ty.clone(), span)?;
        if param.kind == PassKind::ByVal {
            self.consume(cx, &recv);
        }
        Ok(recv)
    }

    // ── Members ────────────────────────────────────────────────────────

    fn infer_member(&self, cx: &mut FnCx, base: &Expr, name: &str, span: Span) -> Result<Typed, LocalError> {
        let typed = self.infer_expr(cx, base)?;
        let base_ty = cx.solver.resolve(&typed.ty).strip_ref().clone();
        let (id, map): (DefId, FxHashMap<String, Ty>) = match &base_ty {
            Ty::Struct(id) => (*id, FxHashMap::default()),
            Ty::GenericStruct { template, args } => (
                *template,
                self.ctx
                    .type_params(*template)
                    .iter()
                    .cloned()
                    .zip(args.iter().cloned())
                    .collect(),
            ),
            Ty::Var(_) => {
                return Err(err(
                    format!("Cannot access member '{name}' of a value of unknown type; add a type annotation"),
                    span,
                ))
            }
            other => {
                return Err(LocalError::new(
                    SemanticErrorKind::UndefinedMember {
                        member: name.to_string(),
                        ty: self.display(cx, other),
                    },
                    span,
                ))
            }
        };
        let members = self.ctx.get_struct_members(id).unwrap_or_default();
        let Some(index) = members.iter().position(|m| m.name == name) else {
            return Err(LocalError::new(
                SemanticErrorKind::UndefinedMember {
                    member: name.to_string(),
                    ty: base_ty.display(&self.ctx).to_string(),
                },
                span,
            ));
        };
        let ty = members[index].ty.substitute_params(&map);
        Ok(TypedExpr::new(
            TypedExprKind::Member {
                base: boxed(typed),
                name: name.to_string(),
                index,
            },
            ty,
            span,
        ))
    }
}

fn binary(op: BinaryOp, lhs: Typed, rhs: Typed, ty: Ty, span: Span) -> Typed {
    TypedExpr::new(
        TypedExprKind::Binary {
            op,
            lhs: boxed(lhs),
            rhs: boxed(rhs),
        },
        ty,
        span,
    )
}
