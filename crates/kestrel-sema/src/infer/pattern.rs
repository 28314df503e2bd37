//! `match` expressions.
//!
//! Patterns are typed against the subject first. Arms are then checked for
//! coverage through [`crate::exhaustiveness`], and only after that are the
//! bodies inferred, each in a scope holding the arm's bindings.

use std::collections::BTreeSet;

use kestrel_ast::{Expr, MatchArm, Pattern, PatternKind};
use kestrel_common::Span;
use rustc_hash::FxHashMap;

use super::{Checker, FnCx};
use crate::context::DefId;
use crate::error::{LocalError, SemanticErrorKind};
use crate::exhaustiveness::{check_exhaustiveness, check_redundancy, ConstructorSig, LitKind, Pat, TypeInfo};
use crate::ty::Ty;
use crate::typed::{TypedArm, TypedExpr, TypedExprKind, TypedPattern};

type Typed = TypedExpr<Ty>;

fn err(message: impl Into<String>, span: Span) -> LocalError {
    LocalError::new(SemanticErrorKind::generic(message), span)
}

/// A variable introduced by a pattern.
#[derive(Debug, Clone)]
struct Binding {
    name: String,
    mutable: bool,
    ty: Ty,
    span: Span,
}

fn names(bindings: &[Binding]) -> BTreeSet<&str> {
    bindings.iter().map(|b| b.name.as_str()).collect()
}

/// How many union cases deep `pattern` looks.
fn depth(pattern: &Pattern) -> usize {
    match &pattern.kind {
        PatternKind::Case { args, .. } => 1 + args.iter().map(depth).max().unwrap_or(0),
        PatternKind::Or(alternatives) => alternatives.iter().map(depth).max().unwrap_or(0),
        PatternKind::Wildcard | PatternKind::Binding { .. } | PatternKind::Bool(_) | PatternKind::Int(_) => 0,
    }
}

fn is_catchall(pattern: &TypedPattern<Ty>) -> bool {
    match pattern {
        TypedPattern::Wildcard | TypedPattern::Binding { .. } => true,
        TypedPattern::Or(alternatives) => alternatives.iter().any(is_catchall),
        _ => false,
    }
}

/// Source-like rendering used in diagnostics.
fn describe(pattern: &TypedPattern<Ty>) -> String {
    match pattern {
        TypedPattern::Wildcard => "_".to_string(),
        TypedPattern::Binding { name, .. } => name.clone(),
        TypedPattern::Bool(b) => b.to_string(),
        TypedPattern::Int(digits) => digits.clone(),
        TypedPattern::Case { name, args, .. } if args.is_empty() => format!(".{name}"),
        TypedPattern::Case { name, args, .. } => {
            let args: Vec<String> = args.iter().map(describe).collect();
            format!(".{name}({})", args.join(", "))
        }
        TypedPattern::Or(alternatives) => {
            let alternatives: Vec<String> = alternatives.iter().map(describe).collect();
            alternatives.join(" or ")
        }
    }
}

fn lower(pattern: &TypedPattern<Ty>) -> Pat {
    match pattern {
        TypedPattern::Wildcard | TypedPattern::Binding { .. } => Pat::Wildcard,
        TypedPattern::Bool(b) => Pat::Literal {
            value: b.to_string(),
            ty: LitKind::Bool,
        },
        TypedPattern::Int(digits) => Pat::Literal {
            value: digits
                .parse::<i128>()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| digits.clone()),
            ty: LitKind::Int,
        },
        TypedPattern::Case { name, args, .. } => Pat::Constructor {
            name: name.clone(),
            args: args.iter().map(lower).collect(),
        },
        TypedPattern::Or(alternatives) => Pat::Or {
            alternatives: alternatives.iter().map(lower).collect(),
        },
    }
}

impl Checker<'_> {
    pub(super) fn infer_match(
        &self,
        cx: &mut FnCx,
        subject: &Expr,
        arms: &[MatchArm],
        span: Span,
    ) -> Result<Typed, LocalError> {
        let subject_typed = self.infer_expr(cx, subject)?;
        let subject_ty = cx.solver.resolve(&subject_typed.ty);
        let matched = subject_ty.strip_ref().clone();

        let mut checked = Vec::with_capacity(arms.len());
        for arm in arms {
            let mut bindings = Vec::new();
            let pattern = self.check_pattern(cx, &arm.pattern, &matched, &mut bindings)?;
            let mut seen = BTreeSet::new();
            if let Some(dup) = bindings.iter().find(|b| !seen.insert(b.name.as_str())) {
                return Err(err(
                    format!("Variable '{}' is bound more than once in the same pattern", dup.name),
                    dup.span,
                ));
            }
            checked.push((pattern, bindings));
        }

        let matched = cx.solver.resolve(&matched);
        let reach = arms.iter().map(|a| depth(&a.pattern)).max().unwrap_or(0);
        self.check_coverage(&matched, reach, arms, &checked, span)?;

        // Binding a payload takes the subject by value.
        if checked.iter().any(|(_, b)| !b.is_empty()) && !matches!(subject_ty, Ty::Ref(_)) {
            self.consume(cx, &subject_typed);
        }

        // Each arm starts from the moves made before the `match`; afterwards
        // a variable counts as moved if any arm that falls through moved it.
        let before = cx.scope.moved_state();
        let mut falls_through = Vec::new();
        let mut result: Option<Ty> = None;
        let mut typed_arms = Vec::with_capacity(arms.len());
        for (arm, (pattern, bindings)) in arms.iter().zip(checked) {
            cx.scope.restore_moved(&before);
            let body = self.in_child_scope(cx, |this, cx| {
                for b in &bindings {
                    cx.scope.define(&b.name, b.ty.clone(), b.mutable);
                }
                this.infer_expr(cx, &arm.body)
            })?;
            let body_ty = cx.solver.resolve(&body.ty);
            if body_ty != Ty::Never {
                falls_through.push(cx.scope.moved_state());
                match result.clone() {
                    Some(first) => self.unify(cx, first, body_ty, arm.body.span)?,
                    None => result = Some(body_ty),
                }
            }
            typed_arms.push(TypedArm { pattern, body });
        }
        cx.scope.restore_moved(&before);
        for state in &falls_through {
            cx.scope.merge_moved(state);
        }

        Ok(TypedExpr::new(
            TypedExprKind::Match {
                subject: Box::new(subject_typed),
                arms: typed_arms,
            },
            result.unwrap_or(Ty::Never),
            span,
        ))
    }

    fn check_pattern(
        &self,
        cx: &mut FnCx,
        pattern: &Pattern,
        ty: &Ty,
        bindings: &mut Vec<Binding>,
    ) -> Result<TypedPattern<Ty>, LocalError> {
        let span = pattern.span;
        match &pattern.kind {
            PatternKind::Wildcard => Ok(TypedPattern::Wildcard),
            PatternKind::Binding { name, mutable } => {
                bindings.push(Binding {
                    name: name.clone(),
                    mutable: *mutable,
                    ty: ty.clone(),
                    span,
                });
                Ok(TypedPattern::Binding {
                    name: name.clone(),
                    mutable: *mutable,
                    ty: ty.clone(),
                })
            }
            PatternKind::Bool(b) => {
                self.unify(cx, Ty::Bool, ty.clone(), span)?;
                Ok(TypedPattern::Bool(*b))
            }
            PatternKind::Int(digits) => {
                let resolved = cx.solver.resolve(ty);
                if resolved.is_var() {
                    let literal = self.int_literal(cx, digits, None, span);
                    self.unify(cx, resolved.clone(), literal.ty, span)?;
                } else if !resolved.is_integer() {
                    return Err(LocalError::new(
                        SemanticErrorKind::mismatch("integer type", resolved.display(&self.ctx)),
                        span,
                    ));
                }
                let unsigned = matches!(
                    cx.solver.resolve(ty),
                    Ty::UInt | Ty::UInt8 | Ty::UInt16 | Ty::UInt32 | Ty::UInt64
                );
                if unsigned && digits.starts_with('-') {
                    return Err(err("Negative integer literal cannot match unsigned type", span));
                }
                Ok(TypedPattern::Int(digits.clone()))
            }
            PatternKind::Case { name, args } => self.check_case_pattern(cx, name, args, ty, span, bindings),
            PatternKind::Or(alternatives) => {
                let mut typed = Vec::with_capacity(alternatives.len());
                let mut first: Option<Vec<Binding>> = None;
                for alt in alternatives {
                    let mut own = Vec::new();
                    typed.push(self.check_pattern(cx, alt, ty, &mut own)?);
                    let Some(expected) = first.as_deref() else {
                        first = Some(own);
                        continue;
                    };
                    if names(expected) != names(&own) {
                        let list = |set: BTreeSet<&str>| set.into_iter().collect::<Vec<_>>().join(", ");
                        return Err(err(
                            format!(
                                "Or pattern alternatives must bind the same variables: {{{}}} and {{{}}}",
                                list(names(expected)),
                                list(names(&own))
                            ),
                            alt.span,
                        ));
                    }
                    for b in &own {
                        if let Some(e) = expected.iter().find(|e| e.name == b.name) {
                            self.unify(cx, e.ty.clone(), b.ty.clone(), b.span)?;
                        }
                    }
                }
                bindings.extend(first.unwrap_or_default());
                Ok(TypedPattern::Or(typed))
            }
        }
    }

    fn check_case_pattern(
        &self,
        cx: &mut FnCx,
        name: &str,
        args: &[Pattern],
        ty: &Ty,
        span: Span,
        bindings: &mut Vec<Binding>,
    ) -> Result<TypedPattern<Ty>, LocalError> {
        let resolved = cx.solver.resolve(ty);
        let (id, targs) = match resolved.strip_ref() {
            Ty::Union(id) => (*id, Vec::new()),
            Ty::GenericUnion { template, args } => (*template, args.clone()),
            Ty::Var(_) => {
                return Err(err(
                    format!("Cannot match case '.{name}' against a value of unknown type; add a type annotation"),
                    span,
                ))
            }
            other => {
                return Err(LocalError::new(
                    SemanticErrorKind::mismatch("union type", other.display(&self.ctx)),
                    span,
                ))
            }
        };
        let map = self.param_map(id, &targs);
        let cases = self.ctx.get_union_cases(id).unwrap_or_default();
        let Some(tag) = cases.iter().position(|c| c.name == name) else {
            return Err(LocalError::new(
                SemanticErrorKind::UndefinedMember {
                    member: name.to_string(),
                    ty: resolved.display(&self.ctx).to_string(),
                },
                span,
            ));
        };
        let union_name = self.ctx.get_name(id).unwrap_or("<unknown>");
        Self::arity(&format!("{union_name}.{name}"), cases[tag].params.len(), args.len(), span)?;
        let mut typed = Vec::with_capacity(args.len());
        for (param, arg) in cases[tag].params.iter().zip(args) {
            let field_ty = param.ty.substitute_params(&map);
            typed.push(self.check_pattern(cx, arg, &field_ty, bindings)?);
        }
        Ok(TypedPattern::Case {
            name: name.to_string(),
            tag,
            args: typed,
        })
    }

    fn param_map(&self, id: DefId, args: &[Ty]) -> FxHashMap<String, Ty> {
        self.ctx
            .type_params(id)
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect()
    }

    // ── Coverage ───────────────────────────────────────────────────────

    /// What the usefulness check needs to know about `ty`, expanding
    /// union cases `depth` levels down.
    fn type_info(&self, ty: &Ty, depth: usize) -> TypeInfo {
        let (id, args) = match ty.strip_ref() {
            Ty::Bool => return TypeInfo::Bool,
            Ty::Union(id) => (*id, Vec::new()),
            Ty::GenericUnion { template, args } => (*template, args.clone()),
            _ => return TypeInfo::Infinite,
        };
        if depth == 0 {
            return TypeInfo::Infinite;
        }
        let map = self.param_map(id, &args);
        let variants = self
            .ctx
            .get_union_cases(id)
            .unwrap_or_default()
            .iter()
            .map(|case| ConstructorSig {
                name: case.name.clone(),
                fields: case
                    .params
                    .iter()
                    .map(|p| self.type_info(&p.ty.substitute_params(&map), depth - 1))
                    .collect(),
            })
            .collect();
        TypeInfo::SumType { variants }
    }

    /// Reject arms that can never match, then matches that miss values.
    fn check_coverage(
        &self,
        matched: &Ty,
        depth: usize,
        arms: &[MatchArm],
        checked: &[(TypedPattern<Ty>, Vec<Binding>)],
        span: Span,
    ) -> Result<(), LocalError> {
        let info = self.type_info(matched, depth);
        let pats: Vec<Pat> = checked.iter().map(|(p, _)| lower(p)).collect();

        if let Some(&index) = check_redundancy(&pats, &info).first() {
            let pattern = &checked[index].0;
            let reason = match checked[..index].iter().position(|(p, _)| is_catchall(p)) {
                Some(at) => format!(
                    "already covered by '{}' at position {}",
                    describe(&checked[at].0),
                    at + 1
                ),
                None => "already covered by earlier patterns".to_string(),
            };
            return Err(err(
                format!("Unreachable pattern '{}': {reason}", describe(pattern)),
                arms[index].pattern.span,
            ));
        }

        let Some(missing) = check_exhaustiveness(&pats, &info) else {
            return Ok(());
        };
        let ty = matched.display(&self.ctx);
        if missing == [Pat::Wildcard] {
            return Err(err(
                format!("Match on type '{ty}' requires a wildcard or variable binding pattern"),
                span,
            ));
        }
        let mut missing: Vec<String> = missing.iter().map(|p| p.to_string()).collect();
        missing.sort();
        Err(err(
            format!("Non-exhaustive match on type '{ty}': missing cases {}", missing.join(", ")),
            span,
        ))
    }
}
