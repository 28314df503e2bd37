//! Terse constructors for syntax trees.
//!
//! Used by tests and tooling that need a tree without going through the
//! parser. Every node gets an empty span unless wrapped with [`at`].

use kestrel_common::{ModulePath, Span};

use crate::*;

fn boxed(expr: Expr) -> Box<Expr> {
    Box::new(expr)
}

fn expr(kind: ExprKind) -> Expr {
    Expr {
        kind,
        span: Span::default(),
    }
}

/// Attach a span to an expression.
pub fn at(mut e: Expr, start: u32, end: u32) -> Expr {
    e.span = Span::new(start, end);
    e
}

// ── Types ──────────────────────────────────────────────────────────────

pub fn ty(name: &str) -> TypeNode {
    TypeNode::Named {
        name: name.to_string(),
        span: Span::default(),
    }
}

pub fn generic(base: &str, args: Vec<TypeNode>) -> TypeNode {
    TypeNode::Generic {
        base: base.to_string(),
        args,
        span: Span::default(),
    }
}

pub fn ref_ty(inner: TypeNode) -> TypeNode {
    TypeNode::Ref(Box::new(inner))
}

pub fn ptr_ty(inner: TypeNode) -> TypeNode {
    TypeNode::Ptr(Box::new(inner))
}

pub fn weak_ty(inner: TypeNode) -> TypeNode {
    TypeNode::WeakRef(Box::new(inner))
}

pub fn fn_ty(params: Vec<TypeNode>, ret: TypeNode) -> TypeNode {
    TypeNode::Function {
        params,
        ret: Box::new(ret),
        span: Span::default(),
    }
}

pub fn self_ty() -> TypeNode {
    TypeNode::SelfType {
        span: Span::default(),
    }
}

pub fn trait_ref(name: &str, args: Vec<TypeNode>) -> TraitRef {
    TraitRef {
        name: name.to_string(),
        args,
        span: Span::default(),
    }
}

pub fn type_param(name: &str, bounds: Vec<TraitRef>) -> TypeParam {
    TypeParam {
        name: name.to_string(),
        bounds,
        span: Span::default(),
    }
}

// ── Expressions ────────────────────────────────────────────────────────

pub fn int(value: i64) -> Expr {
    expr(ExprKind::Int {
        digits: value.to_string(),
        suffix: None,
    })
}

pub fn int_suffixed(value: i64, suffix: NumSuffix) -> Expr {
    expr(ExprKind::Int {
        digits: value.to_string(),
        suffix: Some(suffix),
    })
}

pub fn float(digits: &str) -> Expr {
    expr(ExprKind::Float {
        digits: digits.to_string(),
        suffix: None,
    })
}

pub fn float_suffixed(digits: &str, suffix: NumSuffix) -> Expr {
    expr(ExprKind::Float {
        digits: digits.to_string(),
        suffix: Some(suffix),
    })
}

pub fn string(value: &str) -> Expr {
    expr(ExprKind::Str(value.to_string()))
}

pub fn boolean(value: bool) -> Expr {
    expr(ExprKind::Bool(value))
}

pub fn ident(name: &str) -> Expr {
    expr(ExprKind::Ident(name.to_string()))
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        lhs: boxed(lhs),
        rhs: boxed(rhs),
    })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        operand: boxed(operand),
    })
}

pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    call_with(callee, Vec::new(), args)
}

pub fn call_with(callee: &str, type_args: Vec<TypeNode>, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        callee: boxed(ident(callee)),
        type_args,
        args,
    })
}

pub fn union_case(union_ty: TypeNode, case: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::UnionCase {
        ty: union_ty,
        case: case.to_string(),
        args,
    })
}

pub fn method(receiver: Expr, name: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::MethodCall {
        receiver: boxed(receiver),
        method: name.to_string(),
        args,
    })
}

pub fn member(base: Expr, name: &str) -> Expr {
    expr(ExprKind::Member {
        base: boxed(base),
        name: name.to_string(),
    })
}

pub fn ref_of(inner: Expr) -> Expr {
    expr(ExprKind::Ref(boxed(inner)))
}

pub fn deref(inner: Expr) -> Expr {
    expr(ExprKind::Deref(boxed(inner)))
}

pub fn block(stmts: Vec<Stmt>, tail: Option<Expr>) -> Expr {
    expr(ExprKind::Block {
        stmts,
        tail: tail.map(boxed),
    })
}

pub fn if_else(cond: Expr, then_branch: Expr, else_branch: Option<Expr>) -> Expr {
    expr(ExprKind::If {
        cond: boxed(cond),
        then_branch: boxed(then_branch),
        else_branch: else_branch.map(boxed),
    })
}

pub fn while_loop(cond: Expr, body: Expr) -> Expr {
    expr(ExprKind::While {
        cond: boxed(cond),
        body: boxed(body),
    })
}

pub fn match_expr(subject: Expr, arms: Vec<MatchArm>) -> Expr {
    expr(ExprKind::Match {
        subject: boxed(subject),
        arms,
    })
}

// ── Patterns ───────────────────────────────────────────────────────────

fn pattern(kind: PatternKind) -> Pattern {
    Pattern {
        kind,
        span: Span::default(),
    }
}

/// `pattern -> body`
pub fn arm(pattern: Pattern, body: Expr) -> MatchArm {
    MatchArm {
        pattern,
        body,
        span: Span::default(),
    }
}

pub fn pat_wild() -> Pattern {
    pattern(PatternKind::Wildcard)
}

pub fn pat_bind(name: &str) -> Pattern {
    pattern(PatternKind::Binding {
        name: name.to_string(),
        mutable: false,
    })
}

pub fn pat_bind_mut(name: &str) -> Pattern {
    pattern(PatternKind::Binding {
        name: name.to_string(),
        mutable: true,
    })
}

pub fn pat_bool(value: bool) -> Pattern {
    pattern(PatternKind::Bool(value))
}

pub fn pat_int(value: i64) -> Pattern {
    pattern(PatternKind::Int(value.to_string()))
}

/// `.Name(args)`
pub fn pat_case(name: &str, args: Vec<Pattern>) -> Pattern {
    pattern(PatternKind::Case {
        name: name.to_string(),
        args,
    })
}

pub fn pat_or(alternatives: Vec<Pattern>) -> Pattern {
    pattern(PatternKind::Or(alternatives))
}

// ── Statements ─────────────────────────────────────────────────────────

pub fn let_(name: &str, value: Expr) -> Stmt {
    Stmt::Let {
        name: name.to_string(),
        ty: None,
        value,
        mutable: false,
        span: Span::default(),
    }
}

pub fn let_mut(name: &str, value: Expr) -> Stmt {
    Stmt::Let {
        name: name.to_string(),
        ty: None,
        value,
        mutable: true,
        span: Span::default(),
    }
}

pub fn let_typed(name: &str, annotation: TypeNode, value: Expr) -> Stmt {
    Stmt::Let {
        name: name.to_string(),
        ty: Some(annotation),
        value,
        mutable: false,
        span: Span::default(),
    }
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign {
        target,
        value,
        span: Span::default(),
    }
}

pub fn compound(target: Expr, op: BinaryOp, value: Expr) -> Stmt {
    Stmt::CompoundAssign {
        target,
        op,
        value,
        span: Span::default(),
    }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return {
        value,
        span: Span::default(),
    }
}

pub fn stmt(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

// ── Declarations ───────────────────────────────────────────────────────

fn param_with(name: &str, mutable: bool, param_ty: TypeNode) -> ParamDecl {
    ParamDecl {
        name: name.to_string(),
        mutable,
        ty: param_ty,
        span: Span::default(),
    }
}

pub fn param(name: &str, param_ty: TypeNode) -> ParamDecl {
    param_with(name, false, param_ty)
}

pub fn param_mut(name: &str, param_ty: TypeNode) -> ParamDecl {
    param_with(name, true, param_ty)
}

/// `self Self`
pub fn self_param() -> ParamDecl {
    param_with("self", false, self_ty())
}

/// `self Self ref`
pub fn self_ref_param() -> ParamDecl {
    param_with("self", false, ref_ty(self_ty()))
}

pub fn func(name: &str, params: Vec<ParamDecl>, ret: TypeNode, body: Expr) -> FunctionDecl {
    generic_func(name, Vec::new(), params, ret, body)
}

pub fn generic_func(
    name: &str,
    type_params: Vec<TypeParam>,
    params: Vec<ParamDecl>,
    ret: TypeNode,
    body: Expr,
) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        type_params,
        params,
        ret,
        body,
        span: Span::default(),
    }
}

pub fn field(name: &str, field_ty: TypeNode) -> FieldDecl {
    FieldDecl {
        name: name.to_string(),
        ty: field_ty,
        mutable: false,
        span: Span::default(),
    }
}

pub fn field_mut(name: &str, field_ty: TypeNode) -> FieldDecl {
    FieldDecl {
        mutable: true,
        ..field(name, field_ty)
    }
}

pub fn struct_decl(name: &str, fields: Vec<FieldDecl>) -> Item {
    generic_struct(name, Vec::new(), fields)
}

pub fn value_struct(name: &str, fields: Vec<FieldDecl>) -> Item {
    Item::Struct(StructDecl {
        name: name.to_string(),
        type_params: Vec::new(),
        fields,
        is_value: true,
        span: Span::default(),
    })
}

pub fn generic_struct(name: &str, type_params: Vec<TypeParam>, fields: Vec<FieldDecl>) -> Item {
    Item::Struct(StructDecl {
        name: name.to_string(),
        type_params,
        fields,
        is_value: false,
        span: Span::default(),
    })
}

pub fn case(name: &str, params: Vec<FieldDecl>) -> UnionCaseDecl {
    UnionCaseDecl {
        name: name.to_string(),
        params,
        span: Span::default(),
    }
}

pub fn union_decl(name: &str, cases: Vec<UnionCaseDecl>) -> Item {
    generic_union(name, Vec::new(), cases)
}

pub fn generic_union(name: &str, type_params: Vec<TypeParam>, cases: Vec<UnionCaseDecl>) -> Item {
    Item::Union(UnionDecl {
        name: name.to_string(),
        type_params,
        cases,
        is_value: false,
        span: Span::default(),
    })
}

pub fn trait_method(name: &str, params: Vec<ParamDecl>, ret: TypeNode) -> TraitMethodDecl {
    TraitMethodDecl {
        name: name.to_string(),
        type_params: Vec::new(),
        params,
        ret,
        span: Span::default(),
    }
}

pub fn trait_decl(name: &str, super_traits: Vec<TraitRef>, methods: Vec<TraitMethodDecl>) -> Item {
    generic_trait(name, Vec::new(), super_traits, methods)
}

pub fn generic_trait(
    name: &str,
    type_params: Vec<TypeParam>,
    super_traits: Vec<TraitRef>,
    methods: Vec<TraitMethodDecl>,
) -> Item {
    Item::Trait(TraitDecl {
        name: name.to_string(),
        type_params,
        super_traits,
        methods,
        span: Span::default(),
    })
}

/// `given Subject { methods }`
pub fn given(subject: TypeNode, methods: Vec<FunctionDecl>) -> Item {
    Item::Given(GivenDecl {
        type_params: Vec::new(),
        subject,
        conformance: None,
        methods,
        span: Span::default(),
    })
}

/// `given Subject: Trait { methods }`
pub fn given_conformance(subject: TypeNode, conformance: TraitRef, methods: Vec<FunctionDecl>) -> Item {
    Item::Given(GivenDecl {
        type_params: Vec::new(),
        subject,
        conformance: Some(conformance),
        methods,
        span: Span::default(),
    })
}

/// `given[T] Subject[T] { methods }`, optionally with a conformance.
pub fn generic_given(
    type_params: Vec<TypeParam>,
    subject: TypeNode,
    conformance: Option<TraitRef>,
    methods: Vec<FunctionDecl>,
) -> Item {
    Item::Given(GivenDecl {
        type_params,
        subject,
        conformance,
        methods,
        span: Span::default(),
    })
}

pub fn global(name: &str, value: Expr) -> Item {
    Item::GlobalVar(GlobalVarDecl {
        name: name.to_string(),
        ty: None,
        value,
        mutable: false,
        span: Span::default(),
    })
}

pub fn module(path: &str, items: Vec<Item>) -> SourceModule {
    SourceModule {
        path: ModulePath::parse(path),
        file_name: format!("{}.kes", if path.is_empty() { "main" } else { path }),
        source: String::new(),
        items,
    }
}

pub fn program(modules: Vec<SourceModule>) -> Program {
    Program { modules }
}
