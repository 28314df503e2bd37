//! Untyped syntax tree for Kestrel.
//!
//! The parser produces a [`Program`] of [`SourceModule`]s; semantic analysis
//! consumes it read-only. Every node that can be blamed in a diagnostic
//! carries a [`Span`].

pub mod build;

use kestrel_common::{ModulePath, Span};
use serde::Serialize;

/// A whole compilation unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub modules: Vec<SourceModule>,
}

/// One source file together with the module it declares.
#[derive(Debug, Clone, Serialize)]
pub struct SourceModule {
    pub path: ModulePath,
    pub file_name: String,
    /// Source text, used to turn spans into line numbers.
    pub source: String,
    pub items: Vec<Item>,
}

// ── Type Annotations ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeNode {
    /// `Int`, `Point`, `T`, or a trait name used as a bound.
    Named { name: String, span: Span },
    /// `List[Int]`
    Generic {
        base: String,
        args: Vec<TypeNode>,
        span: Span,
    },
    /// `T ref`
    Ref(Box<TypeNode>),
    /// `T ptr`
    Ptr(Box<TypeNode>),
    /// `T weakref`
    WeakRef(Box<TypeNode>),
    /// `[A, B]R`
    Function {
        params: Vec<TypeNode>,
        ret: Box<TypeNode>,
        span: Span,
    },
    /// `Self` inside traits and givens.
    SelfType { span: Span },
}

impl TypeNode {
    pub fn span(&self) -> Span {
        match self {
            TypeNode::Named { span, .. }
            | TypeNode::Generic { span, .. }
            | TypeNode::Function { span, .. }
            | TypeNode::SelfType { span } => *span,
            TypeNode::Ref(inner) | TypeNode::Ptr(inner) | TypeNode::WeakRef(inner) => inner.span(),
        }
    }
}

/// `Trait` or `Trait[Args]` in a bound, super-trait list or conformance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitRef {
    pub name: String,
    pub args: Vec<TypeNode>,
    pub span: Span,
}

/// `T` or `T: Bound1 + Bound2` in a type parameter list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<TraitRef>,
    pub span: Span,
}

// ── Declarations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub enum Item {
    GlobalVar(GlobalVarDecl),
    Function(FunctionDecl),
    Struct(StructDecl),
    Union(UnionDecl),
    Trait(TraitDecl),
    Given(GivenDecl),
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalVarDecl {
    pub name: String,
    pub ty: Option<TypeNode>,
    pub value: Expr,
    pub mutable: bool,
    pub span: Span,
}

/// `[mut] name Type`. A parameter whose type is `T ref` binds a reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDecl {
    pub name: String,
    pub mutable: bool,
    pub ty: TypeNode,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<ParamDecl>,
    pub ret: TypeNode,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeNode,
    pub mutable: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<FieldDecl>,
    /// Declared with `val`: stored inline, no reference or mutable fields.
    pub is_value: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnionCaseDecl {
    pub name: String,
    pub params: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnionDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub cases: Vec<UnionCaseDecl>,
    pub is_value: bool,
    pub span: Span,
}

/// A method requirement inside a trait body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitMethodDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<ParamDecl>,
    pub ret: TypeNode,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraitDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub super_traits: Vec<TraitRef>,
    pub methods: Vec<TraitMethodDecl>,
    pub span: Span,
}

/// `given[T] Subject { methods }` or `given[T] Subject: Trait { methods }`.
#[derive(Debug, Clone, Serialize)]
pub struct GivenDecl {
    pub type_params: Vec<TypeParam>,
    pub subject: TypeNode,
    pub conformance: Option<TraitRef>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

// ── Statements ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    Let {
        name: String,
        ty: Option<TypeNode>,
        value: Expr,
        mutable: bool,
        span: Span,
    },
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    CompoundAssign {
        target: Expr,
        op: BinaryOp,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
    Return { value: Option<Expr>, span: Span },
    Break { span: Span },
    Continue { span: Span },
}

// ── Expressions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// Width suffix on a numeric literal (`1i8`, `2.5f32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NumSuffix {
    I,
    I8,
    I16,
    I32,
    I64,
    U,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Int {
        digits: String,
        suffix: Option<NumSuffix>,
    },
    Float {
        digits: String,
        suffix: Option<NumSuffix>,
    },
    Str(String),
    Bool(bool),
    Ident(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Function call or struct construction (`Point(1, 2)`).
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeNode>,
        args: Vec<Expr>,
    },
    /// `Shape.Circle(1.0)` or `Option[Int].None()`.
    UnionCase {
        ty: TypeNode,
        case: String,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Member {
        base: Box<Expr>,
        name: String,
    },
    Ref(Box<Expr>),
    Deref(Box<Expr>),
    Block {
        stmts: Vec<Stmt>,
        tail: Option<Box<Expr>>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    /// `match subject { pattern -> body, .. }`; arms are tried in order.
    Match {
        subject: Box<Expr>,
        arms: Vec<MatchArm>,
    },
}

// ── Patterns ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PatternKind {
    /// `_`
    Wildcard,
    /// `name` or `mut name`: matches anything and binds it.
    Binding { name: String, mutable: bool },
    Bool(bool),
    /// Integer literal, `-` included when negative.
    Int(String),
    /// `.Circle(r)`: a case of the subject's union, one sub-pattern per
    /// case parameter.
    Case { name: String, args: Vec<Pattern> },
    /// `p1 or p2`: every alternative binds the same names.
    Or(Vec<Pattern>),
}

