//! The typed tree.
//!
//! Nodes are generic over their type annotation. The checker builds
//! `TypedExpr<Ty>` while walking a body, then maps every annotation to a
//! [`ResolvedTy`] once the body's constraints are solved; the result is the
//! [`TypedProgram`] handed to code generation.

use kestrel_ast::{BinaryOp, UnaryOp};
use kestrel_common::{ModulePath, Span};
use serde::Serialize;

use crate::resolved::ResolvedTy;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedExpr<T> {
    pub kind: TypedExprKind<T>,
    pub ty: T,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypedExprKind<T> {
    Int(String),
    Float(String),
    Str(String),
    Bool(bool),
    Var(String),
    /// A reference to a named function.
    Function(String),
    Binary {
        op: BinaryOp,
        lhs: Box<TypedExpr<T>>,
        rhs: Box<TypedExpr<T>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr<T>>,
    },
    Call {
        callee: Box<TypedExpr<T>>,
        args: Vec<TypedExpr<T>>,
    },
    /// `Point(1, 2)`; arguments are in field order.
    Construct {
        type_name: String,
        args: Vec<TypedExpr<T>>,
    },
    UnionCase {
        case: String,
        tag: usize,
        args: Vec<TypedExpr<T>>,
    },
    MethodCall {
        receiver: Box<TypedExpr<T>>,
        method: String,
        args: Vec<TypedExpr<T>>,
    },
    Member {
        base: Box<TypedExpr<T>>,
        name: String,
        index: usize,
    },
    Ref(Box<TypedExpr<T>>),
    Deref(Box<TypedExpr<T>>),
    Block {
        stmts: Vec<TypedStmt<T>>,
        tail: Option<Box<TypedExpr<T>>>,
    },
    If {
        cond: Box<TypedExpr<T>>,
        then_branch: Box<TypedExpr<T>>,
        else_branch: Option<Box<TypedExpr<T>>>,
    },
    While {
        cond: Box<TypedExpr<T>>,
        body: Box<TypedExpr<T>>,
    },
    Match {
        subject: Box<TypedExpr<T>>,
        arms: Vec<TypedArm<T>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedArm<T> {
    pub pattern: TypedPattern<T>,
    pub body: TypedExpr<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypedPattern<T> {
    Wildcard,
    Binding { name: String, mutable: bool, ty: T },
    Bool(bool),
    Int(String),
    /// `tag` is the case's index in its union declaration.
    Case {
        name: String,
        tag: usize,
        args: Vec<TypedPattern<T>>,
    },
    Or(Vec<TypedPattern<T>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypedStmt<T> {
    Let {
        name: String,
        mutable: bool,
        value: TypedExpr<T>,
    },
    /// Compound assignments arrive here already expanded.
    Assign {
        target: TypedExpr<T>,
        value: TypedExpr<T>,
    },
    Expr(TypedExpr<T>),
    Return(Option<TypedExpr<T>>),
    Break,
    Continue,
}

fn map_box<T, U, E>(
    e: Box<TypedExpr<T>>,
    f: &mut impl FnMut(T) -> Result<U, E>,
) -> Result<Box<TypedExpr<U>>, E> {
    Ok(Box::new(e.try_map(f)?))
}

fn map_all<T, U, E>(
    es: Vec<TypedExpr<T>>,
    f: &mut impl FnMut(T) -> Result<U, E>,
) -> Result<Vec<TypedExpr<U>>, E> {
    es.into_iter().map(|e| e.try_map(f)).collect()
}

impl<T> TypedExpr<T> {
    pub fn new(kind: TypedExprKind<T>, ty: T, span: Span) -> Self {
        TypedExpr { kind, ty, span }
    }

    /// Rebuild the tree with every annotation passed through `f`, stopping
    /// at the first failure.
    pub fn try_map<U, E>(self, f: &mut impl FnMut(T) -> Result<U, E>) -> Result<TypedExpr<U>, E> {
        let kind = match self.kind {
            TypedExprKind::Int(d) => TypedExprKind::Int(d),
            TypedExprKind::Float(d) => TypedExprKind::Float(d),
            TypedExprKind::Str(s) => TypedExprKind::Str(s),
            TypedExprKind::Bool(b) => TypedExprKind::Bool(b),
            TypedExprKind::Var(n) => TypedExprKind::Var(n),
            TypedExprKind::Function(n) => TypedExprKind::Function(n),
            TypedExprKind::Binary { op, lhs, rhs } => TypedExprKind::Binary {
                op,
                lhs: map_box(lhs, f)?,
                rhs: map_box(rhs, f)?,
            },
            TypedExprKind::Unary { op, operand } => TypedExprKind::Unary {
                op,
                operand: map_box(operand, f)?,
            },
            TypedExprKind::Call { callee, args } => TypedExprKind::Call {
                callee: map_box(callee, f)?,
                args: map_all(args, f)?,
            },
            TypedExprKind::Construct { type_name, args } => TypedExprKind::Construct {
                type_name,
                args: map_all(args, f)?,
            },
            TypedExprKind::UnionCase { case, tag, args } => TypedExprKind::UnionCase {
                case,
                tag,
                args: map_all(args, f)?,
            },
            TypedExprKind::MethodCall {
                receiver,
                method,
                args,
            } => TypedExprKind::MethodCall {
                receiver: map_box(receiver, f)?,
                method,
                args: map_all(args, f)?,
            },
            TypedExprKind::Member { base, name, index } => TypedExprKind::Member {
                base: map_box(base, f)?,
                name,
                index,
            },
            TypedExprKind::Ref(inner) => TypedExprKind::Ref(map_box(inner, f)?),
            TypedExprKind::Deref(inner) => TypedExprKind::Deref(map_box(inner, f)?),
            TypedExprKind::Block { stmts, tail } => TypedExprKind::Block {
                stmts: stmts
                    .into_iter()
                    .map(|s| s.try_map(f))
                    .collect::<Result<_, _>>()?,
                tail: tail.map(|t| map_box(t, f)).transpose()?,
            },
            TypedExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => TypedExprKind::If {
                cond: map_box(cond, f)?,
                then_branch: map_box(then_branch, f)?,
                else_branch: else_branch.map(|e| map_box(e, f)).transpose()?,
            },
            TypedExprKind::While { cond, body } => TypedExprKind::While {
                cond: map_box(cond, f)?,
                body: map_box(body, f)?,
            },
            TypedExprKind::Match { subject, arms } => TypedExprKind::Match {
                subject: map_box(subject, f)?,
                arms: arms
                    .into_iter()
                    .map(|arm| -> Result<TypedArm<U>, E> {
                        Ok(TypedArm {
                            pattern: arm.pattern.try_map(f)?,
                            body: arm.body.try_map(f)?,
                        })
                    })
                    .collect::<Result<_, _>>()?,
            },
        };
        Ok(TypedExpr {
            kind,
            ty: f(self.ty)?,
            span: self.span,
        })
    }
}

impl<T> TypedStmt<T> {
    pub fn try_map<U, E>(self, f: &mut impl FnMut(T) -> Result<U, E>) -> Result<TypedStmt<U>, E> {
        Ok(match self {
            TypedStmt::Let {
                name,
                mutable,
                value,
            } => TypedStmt::Let {
                name,
                mutable,
                value: value.try_map(f)?,
            },
            TypedStmt::Assign { target, value } => TypedStmt::Assign {
                target: target.try_map(f)?,
                value: value.try_map(f)?,
            },
            TypedStmt::Expr(e) => TypedStmt::Expr(e.try_map(f)?),
            TypedStmt::Return(v) => TypedStmt::Return(v.map(|e| e.try_map(f)).transpose()?),
            TypedStmt::Break => TypedStmt::Break,
            TypedStmt::Continue => TypedStmt::Continue,
        })
    }
}

fn map_pats<T, U, E>(
    pats: Vec<TypedPattern<T>>,
    f: &mut impl FnMut(T) -> Result<U, E>,
) -> Result<Vec<TypedPattern<U>>, E> {
    pats.into_iter().map(|p| p.try_map(f)).collect()
}

impl<T> TypedPattern<T> {
    pub fn try_map<U, E>(self, f: &mut impl FnMut(T) -> Result<U, E>) -> Result<TypedPattern<U>, E> {
        Ok(match self {
            TypedPattern::Wildcard => TypedPattern::Wildcard,
            TypedPattern::Binding { name, mutable, ty } => TypedPattern::Binding {
                name,
                mutable,
                ty: f(ty)?,
            },
            TypedPattern::Bool(b) => TypedPattern::Bool(b),
            TypedPattern::Int(d) => TypedPattern::Int(d),
            TypedPattern::Case { name, tag, args } => TypedPattern::Case {
                name,
                tag,
                args: map_pats(args, f)?,
            },
            TypedPattern::Or(alternatives) => TypedPattern::Or(map_pats(alternatives, f)?),
        })
    }

    /// Names this pattern binds, in order of appearance.
    pub fn bindings(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_bindings(&mut names);
        names
    }

    fn collect_bindings<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            TypedPattern::Binding { name, .. } => names.push(name),
            TypedPattern::Case { args, .. } => args.iter().for_each(|a| a.collect_bindings(names)),
            // Every alternative binds the same names.
            TypedPattern::Or(alternatives) => {
                if let Some(first) = alternatives.first() {
                    first.collect_bindings(names);
                }
            }
            TypedPattern::Wildcard | TypedPattern::Bool(_) | TypedPattern::Int(_) => {}
        }
    }
}

// ── Program ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedParam {
    pub name: String,
    pub mutable: bool,
    pub ty: ResolvedTy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedFunction {
    pub name: String,
    pub params: Vec<TypedParam>,
    pub ret: ResolvedTy,
    pub body: TypedExpr<ResolvedTy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedGlobal {
    pub name: String,
    pub mutable: bool,
    pub value: TypedExpr<ResolvedTy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedField {
    pub name: String,
    pub ty: ResolvedTy,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedCase {
    pub name: String,
    pub params: Vec<TypedField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Struct,
    Union,
    Function,
    Given,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum TypedItem {
    Global(TypedGlobal),
    Function(TypedFunction),
    Struct {
        name: String,
        fields: Vec<TypedField>,
        is_copy: bool,
        is_value: bool,
    },
    Union {
        name: String,
        cases: Vec<TypedCase>,
        is_copy: bool,
        is_value: bool,
    },
    Trait {
        name: String,
        methods: Vec<String>,
    },
    Given {
        subject: ResolvedTy,
        trait_name: Option<String>,
        methods: Vec<TypedFunction>,
    },
    /// A generic declaration; its body lives in the template registry and
    /// is typed again per instantiation.
    Template { name: String, kind: TemplateKind },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedModule {
    pub path: ModulePath,
    pub file_name: String,
    pub items: Vec<TypedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypedProgram {
    pub modules: Vec<TypedModule>,
}

impl TypedProgram {
    pub fn items(&self) -> impl Iterator<Item = &TypedItem> {
        self.modules.iter().flat_map(|m| m.items.iter())
    }

    pub fn function(&self, name: &str) -> Option<&TypedFunction> {
        self.items().find_map(|item| match item {
            TypedItem::Function(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    pub fn global(&self, name: &str) -> Option<&TypedGlobal> {
        self.items().find_map(|item| match item {
            TypedItem::Global(g) if g.name == name => Some(g),
            _ => None,
        })
    }
}
