//! Semantic errors and the inference failures they are built from.

use std::fmt;

use kestrel_common::{LineIndex, Span};
use serde::Serialize;

use crate::context::{DefContext, DefId};
use crate::ty::{Ty, TypeVar};

/// The closed set of semantic error kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticErrorKind {
    TypeMismatch { expected: String, got: String },
    UndefinedVariable { name: String },
    UndefinedType { name: String },
    InvalidOperation { op: String, lhs: String, rhs: String },
    InvalidNode,
    DuplicateDefinition { name: String },
    DuplicateTypeDefinition { name: String },
    InvalidArgumentCount { function: String, expected: usize, got: usize },
    UndefinedMember { member: String, ty: String },
    InvalidFieldTypeInValueType { ty: String, field: String, field_ty: String },
    InvalidMutableFieldInValueType { ty: String, field: String },
    AssignToImmutable { name: String },
    ImmutableFieldAssignment { ty: String, field: String },
    VariableMoved { name: String },
    GivenLocality { message: String },
    Generic { message: String },
}

impl SemanticErrorKind {
    pub fn generic(message: impl Into<String>) -> Self {
        SemanticErrorKind::Generic {
            message: message.into(),
        }
    }

    pub fn mismatch(expected: impl fmt::Display, got: impl fmt::Display) -> Self {
        SemanticErrorKind::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

impl fmt::Display for SemanticErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticErrorKind::TypeMismatch { expected, got } => {
                write!(f, "Type mismatch: expected {expected}, got {got}")
            }
            SemanticErrorKind::UndefinedVariable { name } => write!(f, "Undefined variable: {name}"),
            SemanticErrorKind::UndefinedType { name } => write!(f, "Undefined type: {name}"),
            SemanticErrorKind::InvalidOperation { op, lhs, rhs } => {
                write!(f, "Invalid operation {op} between types {lhs} and {rhs}")
            }
            SemanticErrorKind::InvalidNode => write!(f, "Invalid AST node"),
            SemanticErrorKind::DuplicateDefinition { name } => write!(f, "Duplicate definition: {name}"),
            SemanticErrorKind::DuplicateTypeDefinition { name } => {
                write!(f, "Duplicate type definition: {name}")
            }
            SemanticErrorKind::InvalidArgumentCount {
                function,
                expected,
                got,
            } => write!(
                f,
                "Invalid argument count for function {function}: expected {expected}, got {got}"
            ),
            SemanticErrorKind::UndefinedMember { member, ty } => {
                write!(f, "Member '{member}' not found in type '{ty}'")
            }
            SemanticErrorKind::InvalidFieldTypeInValueType { ty, field, field_ty } => write!(
                f,
                "Value type '{ty}' cannot have field '{field}' of reference type '{field_ty}'"
            ),
            SemanticErrorKind::InvalidMutableFieldInValueType { ty, field } => {
                write!(f, "Value type '{ty}' cannot have mutable field '{field}'")
            }
            SemanticErrorKind::AssignToImmutable { name } => {
                write!(f, "Cannot assign to immutable variable: {name}")
            }
            SemanticErrorKind::ImmutableFieldAssignment { ty, field } => {
                write!(f, "Cannot assign to immutable field '{field}' of type '{ty}'")
            }
            SemanticErrorKind::VariableMoved { name } => write!(f, "Use of moved variable: '{name}'"),
            SemanticErrorKind::GivenLocality { message } | SemanticErrorKind::Generic { message } => {
                write!(f, "{message}")
            }
        }
    }
}

/// A located semantic error. Checking stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub file_name: String,
    pub line: u32,
    pub column: u32,
    pub span: Span,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, file_name: &str, span: Span, lines: &LineIndex) -> Self {
        let (line, column) = lines.line_col(span.start);
        SemanticError {
            kind,
            file_name: file_name.to_string(),
            line,
            column,
            span,
        }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file_name, self.line, self.column, self.kind)
    }
}

impl std::error::Error for SemanticError {}

/// An error whose file and line are not known yet. Components below the
/// checker return these; the checker attaches the location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalError {
    pub kind: SemanticErrorKind,
    pub span: Span,
}

impl LocalError {
    pub fn new(kind: SemanticErrorKind, span: Span) -> Self {
        LocalError { kind, span }
    }

    pub fn locate(self, file_name: &str, lines: &LineIndex) -> SemanticError {
        SemanticError::new(self.kind, file_name, self.span, lines)
    }
}

// ── Inference Failures ─────────────────────────────────────────────────

/// Why a constraint could not be satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum InferError {
    Mismatch { expected: Ty, found: Ty },
    ArityMismatch { expected: usize, found: usize },
    /// Binding `var` to `ty` would build an infinite type.
    OccursCheck { var: TypeVar, ty: Ty },
    TemplateMismatch { expected: DefId, found: DefId },
    TraitNotSatisfied { ty: Ty, trait_name: String },
    /// A bound on a type that stayed open after defaulting.
    AmbiguousTraitBound { ty: Ty, trait_name: String },
}

impl InferError {
    pub fn to_kind(&self, ctx: &DefContext) -> SemanticErrorKind {
        match self {
            InferError::Mismatch { expected, found } => {
                SemanticErrorKind::mismatch(expected.display(ctx), found.display(ctx))
            }
            InferError::ArityMismatch { expected, found } => SemanticErrorKind::generic(format!(
                "Arity mismatch: expected {expected} parameters, got {found}"
            )),
            InferError::OccursCheck { var, ty } => SemanticErrorKind::generic(format!(
                "Infinite type: {} occurs in {}",
                var,
                ty.display(ctx)
            )),
            InferError::TemplateMismatch { expected, found } => SemanticErrorKind::mismatch(
                ctx.get_name(*expected).unwrap_or("<unknown>"),
                ctx.get_name(*found).unwrap_or("<unknown>"),
            ),
            InferError::TraitNotSatisfied { ty, trait_name } => SemanticErrorKind::generic(format!(
                "Type '{}' does not conform to trait '{}'",
                ty.display(ctx),
                trait_name
            )),
            InferError::AmbiguousTraitBound { ty, trait_name } => SemanticErrorKind::generic(format!(
                "Cannot infer a type for '{}' satisfying trait '{}'",
                ty.display(ctx),
                trait_name
            )),
        }
    }
}
