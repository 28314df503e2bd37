//! Ariadne rendering for semantic errors and infinite-size types.
//!
//! Output is colourless so it can be compared in tests. Each report has a
//! stable error code, the one-line message, a label on the offending span
//! and, where there is an obvious fix, a help line.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use crate::error::{SemanticError, SemanticErrorKind};
use crate::recursive::RecursionCycle;

// ── Error Codes ────────────────────────────────────────────────────────

pub fn error_code(kind: &SemanticErrorKind) -> &'static str {
    match kind {
        SemanticErrorKind::TypeMismatch { .. } => "E0001",
        SemanticErrorKind::UndefinedVariable { .. } => "E0002",
        SemanticErrorKind::UndefinedType { .. } => "E0003",
        SemanticErrorKind::InvalidOperation { .. } => "E0004",
        SemanticErrorKind::InvalidNode => "E0005",
        SemanticErrorKind::DuplicateDefinition { .. } => "E0006",
        SemanticErrorKind::DuplicateTypeDefinition { .. } => "E0007",
        SemanticErrorKind::InvalidArgumentCount { .. } => "E0008",
        SemanticErrorKind::UndefinedMember { .. } => "E0009",
        SemanticErrorKind::InvalidFieldTypeInValueType { .. } => "E0010",
        SemanticErrorKind::InvalidMutableFieldInValueType { .. } => "E0011",
        SemanticErrorKind::AssignToImmutable { .. } => "E0012",
        SemanticErrorKind::ImmutableFieldAssignment { .. } => "E0013",
        SemanticErrorKind::VariableMoved { .. } => "E0014",
        SemanticErrorKind::GivenLocality { .. } => "E0015",
        SemanticErrorKind::Generic { .. } => "E0016",
    }
}

/// Code used for infinite-size value types.
pub const RECURSIVE_TYPE_CODE: &str = "E0017";

fn label_text(kind: &SemanticErrorKind) -> String {
    match kind {
        SemanticErrorKind::TypeMismatch { expected, got } => format!("expected {expected}, found {got}"),
        SemanticErrorKind::UndefinedVariable { .. } => "not found in this scope".to_string(),
        SemanticErrorKind::UndefinedType { .. } => "unknown type".to_string(),
        SemanticErrorKind::InvalidOperation { lhs, rhs, .. } => format!("{lhs} and {rhs}"),
        SemanticErrorKind::InvalidArgumentCount { expected, got, .. } => {
            format!("expected {expected} argument(s), found {got}")
        }
        SemanticErrorKind::VariableMoved { .. } => "value used after move".to_string(),
        SemanticErrorKind::AssignToImmutable { .. } | SemanticErrorKind::ImmutableFieldAssignment { .. } => {
            "cannot assign".to_string()
        }
        _ => "here".to_string(),
    }
}

fn help_text(kind: &SemanticErrorKind) -> Option<String> {
    match kind {
        SemanticErrorKind::AssignToImmutable { name } => Some(format!("declare it with `let mut {name}`")),
        SemanticErrorKind::InvalidFieldTypeInValueType { .. } => {
            Some("value types are stored inline; drop `val` or store the field by value".to_string())
        }
        SemanticErrorKind::InvalidMutableFieldInValueType { .. } => {
            Some("fields of a value type are immutable".to_string())
        }
        SemanticErrorKind::VariableMoved { name } => {
            Some(format!("pass `{name}` by reference to keep using it"))
        }
        SemanticErrorKind::GivenLocality { .. } => {
            Some("move the given next to the type or the trait it refers to".to_string())
        }
        _ => None,
    }
}

/// Clamp a span into the source and make it at least one byte wide where
/// the source allows.
fn clamp(range: Range<usize>, source_len: usize) -> Range<usize> {
    let s = range.start.min(source_len);
    let e = range.end.min(source_len).max(s);
    if s == e {
        s..e.saturating_add(1).min(source_len)
    } else {
        s..e
    }
}

fn write_report(report: Report<'_, Range<usize>>, source: &str) -> String {
    let mut buf = Vec::new();
    if report.write(Source::from(source), &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Render `error` against the text of the file it was found in.
pub fn render_diagnostic(error: &SemanticError, source: &str) -> String {
    let config = Config::default().with_color(false);
    let span = clamp(error.span.range(), source.len());
    let mut builder = Report::build(ReportKind::Error, span.clone())
        .with_code(error_code(&error.kind))
        .with_message(error.message())
        .with_config(config)
        .with_label(
            Label::new(span)
                .with_message(label_text(&error.kind))
                .with_color(Color::Red),
        );
    if let Some(help) = help_text(&error.kind) {
        builder.set_help(help);
    }
    write_report(builder.finish(), source)
}

/// Render an infinite-size type, labelling the declaration of every type
/// on the cycle.
pub fn render_cycle(cycle: &RecursionCycle, source: &str) -> String {
    let config = Config::default().with_color(false);
    let nodes = &cycle.path[cycle.start_index.min(cycle.path.len())..];
    let primary = nodes
        .first()
        .map(|n| clamp(n.span.range(), source.len()))
        .unwrap_or(0..0);
    let mut builder = Report::build(ReportKind::Error, primary)
        .with_code(RECURSIVE_TYPE_CODE)
        .with_message(format!("infinite-size value type: {}", cycle.path_string()))
        .with_config(config);
    for pair in nodes.windows(2) {
        let (node, next) = (&pair[0], &pair[1]);
        let via = match &next.field_name {
            Some(field) => format!("field `{field}` stores `{}` inline", next.type_name),
            None => "part of the cycle".to_string(),
        };
        builder.add_label(
            Label::new(clamp(node.span.range(), source.len()))
                .with_message(via)
                .with_color(Color::Red),
        );
    }
    builder.set_help("break the cycle with `ref`, `ptr` or `weakref`");
    write_report(builder.finish(), source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefId;
    use crate::recursive::CycleNode;
    use kestrel_common::{LineIndex, Span};

    #[test]
    fn mismatch_report_has_code_message_and_label() {
        let src = "let flag: Bool = 42\n";
        let err = SemanticError::new(
            SemanticErrorKind::mismatch("Bool", "Int"),
            "main.kes",
            Span::new(17, 19),
            &LineIndex::new(src),
        );
        let out = render_diagnostic(&err, src);
        assert!(out.contains("[E0001]"), "{out}");
        assert!(out.contains("Type mismatch: expected Bool, got Int"), "{out}");
        assert!(out.contains("expected Bool, found Int"), "{out}");
    }

    #[test]
    fn immutable_assignment_suggests_mut() {
        let src = "let x = 1\nx = 2\n";
        let err = SemanticError::new(
            SemanticErrorKind::AssignToImmutable { name: "x".into() },
            "main.kes",
            Span::new(10, 15),
            &LineIndex::new(src),
        );
        let out = render_diagnostic(&err, src);
        assert!(out.contains("E0012"));
        assert!(out.contains("let mut x"), "{out}");
    }

    #[test]
    fn codes_are_unique() {
        let kinds = [
            SemanticErrorKind::mismatch("A", "B"),
            SemanticErrorKind::UndefinedVariable { name: "x".into() },
            SemanticErrorKind::InvalidNode,
            SemanticErrorKind::VariableMoved { name: "x".into() },
            SemanticErrorKind::generic("boom"),
        ];
        let mut codes: Vec<&str> = kinds.iter().map(error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn cycle_report_labels_every_member() {
        let src = "struct A { b B }\nstruct B { a A }\n";
        let node = |id: u32, name: &str, field: Option<&str>, span: Span| CycleNode {
            def: DefId(id),
            type_name: name.into(),
            field_name: field.map(str::to_string),
            span,
        };
        let cycle = RecursionCycle {
            path: vec![
                node(0, "A", None, Span::new(0, 16)),
                node(1, "B", Some("b"), Span::new(17, 33)),
                node(0, "A", Some("a"), Span::new(0, 16)),
            ],
            start_index: 0,
        };
        let out = render_cycle(&cycle, src);
        assert!(out.contains("[E0017]"), "{out}");
        assert!(out.contains("infinite-size value type: A -> B -> A"), "{out}");
        assert!(out.contains("field `b` stores `B` inline"), "{out}");
        assert!(out.contains("field `a` stores `A` inline"), "{out}");
    }
}
