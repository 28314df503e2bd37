//! Tests for located errors and their rendering.
//!
//! Each test triggers one error in a module with real source text, then
//! checks the one-line form, the ariadne rendering and the serialized shape
//! that tooling consumes.

use kestrel_ast::build::*;
use kestrel_ast::{Item, SourceModule};
use kestrel_sema::diagnostics::{error_code, render_cycle, render_diagnostic, RECURSIVE_TYPE_CODE};
use kestrel_sema::{check, find_recursive_types, SemaConfig, SemanticError, SemanticErrorKind};

// ── Helpers ────────────────────────────────────────────────────────────

const SOURCE: &str = "fn main() Void {\n  let x = ghost\n}\n";

/// `main.kes` holding `SOURCE`, with `ghost` spanning bytes 27..32.
fn ghost_module() -> SourceModule {
    let main = func(
        "main",
        vec![],
        ty("Void"),
        block(vec![let_("x", at(ident("ghost"), 27, 32))], None),
    );
    SourceModule {
        source: SOURCE.to_string(),
        ..module("", vec![Item::Function(main)])
    }
}

fn first_error(modules: Vec<SourceModule>) -> SemanticError {
    match check(&program(modules), &SemaConfig::default()) {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}

fn error_of(items: Vec<Item>) -> SemanticError {
    first_error(vec![module("", items)])
}

// ── Location ───────────────────────────────────────────────────────────

#[test]
fn error_carries_file_line_and_column() {
    let err = first_error(vec![ghost_module()]);
    assert_eq!(err.file_name, "main.kes");
    assert_eq!((err.line, err.column), (2, 11));
    insta::assert_snapshot!(err.to_string(), @"main.kes:2:11: Undefined variable: ghost");
}

/// An error is located in the file of the module it was found in.
#[test]
fn error_in_second_module() {
    let err = first_error(vec![
        module("lib", vec![struct_decl("Point", vec![field("x", ty("Int"))])]),
        module("app", vec![struct_decl("Bad", vec![field("p", ty("Missing"))])]),
    ]);
    assert_eq!(err.file_name, "app.kes");
    assert_eq!(err.kind, SemanticErrorKind::UndefinedType { name: "Missing".into() });
}

#[test]
fn serialized_shape() {
    let err = first_error(vec![ghost_module()]);
    let value = serde_json::to_value(&err).expect("serialize");
    assert_eq!(
        value,
        serde_json::json!({
            "kind": { "kind": "undefined_variable", "name": "ghost" },
            "file_name": "main.kes",
            "line": 2,
            "column": 11,
            "span": { "start": 27, "end": 32 },
        })
    );
}

// ── Rendering ──────────────────────────────────────────────────────────

#[test]
fn rendered_diagnostic_names_code_and_label() {
    let err = first_error(vec![ghost_module()]);
    let output = render_diagnostic(&err, SOURCE);
    assert!(output.contains("E0002"), "{output}");
    assert!(output.contains("Undefined variable: ghost"), "{output}");
    assert!(output.contains("not found in this scope"), "{output}");
    assert!(output.contains("let x = ghost"), "{output}");
}

#[test]
fn rendered_diagnostic_includes_help() {
    let main = func(
        "main",
        vec![],
        ty("Void"),
        block(vec![let_("n", int(1)), assign(ident("n"), int(2))], None),
    );
    let err = error_of(vec![Item::Function(main)]);
    let output = render_diagnostic(&err, "let n = 1\nn = 2\n");
    assert!(output.contains("E0012"), "{output}");
    assert!(output.contains("let mut n"), "{output}");
}

#[test]
fn rendered_cycle_labels_each_field() {
    let cycles = find_recursive_types(
        &program(vec![module(
            "",
            vec![
                struct_decl("A", vec![field("b", ty("B"))]),
                struct_decl("B", vec![field("a", ty("A"))]),
            ],
        )]),
        &SemaConfig::default(),
    )
    .expect("declarations are valid");
    let output = render_cycle(&cycles[0], "struct A { b B }\nstruct B { a A }\n");
    assert!(output.contains(RECURSIVE_TYPE_CODE), "{output}");
    assert!(output.contains("A -> B -> A"), "{output}");
    assert!(output.contains("field `b` stores `B` inline"), "{output}");
}

// ── Value Types ────────────────────────────────────────────────────────

#[test]
fn value_type_rejects_reference_field() {
    let err = error_of(vec![value_struct("V", vec![field("r", ref_ty(ty("Int")))])]);
    assert_eq!(
        err.kind,
        SemanticErrorKind::InvalidFieldTypeInValueType {
            ty: "V".into(),
            field: "r".into(),
            field_ty: "Int ref".into(),
        }
    );
    assert_eq!(error_code(&err.kind), "E0010");
}

/// A reference nested in a generic argument is still stored inline.
#[test]
fn value_type_rejects_reference_in_generic_argument() {
    let boxed = generic_struct("Box", vec![type_param("T", vec![])], vec![field("value", ty("T"))]);
    let err = error_of(vec![
        boxed,
        value_struct("V", vec![field("b", generic("Box", vec![ref_ty(ty("Int"))]))]),
    ]);
    assert_eq!(
        err.kind,
        SemanticErrorKind::InvalidFieldTypeInValueType {
            ty: "V".into(),
            field: "b".into(),
            field_ty: "Box[Int ref]".into(),
        }
    );
}

#[test]
fn value_type_rejects_mutable_field() {
    let err = error_of(vec![value_struct("V", vec![field_mut("n", ty("Int"))])]);
    insta::assert_snapshot!(err.kind.to_string(), @"Value type 'V' cannot have mutable field 'n'");
}

#[test]
fn duplicate_field() {
    let err = error_of(vec![struct_decl("S", vec![field("a", ty("Int")), field("a", ty("Bool"))])]);
    assert_eq!(err.kind, SemanticErrorKind::DuplicateDefinition { name: "S.a".into() });
}

#[test]
fn undefined_type_in_signature() {
    let f = func("f", vec![param("x", ty("Nope"))], ty("Void"), block(vec![], None));
    let err = error_of(vec![Item::Function(f)]);
    assert_eq!(err.kind, SemanticErrorKind::UndefinedType { name: "Nope".into() });
}

/// Checking stops at the first error even when later items are also wrong.
#[test]
fn first_error_wins() {
    let a = func("a", vec![], ty("Int"), block(vec![], Some(ident("missing_a"))));
    let b = func("b", vec![], ty("Int"), block(vec![], Some(ident("missing_b"))));
    let err = error_of(vec![Item::Function(a), Item::Function(b)]);
    assert_eq!(err.kind, SemanticErrorKind::UndefinedVariable { name: "missing_a".into() });
}
