//! Integration tests for generic functions and types and the
//! instantiation requests they produce.

use kestrel_ast::build::*;
use kestrel_ast::{Item, Stmt};
use kestrel_sema::instantiation::InstantiationKind;
use kestrel_sema::typed::{TemplateKind, TypedExprKind, TypedItem, TypedStmt};
use kestrel_sema::{
    check, GenericCopyPolicy, ResolvedTy, SemaConfig, SemanticError, SemanticErrorKind, TypeCheckerOutput,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn check_with(items: Vec<Item>, config: &SemaConfig) -> Result<TypeCheckerOutput, SemanticError> {
    check(&program(vec![module("", items)]), config)
}

fn expect_ok(items: Vec<Item>) -> TypeCheckerOutput {
    match check_with(items, &SemaConfig::default()) {
        Ok(output) => output,
        Err(e) => panic!("expected success, got: {e}"),
    }
}

fn expect_error(items: Vec<Item>) -> SemanticErrorKind {
    match check_with(items, &SemaConfig::default()) {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.kind,
    }
}

fn main_fn(stmts: Vec<Stmt>) -> Item {
    Item::Function(func("main", vec![], ty("Void"), block(stmts, None)))
}

/// `fn id[T](x T) T { x }`
fn id_fn() -> Item {
    Item::Function(generic_func(
        "id",
        vec![type_param("T", vec![])],
        vec![param("x", ty("T"))],
        ty("T"),
        block(vec![], Some(ident("x"))),
    ))
}

/// `struct Box[T] { value T }`
fn box_struct() -> Item {
    generic_struct("Box", vec![type_param("T", vec![])], vec![field("value", ty("T"))])
}

/// `union Option[T] { Some(value T), None }`
fn option_union() -> Item {
    generic_union(
        "Option",
        vec![type_param("T", vec![])],
        vec![case("Some", vec![field("value", ty("T"))]), case("None", vec![])],
    )
}

fn request_strings(output: &TypeCheckerOutput) -> Vec<String> {
    output.instantiation_requests.iter().map(ToString::to_string).collect()
}

fn let_type(output: &TypeCheckerOutput, function: &str, binding: &str) -> ResolvedTy {
    let f = output.program.function(function).expect("function");
    let TypedExprKind::Block { stmts, .. } = &f.body.kind else {
        panic!("not a block");
    };
    stmts
        .iter()
        .find_map(|s| match s {
            TypedStmt::Let { name, value, .. } if name == binding => Some(value.ty.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no binding {binding}"))
}

// ── Generic Functions ──────────────────────────────────────────────────

/// Each distinct argument list is requested once, in first-seen order.
#[test]
fn generic_function_requests_are_deduplicated() {
    let output = expect_ok(vec![
        id_fn(),
        main_fn(vec![
            let_("a", call("id", vec![int(5)])),
            let_("b", call("id", vec![boolean(true)])),
            let_("c", call("id", vec![int(6)])),
        ]),
    ]);
    assert_eq!(request_strings(&output), vec!["id[Int]", "id[Bool]"]);
    assert_eq!(let_type(&output, "main", "a"), ResolvedTy::Int);
    assert_eq!(let_type(&output, "main", "b"), ResolvedTy::Bool);
    assert!(output
        .requests_for("id")
        .all(|r| r.kind == InstantiationKind::Function));
}

#[test]
fn explicit_type_arguments() {
    let output = expect_ok(vec![
        id_fn(),
        main_fn(vec![let_("a", call_with("id", vec![ty("Int64")], vec![int(5)]))]),
    ]);
    assert_eq!(let_type(&output, "main", "a"), ResolvedTy::Int64);
    assert_eq!(request_strings(&output), vec!["id[Int64]"]);
}

#[test]
fn explicit_type_argument_must_match_argument() {
    let kind = expect_error(vec![
        id_fn(),
        main_fn(vec![let_("a", call_with("id", vec![ty("Bool")], vec![int(5)]))]),
    ]);
    assert!(matches!(kind, SemanticErrorKind::TypeMismatch { .. }));
}

#[test]
fn type_arguments_on_plain_function_are_rejected() {
    let plain = func("plain", vec![], ty("Void"), block(vec![], None));
    let kind = expect_error(vec![
        Item::Function(plain),
        main_fn(vec![stmt(call_with("plain", vec![ty("Int")], vec![]))]),
    ]);
    assert!(matches!(kind, SemanticErrorKind::Generic { message } if message.contains("take type arguments")));
}

/// The declaration is registered as a template and its body is still
/// checked against its own parameters.
#[test]
fn generic_function_is_a_template() {
    let output = expect_ok(vec![id_fn()]);
    assert!(output.generic_templates.function_templates.contains_key("id"));
    assert!(output.program.items().any(|item| matches!(
        item,
        TypedItem::Template { name, kind: TemplateKind::Function } if name == "id"
    )));
    assert!(output.instantiation_requests.is_empty());
}

#[test]
fn generic_body_is_checked() {
    let bad = generic_func(
        "bad",
        vec![type_param("T", vec![])],
        vec![param("x", ty("T"))],
        ty("Int"),
        block(vec![], Some(ident("x"))),
    );
    let kind = expect_error(vec![Item::Function(bad)]);
    assert!(matches!(kind, SemanticErrorKind::TypeMismatch { .. }));
}

/// Uses inside a template body are left to the template's own
/// specialization.
#[test]
fn requests_inside_templates_are_not_recorded() {
    let wrap = generic_func(
        "wrap",
        vec![type_param("T", vec![])],
        vec![param("x", ty("T"))],
        generic("Box", vec![ty("T")]),
        block(vec![], Some(call("Box", vec![ident("x")]))),
    );
    let output = expect_ok(vec![
        box_struct(),
        Item::Function(wrap),
        main_fn(vec![let_("w", call("wrap", vec![int(1)]))]),
    ]);
    assert!(output.requests_for("wrap").any(|r| r.args == vec![ResolvedTy::Int]));
    assert!(output
        .instantiation_requests
        .iter()
        .all(|r| !r.args.iter().any(ResolvedTy::contains_generic_param)));
}

#[test]
fn generic_function_must_be_called() {
    let kind = expect_error(vec![id_fn(), main_fn(vec![let_("f", ident("id"))])]);
    assert!(matches!(kind, SemanticErrorKind::Generic { message } if message.contains("must be called")));
}

// ── Generic Types ──────────────────────────────────────────────────────

#[test]
fn generic_struct_construction_and_member() {
    let output = expect_ok(vec![
        box_struct(),
        main_fn(vec![
            let_("b", call("Box", vec![int(5)])),
            let_("v", member(ident("b"), "value")),
        ]),
    ]);
    assert!(matches!(
        let_type(&output, "main", "b"),
        ResolvedTy::GenericStruct { name, args, .. } if name == "Box" && args == vec![ResolvedTy::Int]
    ));
    assert_eq!(let_type(&output, "main", "v"), ResolvedTy::Int);
    assert_eq!(request_strings(&output), vec!["Box[Int]"]);
    assert!(output.generic_templates.struct_templates.contains_key("Box"));
}

#[test]
fn annotations_request_their_instances() {
    let output = expect_ok(vec![
        box_struct(),
        main_fn(vec![let_typed(
            "b",
            generic("Box", vec![ty("Bool")]),
            call("Box", vec![boolean(true)]),
        )]),
    ]);
    assert_eq!(request_strings(&output), vec!["Box[Bool]"]);
}

#[test]
fn generic_struct_argument_mismatch() {
    let kind = expect_error(vec![
        box_struct(),
        main_fn(vec![let_typed(
            "b",
            generic("Box", vec![ty("Bool")]),
            call("Box", vec![int(1)]),
        )]),
    ]);
    assert!(matches!(kind, SemanticErrorKind::TypeMismatch { .. }));
}

#[test]
fn generic_union_case_infers_arguments() {
    let output = expect_ok(vec![
        option_union(),
        main_fn(vec![let_("o", union_case(ty("Option"), "Some", vec![int(5)]))]),
    ]);
    assert!(matches!(
        let_type(&output, "main", "o"),
        ResolvedTy::GenericUnion { name, args, .. } if name == "Option" && args == vec![ResolvedTy::Int]
    ));
    let kinds: Vec<_> = output.requests_for("Option").map(|r| r.kind.clone()).collect();
    assert_eq!(kinds, vec![InstantiationKind::Union]);
}

/// A payload-free case says nothing about the arguments.
#[test]
fn bare_union_case_needs_annotation() {
    let kind = expect_error(vec![
        option_union(),
        main_fn(vec![let_("o", union_case(ty("Option"), "None", vec![]))]),
    ]);
    assert!(matches!(kind, SemanticErrorKind::Generic { message } if message.contains("Cannot infer")));

    let output = expect_ok(vec![
        option_union(),
        main_fn(vec![let_typed(
            "o",
            generic("Option", vec![ty("Int")]),
            union_case(ty("Option"), "None", vec![]),
        )]),
    ]);
    assert_eq!(request_strings(&output), vec!["Option[Int]"]);
}

#[test]
fn unknown_union_case() {
    let kind = expect_error(vec![
        option_union(),
        main_fn(vec![let_("o", union_case(ty("Option"), "Many", vec![int(1)]))]),
    ]);
    assert!(matches!(kind, SemanticErrorKind::UndefinedMember { member, .. } if member == "Many"));
}

// ── Generic Givens ─────────────────────────────────────────────────────

/// Calling a method of `given[T] Box[T]` requests the method specialized
/// with the receiver's arguments.
#[test]
fn generic_given_method_request() {
    let get = func(
        "get",
        vec![self_ref_param()],
        ty("T"),
        block(vec![], Some(member(ident("self"), "value"))),
    );
    let output = expect_ok(vec![
        box_struct(),
        generic_given(
            vec![type_param("T", vec![])],
            generic("Box", vec![ty("T")]),
            None,
            vec![get],
        ),
        main_fn(vec![
            let_("b", call("Box", vec![int(5)])),
            let_("v", method(ident("b"), "get", vec![])),
        ]),
    ]);
    assert_eq!(let_type(&output, "main", "v"), ResolvedTy::Int);
    assert!(request_strings(&output).contains(&"Box.get[Int]".to_string()));
    assert!(output.generic_templates.extension_method("Box", "get").is_some());
}

#[test]
fn generic_given_must_use_own_parameters() {
    let kind = expect_error(vec![
        box_struct(),
        generic_given(vec![], generic("Box", vec![ty("Int")]), None, vec![]),
    ]);
    assert!(matches!(kind, SemanticErrorKind::Generic { message } if message.contains("distinct type parameters")));
}

// ── Copy Policy ────────────────────────────────────────────────────────

/// `fn dup[T](x T) Void { let a = x; let b = x }`
fn dup_fn() -> Item {
    Item::Function(generic_func(
        "dup",
        vec![type_param("T", vec![])],
        vec![param("x", ty("T"))],
        ty("Void"),
        block(vec![let_("a", ident("x")), let_("b", ident("x"))], None),
    ))
}

#[test]
fn generic_values_copy_by_default() {
    assert!(check_with(vec![dup_fn()], &SemaConfig::default()).is_ok());
}

#[test]
fn generic_values_move_when_configured() {
    let config = SemaConfig {
        generic_copy_policy: GenericCopyPolicy::AssumeMove,
        ..SemaConfig::default()
    };
    let err = check_with(vec![dup_fn()], &config).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::VariableMoved { name: "x".into() });
}
