//! Integration tests for where `given` declarations may live.
//!
//! The fixture spreads one program over three modules: `geo` declares the
//! `Circle` type, `fmt` declares the `Show` trait and `app` uses both.

use kestrel_ast::build::*;
use kestrel_ast::{FunctionDecl, Item, SourceModule};
use kestrel_sema::{check, SemaConfig, SemanticError, SemanticErrorKind, TypeCheckerOutput};

// ── Helpers ────────────────────────────────────────────────────────────

fn check_modules(modules: Vec<SourceModule>) -> Result<TypeCheckerOutput, SemanticError> {
    check(&program(modules), &SemaConfig::default())
}

fn geo() -> SourceModule {
    module("geo", vec![struct_decl("Circle", vec![field("r", ty("Int"))])])
}

fn fmt(extra: Vec<Item>) -> SourceModule {
    let mut items = vec![trait_decl(
        "Show",
        vec![],
        vec![trait_method("show", vec![self_ref_param()], ty("Int"))],
    )];
    items.extend(extra);
    module("fmt", items)
}

fn show_method() -> FunctionDecl {
    func(
        "show",
        vec![self_ref_param()],
        ty("Int"),
        block(vec![], Some(member(ident("self"), "r"))),
    )
}

fn circle_shows() -> Item {
    given_conformance(ty("Circle"), trait_ref("Show", vec![]), vec![show_method()])
}

fn area_given() -> Item {
    given(
        ty("Circle"),
        vec![func("area", vec![self_ref_param()], ty("Int"), block(vec![], Some(int(0))))],
    )
}

fn locality_message(err: SemanticError) -> String {
    match err.kind {
        SemanticErrorKind::GivenLocality { message } => message,
        other => panic!("expected a locality error, got: {other}"),
    }
}

// ── Conformances ───────────────────────────────────────────────────────

#[test]
fn conformance_in_type_module() {
    let mut geo = geo();
    geo.items.push(circle_shows());
    assert!(check_modules(vec![geo, fmt(vec![])]).is_ok());
}

#[test]
fn conformance_in_trait_module() {
    assert!(check_modules(vec![geo(), fmt(vec![circle_shows()])]).is_ok());
}

#[test]
fn conformance_in_third_module_is_rejected() {
    let err = check_modules(vec![geo(), fmt(vec![]), module("app", vec![circle_shows()])]).unwrap_err();
    assert_eq!(err.file_name, "app.kes");
    assert_eq!(
        locality_message(err),
        "Cannot declare 'given Circle: Show' in module 'app': declaration must be in type module 'geo' or trait module 'fmt'"
    );
}

// ── Bare Givens ────────────────────────────────────────────────────────

#[test]
fn bare_given_in_type_module() {
    let mut geo = geo();
    geo.items.push(area_given());
    assert!(check_modules(vec![geo]).is_ok());
}

#[test]
fn bare_given_elsewhere_is_rejected() {
    let err = check_modules(vec![geo(), module("app", vec![area_given()])]).unwrap_err();
    assert_eq!(
        locality_message(err),
        "Cannot declare 'given Circle' in module 'app': type is declared in 'geo'"
    );
}

/// Builtin scalars belong to the standard module.
#[test]
fn builtin_types_belong_to_std() {
    let extend_int = given(
        ty("Int"),
        vec![func("double", vec![self_param()], ty("Int"), block(vec![], Some(int(0))))],
    );
    let err = check_modules(vec![module("app", vec![extend_int.clone()])]).unwrap_err();
    assert_eq!(
        locality_message(err),
        "Cannot declare 'given Int' in module 'app': type is declared in 'std'"
    );

    assert!(check_modules(vec![module("std", vec![extend_int])]).is_ok());
}

#[test]
fn trait_extension_belongs_to_trait_module() {
    let twice = || func("twice", vec![self_ref_param()], ty("Int"), block(vec![], Some(int(2))));
    let err = check_modules(vec![fmt(vec![]), module("app", vec![given(ty("Show"), vec![twice()])])]).unwrap_err();
    assert_eq!(
        locality_message(err),
        "Cannot declare 'given Show' in module 'app': trait is declared in 'fmt'"
    );

    assert!(check_modules(vec![fmt(vec![given(ty("Show"), vec![twice()])])]).is_ok());
}

/// Modules share a single namespace for types.
#[test]
fn type_names_are_program_wide() {
    let err = check_modules(vec![
        geo(),
        module("app", vec![struct_decl("Circle", vec![field("d", ty("Int"))])]),
    ])
    .unwrap_err();
    assert_eq!(
        err.kind,
        SemanticErrorKind::DuplicateTypeDefinition {
            name: "Circle".into()
        }
    );
}

#[test]
fn types_resolve_across_modules() {
    let make = func(
        "make",
        vec![],
        ty("Circle"),
        block(vec![], Some(call("Circle", vec![int(1)]))),
    );
    assert!(check_modules(vec![geo(), module("app", vec![Item::Function(make)])]).is_ok());
}
