//! Integration tests for `match` expressions: pattern typing, bindings,
//! coverage and moves across arms.

use kestrel_ast::build::*;
use kestrel_ast::{Item, Stmt};
use kestrel_sema::typed::{TypedExprKind, TypedPattern, TypedStmt};
use kestrel_sema::{check, ResolvedTy, SemaConfig, SemanticError, SemanticErrorKind, TypeCheckerOutput};

// ── Helpers ────────────────────────────────────────────────────────────

fn check_items(items: Vec<Item>) -> Result<TypeCheckerOutput, SemanticError> {
    check(&program(vec![module("", items)]), &SemaConfig::default())
}

/// `fn main() Void { stmts }`
fn main_fn(stmts: Vec<Stmt>) -> Item {
    Item::Function(func("main", vec![], ty("Void"), block(stmts, None)))
}

fn expect_ok(items: Vec<Item>) -> TypeCheckerOutput {
    match check_items(items) {
        Ok(output) => output,
        Err(e) => panic!("expected success, got: {e}"),
    }
}

fn expect_error(items: Vec<Item>) -> SemanticErrorKind {
    match check_items(items) {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.kind,
    }
}

/// `union Shape { Circle(r Int), Point }`
fn shape_union() -> Item {
    union_decl(
        "Shape",
        vec![case("Circle", vec![field("r", ty("Int"))]), case("Point", vec![])],
    )
}

/// `union Option[T] { Some(value T), None }`
fn option_union() -> Item {
    generic_union(
        "Option",
        vec![type_param("T", vec![])],
        vec![case("Some", vec![field("value", ty("T"))]), case("None", vec![])],
    )
}

fn circle(r: i64) -> Stmt {
    let_("s", union_case(ty("Shape"), "Circle", vec![int(r)]))
}

fn data_struct() -> Item {
    struct_decl("Data", vec![field("v", ty("Int"))])
}

/// `fn take(d Data) Void {}`
fn take_fn() -> Item {
    Item::Function(func("take", vec![param("d", ty("Data"))], ty("Void"), block(vec![], None)))
}

/// The `let` value `name` in `main`.
fn main_let(output: &TypeCheckerOutput, name: &str) -> (ResolvedTy, TypedExprKind<ResolvedTy>) {
    let f = output.program.function("main").expect("main is typed");
    let TypedExprKind::Block { stmts, .. } = &f.body.kind else {
        panic!("body of main is not a block");
    };
    stmts
        .iter()
        .find_map(|s| match s {
            TypedStmt::Let { name: n, value, .. } if n == name => Some((value.ty.clone(), value.kind.clone())),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no let {name}"))
}

// ── Typing ─────────────────────────────────────────────────────────────

#[test]
fn case_pattern_binds_payload() {
    let output = expect_ok(vec![
        shape_union(),
        main_fn(vec![
            circle(2),
            let_(
                "n",
                match_expr(
                    ident("s"),
                    vec![
                        arm(pat_case("Circle", vec![pat_bind("r")]), ident("r")),
                        arm(pat_case("Point", vec![]), int(0)),
                    ],
                ),
            ),
        ]),
    ]);
    let (ty, kind) = main_let(&output, "n");
    assert_eq!(ty, ResolvedTy::Int);
    let TypedExprKind::Match { arms, .. } = kind else {
        panic!("expected a match");
    };
    assert_eq!(arms[0].pattern.bindings(), vec!["r"]);
    assert!(matches!(&arms[1].pattern, TypedPattern::Case { name, tag: 1, .. } if name == "Point"));
}

/// The payload type of a generic union follows the subject's arguments.
#[test]
fn generic_payload_is_substituted() {
    let output = expect_ok(vec![
        option_union(),
        main_fn(vec![
            let_("o", union_case(ty("Option"), "Some", vec![boolean(true)])),
            let_(
                "b",
                match_expr(
                    ident("o"),
                    vec![
                        arm(pat_case("Some", vec![pat_bind("v")]), ident("v")),
                        arm(pat_case("None", vec![]), boolean(false)),
                    ],
                ),
            ),
        ]),
    ]);
    assert_eq!(main_let(&output, "b").0, ResolvedTy::Bool);
}

#[test]
fn arms_must_agree_on_a_type() {
    let err = expect_error(vec![main_fn(vec![let_(
        "x",
        match_expr(
            boolean(true),
            vec![arm(pat_bool(true), int(1)), arm(pat_bool(false), string("no"))],
        ),
    )])]);
    assert!(matches!(err, SemanticErrorKind::TypeMismatch { .. }), "{err:?}");
}

#[test]
fn case_pattern_on_non_union() {
    let err = expect_error(vec![main_fn(vec![
        let_typed("n", ty("Int"), int(1)),
        stmt(match_expr(ident("n"), vec![arm(pat_case("Point", vec![]), int(0))])),
    ])]);
    assert_eq!(err, SemanticErrorKind::mismatch("union type", "Int"));
}

#[test]
fn unknown_case_and_wrong_arity() {
    let unknown = expect_error(vec![
        shape_union(),
        main_fn(vec![
            circle(1),
            stmt(match_expr(ident("s"), vec![arm(pat_case("Square", vec![]), int(0))])),
        ]),
    ]);
    assert_eq!(
        unknown,
        SemanticErrorKind::UndefinedMember {
            member: "Square".into(),
            ty: "Shape".into(),
        }
    );

    let arity = expect_error(vec![
        shape_union(),
        main_fn(vec![
            circle(1),
            stmt(match_expr(ident("s"), vec![arm(pat_case("Circle", vec![]), int(0))])),
        ]),
    ]);
    assert_eq!(
        arity,
        SemanticErrorKind::InvalidArgumentCount {
            function: "Shape.Circle".into(),
            expected: 1,
            got: 0,
        }
    );
}

#[test]
fn or_alternatives_bind_the_same_names() {
    let pair = union_decl(
        "Pair",
        vec![case("A", vec![field("x", ty("Int"))]), case("B", vec![field("y", ty("Int"))])],
    );
    let err = expect_error(vec![
        pair,
        main_fn(vec![
            let_("p", union_case(ty("Pair"), "A", vec![int(1)])),
            stmt(match_expr(
                ident("p"),
                vec![arm(
                    pat_or(vec![pat_case("A", vec![pat_bind("x")]), pat_case("B", vec![pat_bind("y")])]),
                    int(0),
                )],
            )),
        ]),
    ]);
    insta::assert_snapshot!(err.to_string(), @"Or pattern alternatives must bind the same variables: {x} and {y}");
}

#[test]
fn negative_literal_against_unsigned() {
    let err = expect_error(vec![main_fn(vec![
        let_typed("u", ty("UInt"), int(1)),
        stmt(match_expr(ident("u"), vec![arm(pat_int(-1), int(0)), arm(pat_wild(), int(1))])),
    ])]);
    insta::assert_snapshot!(err.to_string(), @"Negative integer literal cannot match unsigned type");
}

// ── Coverage ───────────────────────────────────────────────────────────

#[test]
fn missing_case_is_named() {
    let err = expect_error(vec![
        shape_union(),
        main_fn(vec![
            circle(1),
            stmt(match_expr(ident("s"), vec![arm(pat_case("Circle", vec![pat_wild()]), int(1))])),
        ]),
    ]);
    insta::assert_snapshot!(err.to_string(), @"Non-exhaustive match on type 'Shape': missing cases .Point");
}

#[test]
fn bool_needs_both_values() {
    let err = expect_error(vec![main_fn(vec![stmt(match_expr(
        boolean(true),
        vec![arm(pat_bool(true), int(1))],
    ))])]);
    insta::assert_snapshot!(err.to_string(), @"Non-exhaustive match on type 'Bool': missing cases false");
}

#[test]
fn integers_need_a_catchall() {
    let err = expect_error(vec![main_fn(vec![
        let_typed("n", ty("Int"), int(3)),
        stmt(match_expr(
            ident("n"),
            vec![arm(pat_int(1), boolean(true)), arm(pat_int(2), boolean(false))],
        )),
    ])]);
    insta::assert_snapshot!(err.to_string(), @"Match on type 'Int' requires a wildcard or variable binding pattern");
}

/// Coverage looks inside case payloads.
#[test]
fn nested_gap_is_reported() {
    let err = expect_error(vec![
        shape_union(),
        option_union(),
        main_fn(vec![
            let_(
                "o",
                union_case(ty("Option"), "Some", vec![union_case(ty("Shape"), "Point", vec![])]),
            ),
            stmt(match_expr(
                ident("o"),
                vec![
                    arm(pat_case("Some", vec![pat_case("Circle", vec![pat_wild()])]), int(1)),
                    arm(pat_case("None", vec![]), int(0)),
                ],
            )),
        ]),
    ]);
    insta::assert_snapshot!(err.to_string(), @"Non-exhaustive match on type 'Option[Shape]': missing cases .Some(.Point)");
}

#[test]
fn or_pattern_covers_both_cases() {
    expect_ok(vec![
        shape_union(),
        main_fn(vec![
            circle(1),
            stmt(match_expr(
                ident("s"),
                vec![arm(pat_or(vec![pat_case("Circle", vec![pat_wild()]), pat_case("Point", vec![])]), int(0))],
            )),
        ]),
    ]);
}

#[test]
fn arm_after_catchall_is_unreachable() {
    let err = expect_error(vec![
        shape_union(),
        main_fn(vec![
            circle(1),
            stmt(match_expr(
                ident("s"),
                vec![arm(pat_bind("x"), int(1)), arm(pat_case("Point", vec![]), int(2))],
            )),
        ]),
    ]);
    insta::assert_snapshot!(err.to_string(), @"Unreachable pattern '.Point': already covered by 'x' at position 1");
}

#[test]
fn repeated_case_is_unreachable() {
    let err = expect_error(vec![
        shape_union(),
        main_fn(vec![
            circle(1),
            stmt(match_expr(
                ident("s"),
                vec![
                    arm(pat_case("Point", vec![]), int(1)),
                    arm(pat_case("Circle", vec![pat_wild()]), int(2)),
                    arm(pat_case("Point", vec![]), int(3)),
                ],
            )),
        ]),
    ]);
    insta::assert_snapshot!(err.to_string(), @"Unreachable pattern '.Point': already covered by earlier patterns");
}

#[test]
fn duplicate_binding_in_one_pattern() {
    let pair = union_decl("Two", vec![case("Both", vec![field("a", ty("Int")), field("b", ty("Int"))])]);
    let err = expect_error(vec![
        pair,
        main_fn(vec![
            let_("t", union_case(ty("Two"), "Both", vec![int(1), int(2)])),
            stmt(match_expr(
                ident("t"),
                vec![arm(pat_case("Both", vec![pat_bind("x"), pat_bind("x")]), int(0))],
            )),
        ]),
    ]);
    insta::assert_snapshot!(err.to_string(), @"Variable 'x' is bound more than once in the same pattern");
}

// ── Moves ──────────────────────────────────────────────────────────────

#[test]
fn arms_move_independently() {
    expect_ok(vec![
        data_struct(),
        take_fn(),
        main_fn(vec![
            let_("d", call("Data", vec![int(1)])),
            stmt(match_expr(
                boolean(true),
                vec![
                    arm(pat_bool(true), call("take", vec![ident("d")])),
                    arm(pat_bool(false), call("take", vec![ident("d")])),
                ],
            )),
        ]),
    ]);
}

#[test]
fn move_in_an_arm_is_seen_after_the_match() {
    let err = expect_error(vec![
        data_struct(),
        take_fn(),
        main_fn(vec![
            let_("d", call("Data", vec![int(1)])),
            stmt(match_expr(
                boolean(true),
                vec![
                    arm(pat_bool(true), call("take", vec![ident("d")])),
                    arm(pat_wild(), block(vec![], None)),
                ],
            )),
            stmt(call("take", vec![ident("d")])),
        ]),
    ]);
    assert_eq!(err, SemanticErrorKind::VariableMoved { name: "d".into() });
}

#[test]
fn diverging_arm_moves_do_not_escape() {
    expect_ok(vec![
        data_struct(),
        take_fn(),
        main_fn(vec![
            let_("d", call("Data", vec![int(1)])),
            stmt(match_expr(
                boolean(true),
                vec![
                    arm(
                        pat_bool(true),
                        block(vec![stmt(call("take", vec![ident("d")])), ret(None)], None),
                    ),
                    arm(pat_bool(false), block(vec![], None)),
                ],
            )),
            stmt(call("take", vec![ident("d")])),
        ]),
    ]);
}

/// Binding a payload takes the subject by value.
#[test]
fn binding_a_payload_moves_the_subject() {
    let wrap = union_decl("Wrap", vec![case("Has", vec![field("d", ty("Data"))])]);
    let err = expect_error(vec![
        data_struct(),
        wrap,
        take_fn(),
        main_fn(vec![
            let_("w", union_case(ty("Wrap"), "Has", vec![call("Data", vec![int(1)])])),
            stmt(match_expr(
                ident("w"),
                vec![arm(pat_case("Has", vec![pat_bind("d")]), call("take", vec![ident("d")]))],
            )),
            let_("again", ident("w")),
        ]),
    ]);
    assert_eq!(err, SemanticErrorKind::VariableMoved { name: "w".into() });
}
