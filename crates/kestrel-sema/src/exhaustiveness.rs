//! Exhaustiveness and redundancy of `match` arms.
//!
//! Maranget's usefulness predicate from "Warnings for Pattern Matching"
//! (2007), run over an abstract pattern form rather than the syntax tree.
//! The checker lowers typed patterns to [`Pat`] and describes the subject
//! with a [`TypeInfo`]. A match is exhaustive when `_` is not useful after
//! every arm, and an arm is redundant when it is not useful after the arms
//! before it.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LitKind {
    Int,
    Bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pat {
    /// `_` or a variable binding.
    Wildcard,
    /// A union case with one sub-pattern per parameter.
    Constructor { name: String, args: Vec<Pat> },
    Literal { value: String, ty: LitKind },
    Or { alternatives: Vec<Pat> },
}

impl fmt::Display for Pat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pat::Wildcard => write!(f, "_"),
            Pat::Constructor { name, args } if args.is_empty() => write!(f, ".{name}"),
            Pat::Constructor { name, args } => {
                write!(f, ".{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Pat::Literal { value, .. } => write!(f, "{value}"),
            Pat::Or { alternatives } => {
                for (i, alt) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{alt}")?;
                }
                Ok(())
            }
        }
    }
}

/// One arm's patterns, one per column.
pub type PatternRow = Vec<Pat>;

#[derive(Clone, Debug, Default)]
pub struct PatternMatrix {
    pub rows: Vec<PatternRow>,
}

/// A union case and what each of its parameters holds.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstructorSig {
    pub name: String,
    pub fields: Vec<TypeInfo>,
}

impl ConstructorSig {
    pub fn arity(&self) -> usize {
        self.fields.len()
    }
}

/// What the algorithm needs to know about the type of a column.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeInfo {
    /// A union whose cases are all known.
    SumType { variants: Vec<ConstructorSig> },
    /// Two constructors, `true` and `false`.
    Bool,
    /// Values that cannot be listed: integers, structs, and unions below
    /// the depth any pattern reaches.
    Infinite,
}

static INFINITE: TypeInfo = TypeInfo::Infinite;

/// Returns `None` when `arms` cover every value of the subject, otherwise
/// patterns for the values they miss. For unions and `Bool` there is one
/// pattern per uncovered constructor.
pub fn check_exhaustiveness(arms: &[Pat], scrutinee_type: &TypeInfo) -> Option<Vec<Pat>> {
    let rows = expand_or(&arms.iter().map(|p| vec![p.clone()]).collect::<Vec<_>>());
    let has_catchall = rows.iter().any(|r| matches!(r.first(), Some(Pat::Wildcard)));
    let missing: Vec<Pat> = match all_ctors(scrutinee_type) {
        Some(all) if !has_catchall => all
            .iter()
            .filter_map(|ctor| {
                let fields = ctor_fields(ctor, scrutinee_type, 0);
                let arity = fields.len();
                witness(&specialize(&rows, ctor, arity), &fields).map(|args| rebuild(ctor, args))
            })
            .collect(),
        _ => witness(&rows, std::slice::from_ref(scrutinee_type))
            .into_iter()
            .flatten()
            .collect(),
    };
    (!missing.is_empty()).then_some(missing)
}

/// Indices of the arms that can never match because earlier arms already
/// cover everything they do.
pub fn check_redundancy(arms: &[Pat], scrutinee_type: &TypeInfo) -> Vec<usize> {
    let types = std::slice::from_ref(scrutinee_type);
    let mut matrix = PatternMatrix::default();
    let mut redundant = Vec::new();
    for (i, arm) in arms.iter().enumerate() {
        let row = vec![arm.clone()];
        if !is_useful(&matrix, &row, types) {
            redundant.push(i);
        }
        matrix.rows.push(row);
    }
    redundant
}

/// Algorithm U: whether some value matched by `row` is matched by no row
/// of `matrix`. `type_info` describes the columns; missing entries are
/// treated as [`TypeInfo::Infinite`].
pub fn is_useful(matrix: &PatternMatrix, row: &[Pat], type_info: &[TypeInfo]) -> bool {
    useful(&matrix.rows, row, type_info)
}

// ── Algorithm ──────────────────────────────────────────────────────────

/// The head of a non-wildcard pattern.
#[derive(Clone, Debug, PartialEq)]
enum Ctor {
    Variant(String),
    Literal { value: String, ty: LitKind },
}

fn head_ctor(pat: &Pat) -> Option<Ctor> {
    match pat {
        Pat::Constructor { name, .. } => Some(Ctor::Variant(name.clone())),
        Pat::Literal { value, ty } => Some(Ctor::Literal {
            value: value.clone(),
            ty: ty.clone(),
        }),
        Pat::Wildcard | Pat::Or { .. } => None,
    }
}

fn rebuild(ctor: &Ctor, args: Vec<Pat>) -> Pat {
    match ctor {
        Ctor::Variant(name) => Pat::Constructor {
            name: name.clone(),
            args,
        },
        Ctor::Literal { value, ty } => Pat::Literal {
            value: value.clone(),
            ty: ty.clone(),
        },
    }
}

fn split_types(types: &[TypeInfo]) -> (&TypeInfo, &[TypeInfo]) {
    match types.split_first() {
        Some((first, rest)) => (first, rest),
        None => (&INFINITE, &[]),
    }
}

/// Every constructor of `ty`, or `None` when they cannot be listed.
fn all_ctors(ty: &TypeInfo) -> Option<Vec<Ctor>> {
    match ty {
        TypeInfo::SumType { variants } => Some(variants.iter().map(|v| Ctor::Variant(v.name.clone())).collect()),
        TypeInfo::Bool => Some(
            ["true", "false"]
                .into_iter()
                .map(|value| Ctor::Literal {
                    value: value.to_string(),
                    ty: LitKind::Bool,
                })
                .collect(),
        ),
        TypeInfo::Infinite => None,
    }
}

fn is_complete(present: &[Ctor], ty: &TypeInfo) -> bool {
    all_ctors(ty).is_some_and(|all| all.iter().all(|c| present.contains(c)))
}

/// Column types of `ctor`'s parameters. Without a signature every
/// parameter is an unlisted type.
fn ctor_fields(ctor: &Ctor, ty: &TypeInfo, arity: usize) -> Vec<TypeInfo> {
    if let (Ctor::Variant(name), TypeInfo::SumType { variants }) = (ctor, ty) {
        if let Some(sig) = variants.iter().find(|v| &v.name == name) {
            return sig.fields.clone();
        }
    }
    match ctor {
        Ctor::Variant(_) => vec![TypeInfo::Infinite; arity],
        Ctor::Literal { .. } => Vec::new(),
    }
}

/// One row per alternative wherever the first column is an or-pattern.
fn expand_or(rows: &[PatternRow]) -> Vec<PatternRow> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match row.split_first() {
            Some((Pat::Or { alternatives }, rest)) => {
                let split: Vec<PatternRow> = alternatives
                    .iter()
                    .map(|alt| std::iter::once(alt.clone()).chain(rest.iter().cloned()).collect())
                    .collect();
                out.extend(expand_or(&split));
            }
            _ => out.push(row.clone()),
        }
    }
    out
}

/// Distinct constructors heading `rows`, in first-seen order.
fn head_ctors(rows: &[PatternRow]) -> Vec<Ctor> {
    let mut seen = Vec::new();
    for ctor in rows.iter().filter_map(|r| r.first()).filter_map(head_ctor) {
        if !seen.contains(&ctor) {
            seen.push(ctor);
        }
    }
    seen
}

/// Rows that can match a value built with `ctor`, its arguments spread
/// into `arity` leading columns.
fn specialize(rows: &[PatternRow], ctor: &Ctor, arity: usize) -> Vec<PatternRow> {
    rows.iter()
        .filter_map(|row| {
            let (head, rest) = row.split_first()?;
            let mut out: PatternRow = match head {
                Pat::Wildcard => vec![Pat::Wildcard; arity],
                Pat::Constructor { args, .. } if head_ctor(head).as_ref() == Some(ctor) => args.clone(),
                Pat::Literal { .. } if head_ctor(head).as_ref() == Some(ctor) => Vec::new(),
                _ => return None,
            };
            out.extend_from_slice(rest);
            Some(out)
        })
        .collect()
}

/// Rows whose first column matches anything, without that column.
fn default_rows(rows: &[PatternRow]) -> Vec<PatternRow> {
    rows.iter()
        .filter(|r| matches!(r.first(), Some(Pat::Wildcard)))
        .map(|r| r[1..].to_vec())
        .collect()
}

fn useful(rows: &[PatternRow], row: &[Pat], types: &[TypeInfo]) -> bool {
    let Some((head, rest)) = row.split_first() else {
        return rows.is_empty();
    };
    if let Pat::Or { alternatives } = head {
        return alternatives.iter().any(|alt| {
            let q: PatternRow = std::iter::once(alt.clone()).chain(rest.iter().cloned()).collect();
            useful(rows, &q, types)
        });
    }
    let rows = expand_or(rows);
    let (ty, rest_types) = split_types(types);

    let specialized = |ctor: &Ctor, args: Vec<Pat>, fields: Vec<TypeInfo>| {
        let arity = fields.len();
        let q: PatternRow = args.into_iter().chain(rest.iter().cloned()).collect();
        let types: Vec<TypeInfo> = fields.into_iter().chain(rest_types.iter().cloned()).collect();
        useful(&specialize(&rows, ctor, arity), &q, &types)
    };

    match head_ctor(head) {
        Some(ctor) => {
            let args = match head {
                Pat::Constructor { args, .. } => args.clone(),
                _ => Vec::new(),
            };
            let fields = ctor_fields(&ctor, ty, args.len());
            specialized(&ctor, args, fields)
        }
        None => {
            let present = head_ctors(&rows);
            if is_complete(&present, ty) {
                all_ctors(ty).unwrap_or_default().iter().any(|ctor| {
                    let fields = ctor_fields(ctor, ty, 0);
                    let args = vec![Pat::Wildcard; fields.len()];
                    specialized(ctor, args, fields)
                })
            } else {
                useful(&default_rows(&rows), rest, rest_types)
            }
        }
    }
}

/// A vector of patterns, one per column, that no row matches; `None` when
/// the rows cover everything.
fn witness(rows: &[PatternRow], types: &[TypeInfo]) -> Option<Vec<Pat>> {
    let Some((ty, rest_types)) = types.split_first() else {
        return rows.is_empty().then(Vec::new);
    };
    let rows = expand_or(rows);
    let present = head_ctors(&rows);

    if is_complete(&present, ty) {
        for ctor in all_ctors(ty).unwrap_or_default() {
            let fields = ctor_fields(&ctor, ty, 0);
            let arity = fields.len();
            let types: Vec<TypeInfo> = fields.into_iter().chain(rest_types.iter().cloned()).collect();
            if let Some(mut found) = witness(&specialize(&rows, &ctor, arity), &types) {
                let rest = found.split_off(arity);
                let mut out = vec![rebuild(&ctor, found)];
                out.extend(rest);
                return Some(out);
            }
        }
        return None;
    }

    let mut found = witness(&default_rows(&rows), rest_types)?;
    let head = match all_ctors(ty) {
        Some(all) if !present.is_empty() => all
            .into_iter()
            .find(|c| !present.contains(c))
            .map(|c| {
                let arity = ctor_fields(&c, ty, 0).len();
                rebuild(&c, vec![Pat::Wildcard; arity])
            })
            .unwrap_or(Pat::Wildcard),
        _ => Pat::Wildcard,
    };
    found.insert(0, head);
    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Helpers ────────────────────────────────────────────────────────

    fn wildcard() -> Pat {
        Pat::Wildcard
    }

    fn ctor(name: &str, args: Vec<Pat>) -> Pat {
        Pat::Constructor {
            name: name.to_string(),
            args,
        }
    }

    fn lit_int(value: i64) -> Pat {
        Pat::Literal {
            value: value.to_string(),
            ty: LitKind::Int,
        }
    }

    fn lit_bool(value: bool) -> Pat {
        Pat::Literal {
            value: value.to_string(),
            ty: LitKind::Bool,
        }
    }

    fn or_pat(alternatives: Vec<Pat>) -> Pat {
        Pat::Or { alternatives }
    }

    fn sig(name: &str, fields: Vec<TypeInfo>) -> ConstructorSig {
        ConstructorSig {
            name: name.to_string(),
            fields,
        }
    }

    /// `union Shape { Circle(Int), Point }`
    fn shape_type() -> TypeInfo {
        TypeInfo::SumType {
            variants: vec![sig("Circle", vec![TypeInfo::Infinite]), sig("Point", vec![])],
        }
    }

    /// `Option[Shape]`
    fn option_shape_type() -> TypeInfo {
        TypeInfo::SumType {
            variants: vec![sig("Some", vec![shape_type()]), sig("None", vec![])],
        }
    }

    fn matrix(rows: Vec<Vec<Pat>>) -> PatternMatrix {
        PatternMatrix { rows }
    }

    fn shown(pats: &[Pat]) -> Vec<String> {
        pats.iter().map(|p| p.to_string()).collect()
    }

    // ── Usefulness ─────────────────────────────────────────────────────

    #[test]
    fn anything_is_useful_against_no_rows() {
        assert!(is_useful(&matrix(vec![]), &[wildcard()], &[TypeInfo::Infinite]));
        assert!(is_useful(&matrix(vec![]), &[], &[]));
    }

    #[test]
    fn empty_row_is_not_useful_against_a_row() {
        assert!(!is_useful(&matrix(vec![vec![]]), &[], &[]));
    }

    #[test]
    fn constructor_usefulness() {
        let m = matrix(vec![vec![ctor("Circle", vec![wildcard()])]]);
        assert!(is_useful(&m, &[ctor("Point", vec![])], &[shape_type()]));
        assert!(!is_useful(&m, &[ctor("Circle", vec![wildcard()])], &[shape_type()]));
        assert!(is_useful(&m, &[wildcard()], &[shape_type()]));
    }

    #[test]
    fn wildcard_after_every_constructor_is_useless() {
        let m = matrix(vec![vec![ctor("Circle", vec![wildcard()])], vec![ctor("Point", vec![])]]);
        assert!(!is_useful(&m, &[wildcard()], &[shape_type()]));
    }

    #[test]
    fn literal_usefulness() {
        let m = matrix(vec![vec![lit_int(1)]]);
        assert!(is_useful(&m, &[lit_int(2)], &[TypeInfo::Infinite]));
        assert!(!is_useful(&m, &[lit_int(1)], &[TypeInfo::Infinite]));
    }

    #[test]
    fn multi_column_rows() {
        let diagonal = matrix(vec![
            vec![lit_bool(true), lit_bool(true)],
            vec![lit_bool(false), lit_bool(false)],
        ]);
        let types = [TypeInfo::Bool, TypeInfo::Bool];
        assert!(is_useful(&diagonal, &[lit_bool(true), lit_bool(false)], &types));

        let by_first = matrix(vec![
            vec![lit_bool(true), wildcard()],
            vec![lit_bool(false), wildcard()],
        ]);
        assert!(!is_useful(&by_first, &[lit_bool(true), lit_bool(true)], &types));
    }

    /// Specializing `Option[Shape]` by `Some` continues with `Shape`'s cases.
    #[test]
    fn nested_columns_use_the_field_type() {
        let m = matrix(vec![
            vec![ctor("Some", vec![ctor("Circle", vec![wildcard()])])],
            vec![ctor("None", vec![])],
        ]);
        let types = [option_shape_type()];
        assert!(is_useful(&m, &[ctor("Some", vec![ctor("Point", vec![])])], &types));
        assert!(!is_useful(&m, &[ctor("Some", vec![ctor("Circle", vec![lit_int(3)])])], &types));
    }

    // ── Exhaustiveness ─────────────────────────────────────────────────

    #[test]
    fn bool_needs_both_values() {
        assert_eq!(check_exhaustiveness(&[lit_bool(true), lit_bool(false)], &TypeInfo::Bool), None);
        assert_eq!(check_exhaustiveness(&[wildcard()], &TypeInfo::Bool), None);
        let missing = check_exhaustiveness(&[lit_bool(true)], &TypeInfo::Bool).expect("false is missing");
        assert_eq!(shown(&missing), vec!["false"]);
    }

    #[test]
    fn union_lists_every_missing_case() {
        let three = TypeInfo::SumType {
            variants: vec![sig("A", vec![]), sig("B", vec![TypeInfo::Infinite]), sig("C", vec![])],
        };
        let missing = check_exhaustiveness(&[ctor("A", vec![])], &three).expect("B and C are missing");
        assert_eq!(shown(&missing), vec![".B(_)", ".C"]);
    }

    #[test]
    fn union_covered_by_cases_or_wildcard() {
        let arms = [ctor("Circle", vec![wildcard()]), ctor("Point", vec![])];
        assert_eq!(check_exhaustiveness(&arms, &shape_type()), None);
        assert_eq!(check_exhaustiveness(&[wildcard()], &shape_type()), None);
    }

    #[test]
    fn nested_gap_is_reported_with_its_path() {
        let arms = [
            ctor("Some", vec![ctor("Circle", vec![wildcard()])]),
            ctor("None", vec![]),
        ];
        let missing = check_exhaustiveness(&arms, &option_shape_type()).expect("Some(Point) is missing");
        assert_eq!(shown(&missing), vec![".Some(.Point)"]);

        let full = [
            ctor("Some", vec![ctor("Circle", vec![wildcard()])]),
            ctor("Some", vec![ctor("Point", vec![])]),
            ctor("None", vec![]),
        ];
        assert_eq!(check_exhaustiveness(&full, &option_shape_type()), None);
    }

    #[test]
    fn or_patterns_cover_each_alternative() {
        let both = or_pat(vec![ctor("Circle", vec![wildcard()]), ctor("Point", vec![])]);
        assert_eq!(check_exhaustiveness(&[both], &shape_type()), None);

        let twice = or_pat(vec![ctor("Circle", vec![wildcard()]), ctor("Circle", vec![wildcard()])]);
        assert!(check_exhaustiveness(&[twice], &shape_type()).is_some());
    }

    #[test]
    fn integers_need_a_catchall() {
        let missing = check_exhaustiveness(&[lit_int(1), lit_int(2)], &TypeInfo::Infinite).expect("not exhaustive");
        assert_eq!(missing, vec![Pat::Wildcard]);
        assert_eq!(check_exhaustiveness(&[lit_int(1), lit_int(2), wildcard()], &TypeInfo::Infinite), None);
    }

    #[test]
    fn union_with_no_cases_needs_no_arms() {
        let empty = TypeInfo::SumType { variants: vec![] };
        assert_eq!(check_exhaustiveness(&[], &empty), None);
    }

    // ── Redundancy ─────────────────────────────────────────────────────

    #[test]
    fn arm_after_wildcard_is_redundant() {
        let arms = [wildcard(), ctor("Circle", vec![wildcard()])];
        assert_eq!(check_redundancy(&arms, &shape_type()), vec![1]);
    }

    #[test]
    fn repeated_arm_is_redundant() {
        let arms = [
            ctor("Circle", vec![wildcard()]),
            ctor("Circle", vec![wildcard()]),
            ctor("Point", vec![]),
        ];
        assert_eq!(check_redundancy(&arms, &shape_type()), vec![1]);
        assert_eq!(
            check_redundancy(&[lit_bool(true), lit_bool(false), lit_bool(true)], &TypeInfo::Bool),
            vec![2]
        );
    }

    #[test]
    fn wildcard_after_all_cases_is_redundant() {
        let arms = [ctor("Circle", vec![wildcard()]), ctor("Point", vec![]), wildcard()];
        assert_eq!(check_redundancy(&arms, &shape_type()), vec![2]);
    }

    #[test]
    fn distinct_arms_are_not_redundant() {
        let arms = [ctor("Circle", vec![lit_int(0)]), ctor("Circle", vec![wildcard()]), ctor("Point", vec![])];
        assert!(check_redundancy(&arms, &shape_type()).is_empty());
    }
}
