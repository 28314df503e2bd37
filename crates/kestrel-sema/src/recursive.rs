//! Detection of value types with unbounded size.
//!
//! Every non-template struct and union is a node. `A` has an edge to `B`
//! when some field of `A` holds a `B` by value; `ref`, `ptr` and `weakref`
//! are fixed-size and cut the edge. A cycle in this graph is a type that
//! contains itself. Detection is a three-colour depth-first search driven by
//! an explicit stack, and reports every distinct cycle, not just the first.

use kestrel_common::Span;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::{DefContext, DefId, DefKind};
use crate::error::SemanticErrorKind;
use crate::ty::Ty;

/// A by-value edge from one definition to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDependency {
    pub target: DefId,
    /// `field` for structs, `Case.param` for unions.
    pub field_name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleNode {
    pub def: DefId,
    pub type_name: String,
    /// Field of the previous node through which this one was reached.
    pub field_name: Option<String>,
    /// Where the type is declared.
    pub span: Span,
}

/// A DFS path ending in a node that is already on it. The cycle itself is
/// `path[start_index..]`; the last node repeats `path[start_index]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursionCycle {
    pub path: Vec<CycleNode>,
    pub start_index: usize,
}

impl RecursionCycle {
    fn cycle(&self) -> &[CycleNode] {
        &self.path[self.start_index.min(self.path.len())..]
    }

    /// `A -> B -> A`
    pub fn path_string(&self) -> String {
        self.cycle()
            .iter()
            .map(|n| n.type_name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// `A.b -> B.a -> A`
    pub fn detailed_path_string(&self) -> String {
        let nodes = self.cycle();
        let mut parts = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            match nodes.get(i + 1).and_then(|next| next.field_name.as_deref()) {
                Some(field) => parts.push(format!("{}.{field}", node.type_name)),
                None => parts.push(node.type_name.clone()),
            }
        }
        parts.join(" -> ")
    }

    /// Definitions on the cycle, without the closing repeat.
    pub fn members(&self) -> Vec<DefId> {
        let nodes = self.cycle();
        nodes[..nodes.len().saturating_sub(1)].iter().map(|n| n.def).collect()
    }

    /// Members rotated to start at the smallest id, so the same loop found
    /// from different entry points compares equal.
    fn normalized(&self) -> Vec<DefId> {
        let mut members = self.members();
        if let Some(pos) = members.iter().enumerate().min_by_key(|(_, d)| **d).map(|(i, _)| i) {
            members.rotate_left(pos);
        }
        members
    }

    pub fn to_error_kind(&self) -> SemanticErrorKind {
        SemanticErrorKind::generic(format!(
            "Infinite-size value type: {} (break the cycle with ref, ptr or weakref)",
            self.detailed_path_string()
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

pub struct RecursiveTypeChecker<'a> {
    ctx: &'a DefContext,
    nodes: Vec<DefId>,
    graph: FxHashMap<DefId, Vec<TypeDependency>>,
}

impl<'a> RecursiveTypeChecker<'a> {
    pub fn new(ctx: &'a DefContext) -> Self {
        let mut checker = RecursiveTypeChecker {
            ctx,
            nodes: Vec::new(),
            graph: FxHashMap::default(),
        };
        checker.build();
        checker
    }

    fn build(&mut self) {
        let ctx = self.ctx;
        for def in ctx.all_def_ids() {
            let span = ctx.get_span(def).unwrap_or_default();
            let mut deps = Vec::new();
            match ctx.get_kind(def) {
                Some(DefKind::Struct) => {
                    let Some(members) = ctx.get_struct_members(def) else { continue };
                    for m in members {
                        for target in value_targets(&m.ty) {
                            deps.push(TypeDependency {
                                target,
                                field_name: m.name.clone(),
                                span,
                            });
                        }
                    }
                }
                Some(DefKind::Union) => {
                    let Some(cases) = ctx.get_union_cases(def) else { continue };
                    for c in cases {
                        for p in &c.params {
                            for target in value_targets(&p.ty) {
                                deps.push(TypeDependency {
                                    target,
                                    field_name: format!("{}.{}", c.name, p.name),
                                    span,
                                });
                            }
                        }
                    }
                }
                _ => continue,
            }
            self.nodes.push(def);
            if !deps.is_empty() {
                self.graph.insert(def, deps);
            }
        }
    }

    pub fn dependencies(&self, def: DefId) -> &[TypeDependency] {
        self.graph.get(&def).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every distinct cycle in the graph.
    #[tracing::instrument(level = "debug", skip_all, fields(types = self.nodes.len()))]
    pub fn check(&self) -> Vec<RecursionCycle> {
        let cycles = self.detect(None);
        tracing::debug!(cycles = cycles.len(), "recursion check done");
        cycles
    }

    pub fn first_cycle(&self) -> Option<RecursionCycle> {
        self.detect(Some(1)).into_iter().next()
    }

    fn node(&self, def: DefId, field_name: Option<String>) -> CycleNode {
        CycleNode {
            def,
            type_name: self.ctx.get_name(def).unwrap_or("<unknown>").to_string(),
            field_name,
            span: self.ctx.get_span(def).unwrap_or_default(),
        }
    }

    fn detect(&self, limit: Option<usize>) -> Vec<RecursionCycle> {
        let mut color: FxHashMap<DefId, Color> = self.nodes.iter().map(|d| (*d, Color::White)).collect();
        let mut cycles = Vec::new();
        let mut seen: FxHashSet<Vec<DefId>> = FxHashSet::default();

        for &root in &self.nodes {
            if color.get(&root) != Some(&Color::White) {
                continue;
            }
            // Each frame is a node on the current path and the index of its
            // next unexplored edge.
            let mut stack: Vec<(DefId, usize)> = vec![(root, 0)];
            let mut path = vec![self.node(root, None)];
            color.insert(root, Color::Gray);

            while let Some(frame) = stack.last_mut() {
                let (def, next) = *frame;
                let deps = self.dependencies(def);
                let Some(dep) = deps.get(next) else {
                    color.insert(def, Color::Black);
                    stack.pop();
                    path.pop();
                    continue;
                };
                frame.1 += 1;
                match color.get(&dep.target).copied().unwrap_or(Color::White) {
                    Color::White => {
                        color.insert(dep.target, Color::Gray);
                        stack.push((dep.target, 0));
                        path.push(self.node(dep.target, Some(dep.field_name.clone())));
                    }
                    Color::Gray => {
                        let Some(start_index) = path.iter().position(|n| n.def == dep.target) else {
                            continue;
                        };
                        let mut cycle_path = path.clone();
                        cycle_path.push(self.node(dep.target, Some(dep.field_name.clone())));
                        let cycle = RecursionCycle {
                            path: cycle_path,
                            start_index,
                        };
                        if seen.insert(cycle.normalized()) {
                            tracing::trace!(cycle = %cycle.path_string(), "cycle");
                            cycles.push(cycle);
                            if limit.is_some_and(|l| cycles.len() >= l) {
                                return cycles;
                            }
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        cycles
    }
}

/// Definitions a field of type `ty` stores inline.
fn value_targets(ty: &Ty) -> Vec<DefId> {
    let mut out = Vec::new();
    collect_value_targets(ty, &mut out);
    out
}

fn collect_value_targets(ty: &Ty, out: &mut Vec<DefId>) {
    match ty {
        Ty::Ref(_) | Ty::Ptr(_) | Ty::WeakRef(_) => {}
        Ty::Struct(id) | Ty::Union(id) => out.push(*id),
        Ty::GenericStruct { args, .. } | Ty::GenericUnion { args, .. } => {
            for a in args {
                collect_value_targets(a, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Member, StructInfo, UnionCase, UnionInfo};
    use kestrel_common::ModulePath;

    struct Defs {
        ctx: DefContext,
    }

    impl Defs {
        fn new() -> Self {
            Defs { ctx: DefContext::new() }
        }

        fn declare(&mut self, name: &str) -> DefId {
            self.ctx.allocate(DefKind::Struct, name, ModulePath::root(), Span::default())
        }

        fn fields(&mut self, id: DefId, fields: Vec<(&str, Ty)>) {
            self.ctx.update_struct_info(
                id,
                StructInfo {
                    type_params: Vec::new(),
                    members: fields.into_iter().map(|(n, t)| Member::new(n, t)).collect(),
                    is_copy: false,
                    is_value: false,
                },
            );
        }
    }

    fn boxed(t: Ty) -> Box<Ty> {
        Box::new(t)
    }

    #[test]
    fn mutual_value_recursion_is_one_cycle() {
        let mut d = Defs::new();
        let (a, b) = (d.declare("A"), d.declare("B"));
        d.fields(a, vec![("b", Ty::Struct(b))]);
        d.fields(b, vec![("a", Ty::Struct(a))]);
        let cycles = RecursiveTypeChecker::new(&d.ctx).check();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path_string(), "A -> B -> A");
        assert_eq!(cycles[0].detailed_path_string(), "A.b -> B.a -> A");
    }

    #[test]
    fn indirection_breaks_cycles() {
        let mut d = Defs::new();
        let (a, b) = (d.declare("A"), d.declare("B"));
        d.fields(a, vec![("b", Ty::Struct(b))]);
        d.fields(b, vec![("a", Ty::Ref(boxed(Ty::Struct(a))))]);
        let node = d.declare("Node");
        d.fields(node, vec![("next", Ty::Ptr(boxed(Ty::Struct(node))))]);
        let weak = d.declare("Parent");
        d.fields(weak, vec![("up", Ty::WeakRef(boxed(Ty::Struct(weak))))]);
        assert!(RecursiveTypeChecker::new(&d.ctx).check().is_empty());
    }

    #[test]
    fn diamond_is_acyclic() {
        let mut d = Defs::new();
        let (a, b, c, e) = (d.declare("A"), d.declare("B"), d.declare("C"), d.declare("D"));
        d.fields(a, vec![("b", Ty::Struct(b)), ("c", Ty::Struct(c))]);
        d.fields(b, vec![("d", Ty::Struct(e))]);
        d.fields(c, vec![("d", Ty::Struct(e))]);
        d.fields(e, Vec::new());
        assert!(RecursiveTypeChecker::new(&d.ctx).check().is_empty());
    }

    #[test]
    fn self_recursion_and_independent_cycles_are_all_reported() {
        let mut d = Defs::new();
        let s = d.declare("S");
        d.fields(s, vec![("me", Ty::Struct(s))]);
        let (x, y) = (d.declare("X"), d.declare("Y"));
        d.fields(x, vec![("y", Ty::Struct(y))]);
        d.fields(y, vec![("x", Ty::Struct(x))]);
        let checker = RecursiveTypeChecker::new(&d.ctx);
        let paths: Vec<String> = checker.check().iter().map(RecursionCycle::path_string).collect();
        assert_eq!(paths, vec!["S -> S", "X -> Y -> X"]);
        assert_eq!(checker.first_cycle().map(|c| c.path_string()), Some("S -> S".into()));
    }

    #[test]
    fn cycle_suffix_starts_at_reentered_node() {
        let mut d = Defs::new();
        let (top, a, b) = (d.declare("Top"), d.declare("A"), d.declare("B"));
        d.fields(top, vec![("a", Ty::Struct(a))]);
        d.fields(a, vec![("b", Ty::Struct(b))]);
        d.fields(b, vec![("a", Ty::Struct(a))]);
        let cycles = RecursiveTypeChecker::new(&d.ctx).check();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].start_index, 1);
        assert_eq!(cycles[0].members(), vec![a, b]);
        assert_eq!(cycles[0].path_string(), "A -> B -> A");
    }

    #[test]
    fn union_cases_and_generic_arguments_are_edges() {
        let mut d = Defs::new();
        let boxed_tpl = d
            .ctx
            .allocate(DefKind::StructTemplate, "Box", ModulePath::root(), Span::default());
        let tree = d.ctx.allocate(DefKind::Union, "Tree", ModulePath::root(), Span::default());
        d.ctx.update_union_info(
            tree,
            UnionInfo {
                type_params: Vec::new(),
                cases: vec![
                    UnionCase { name: "Leaf".into(), params: Vec::new() },
                    UnionCase {
                        name: "Node".into(),
                        params: vec![Member::new(
                            "child",
                            Ty::GenericStruct { template: boxed_tpl, args: vec![Ty::Union(tree)] },
                        )],
                    },
                ],
                is_copy: false,
                is_value: false,
            },
        );
        let cycles = RecursiveTypeChecker::new(&d.ctx).check();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].detailed_path_string(), "Tree.Node.child -> Tree");
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut d = Defs::new();
        let ids: Vec<DefId> = (0..20_000).map(|i| d.declare(&format!("T{i}"))).collect();
        for pair in ids.windows(2) {
            d.fields(pair[0], vec![("next", Ty::Struct(pair[1]))]);
        }
        d.fields(ids[ids.len() - 1], vec![("first", Ty::Struct(ids[0]))]);
        let cycles = RecursiveTypeChecker::new(&d.ctx).check();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].members().len(), 20_000);
    }
}
