//! The shared definition context.
//!
//! Every declared struct, union, template, trait and function gets a
//! [`DefId`]. Struct members and union cases are stored here rather than
//! inside [`Ty`], so types stay small and recursive definitions are just
//! ids pointing at each other. The context is handed to callers explicitly;
//! mutation requires `&mut`, which keeps substitution passes single-writer.

use std::fmt;

use kestrel_common::{ModulePath, Span};
use rustc_hash::FxHashSet;

use crate::ty::{Ty, TypeVar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(pub u32);

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefKind {
    Struct,
    Union,
    StructTemplate,
    UnionTemplate,
    Trait,
    Function,
    FunctionTemplate,
    GlobalVar,
    /// A method declared in a `given` block.
    Method,
}

impl DefKind {
    pub fn is_template(self) -> bool {
        matches!(
            self,
            DefKind::StructTemplate | DefKind::UnionTemplate | DefKind::FunctionTemplate
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub ty: Ty,
    pub mutable: bool,
}

impl Member {
    pub fn new(name: &str, ty: Ty) -> Self {
        Member {
            name: name.to_string(),
            ty,
            mutable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructInfo {
    /// Non-empty for templates; members mention these as generic params.
    pub type_params: Vec<String>,
    pub members: Vec<Member>,
    pub is_copy: bool,
    pub is_value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionCase {
    pub name: String,
    pub params: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionInfo {
    pub type_params: Vec<String>,
    pub cases: Vec<UnionCase>,
    pub is_copy: bool,
    pub is_value: bool,
}

#[derive(Debug, Clone)]
struct DefEntry {
    kind: DefKind,
    name: String,
    module_path: ModulePath,
    span: Span,
    struct_info: Option<StructInfo>,
    union_info: Option<UnionInfo>,
}

#[derive(Debug, Default)]
pub struct DefContext {
    defs: Vec<DefEntry>,
}

impl DefContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, kind: DefKind, name: &str, module_path: ModulePath, span: Span) -> DefId {
        let id = DefId(self.defs.len() as u32);
        self.defs.push(DefEntry {
            kind,
            name: name.to_string(),
            module_path,
            span,
            struct_info: None,
            union_info: None,
        });
        id
    }

    fn entry(&self, id: DefId) -> Option<&DefEntry> {
        self.defs.get(id.0 as usize)
    }

    pub fn get_kind(&self, id: DefId) -> Option<DefKind> {
        self.entry(id).map(|e| e.kind)
    }

    pub fn get_span(&self, id: DefId) -> Option<Span> {
        self.entry(id).map(|e| e.span)
    }

    pub fn get_name(&self, id: DefId) -> Option<&str> {
        self.entry(id).map(|e| e.name.as_str())
    }

    pub fn get_module_path(&self, id: DefId) -> Option<&ModulePath> {
        self.entry(id).map(|e| &e.module_path)
    }

    pub fn struct_info(&self, id: DefId) -> Option<&StructInfo> {
        self.entry(id).and_then(|e| e.struct_info.as_ref())
    }

    pub fn union_info(&self, id: DefId) -> Option<&UnionInfo> {
        self.entry(id).and_then(|e| e.union_info.as_ref())
    }

    pub fn get_struct_members(&self, id: DefId) -> Option<&[Member]> {
        self.struct_info(id).map(|s| s.members.as_slice())
    }

    pub fn get_union_cases(&self, id: DefId) -> Option<&[UnionCase]> {
        self.union_info(id).map(|u| u.cases.as_slice())
    }

    pub fn update_struct_info(&mut self, id: DefId, info: StructInfo) {
        if let Some(entry) = self.defs.get_mut(id.0 as usize) {
            entry.struct_info = Some(info);
        }
    }

    pub fn update_union_info(&mut self, id: DefId, info: UnionInfo) {
        if let Some(entry) = self.defs.get_mut(id.0 as usize) {
            entry.union_info = Some(info);
        }
    }

    /// Types of all struct members or union case parameters, in declaration
    /// order. Empty for anything else.
    pub fn member_types(&self, id: DefId) -> Vec<Ty> {
        if let Some(info) = self.struct_info(id) {
            return info.members.iter().map(|m| m.ty.clone()).collect();
        }
        if let Some(info) = self.union_info(id) {
            return info
                .cases
                .iter()
                .flat_map(|c| c.params.iter().map(|p| p.ty.clone()))
                .collect();
        }
        Vec::new()
    }

    pub fn is_copy(&self, id: DefId) -> bool {
        if let Some(info) = self.struct_info(id) {
            return info.is_copy;
        }
        self.union_info(id).is_some_and(|u| u.is_copy)
    }

    pub fn is_value_type(&self, id: DefId) -> bool {
        if let Some(info) = self.struct_info(id) {
            return info.is_value;
        }
        self.union_info(id).is_some_and(|u| u.is_value)
    }

    pub fn type_params(&self, id: DefId) -> &[String] {
        if let Some(info) = self.struct_info(id) {
            return &info.type_params;
        }
        self.union_info(id).map(|u| u.type_params.as_slice()).unwrap_or(&[])
    }

    pub fn contains_type_variable(&self, ty: &Ty) -> bool {
        ty.contains_type_variable(self)
    }

    pub fn free_type_variables(&self, ty: &Ty) -> FxHashSet<TypeVar> {
        ty.free_type_variables(self)
    }

    /// Whether the registered members of `id` themselves mention a type
    /// variable. Nested nominal types are not entered.
    pub fn members_contain_variable(&self, id: DefId) -> bool {
        self.member_types(id).iter().any(|t| !t.structural_vars().is_empty())
    }

    pub fn all_def_ids(&self) -> impl Iterator<Item = DefId> + '_ {
        (0..self.defs.len() as u32).map(DefId)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_query() {
        let mut ctx = DefContext::new();
        let id = ctx.allocate(DefKind::Union, "Shape", ModulePath::parse("geo"), Span::new(3, 8));
        assert_eq!(ctx.get_kind(id), Some(DefKind::Union));
        assert_eq!(ctx.get_name(id), Some("Shape"));
        assert_eq!(ctx.get_module_path(id).map(ToString::to_string), Some("geo".into()));
        assert_eq!(ctx.get_span(id), Some(Span::new(3, 8)));
        assert!(ctx.get_union_cases(id).is_none());
        assert_eq!(ctx.get_kind(DefId(99)), None);
    }

    #[test]
    fn union_cases_flatten_into_member_types() {
        let mut ctx = DefContext::new();
        let id = ctx.allocate(DefKind::Union, "Shape", ModulePath::root(), Span::default());
        ctx.update_union_info(
            id,
            UnionInfo {
                type_params: Vec::new(),
                cases: vec![
                    UnionCase {
                        name: "Circle".into(),
                        params: vec![Member::new("r", Ty::Float64)],
                    },
                    UnionCase {
                        name: "Rect".into(),
                        params: vec![Member::new("w", Ty::Int), Member::new("h", Ty::Int)],
                    },
                ],
                is_copy: true,
                is_value: true,
            },
        );
        assert_eq!(ctx.member_types(id), vec![Ty::Float64, Ty::Int, Ty::Int]);
        assert!(ctx.is_copy(id));
        assert!(!ctx.members_contain_variable(id));
    }

    #[test]
    fn all_def_ids_in_allocation_order() {
        let mut ctx = DefContext::new();
        let a = ctx.allocate(DefKind::Struct, "A", ModulePath::root(), Span::default());
        let b = ctx.allocate(DefKind::Trait, "B", ModulePath::root(), Span::default());
        assert_eq!(ctx.all_def_ids().collect::<Vec<_>>(), vec![a, b]);
        assert!(DefKind::FunctionTemplate.is_template());
        assert!(!DefKind::Struct.is_template());
    }
}
