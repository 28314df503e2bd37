//! Lexical scopes.
//!
//! A [`Scope`] is a cheap handle to one frame of a parent-linked chain.
//! Lookups walk outward until a frame binds the name; [`Scope::child`]
//! makes a new innermost frame and never touches its parent. Builtin type
//! names are shared by every frame of a chain and always win over
//! user-defined types.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::DefId;
use crate::ty::{PassKind, Ty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Value,
    MutableValue,
    Reference,
    MutableReference,
}

impl VariableKind {
    /// Binding kind for a variable of type `ty` declared `mutable` or not.
    pub fn for_binding(ty: &Ty, mutable: bool) -> Self {
        match (matches!(ty, Ty::Ref(_)), mutable) {
            (false, false) => VariableKind::Value,
            (false, true) => VariableKind::MutableValue,
            (true, false) => VariableKind::Reference,
            (true, true) => VariableKind::MutableReference,
        }
    }

    pub fn is_mutable(self) -> bool {
        matches!(self, VariableKind::MutableValue | VariableKind::MutableReference)
    }

    pub fn is_reference(self) -> bool {
        matches!(self, VariableKind::Reference | VariableKind::MutableReference)
    }

    pub fn pass_kind(self) -> PassKind {
        match self {
            VariableKind::Value | VariableKind::MutableValue => PassKind::ByVal,
            VariableKind::Reference => PassKind::ByRef,
            VariableKind::MutableReference => PassKind::ByMutRef,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable(VariableKind),
    Function,
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub ty: Ty,
    pub kind: SymbolKind,
    pub def: Option<DefId>,
}

impl Symbol {
    pub fn variable(name: &str, ty: Ty, kind: VariableKind) -> Self {
        Symbol {
            name: name.to_string(),
            ty,
            kind: SymbolKind::Variable(kind),
            def: None,
        }
    }

    pub fn function(name: &str, ty: Ty, def: DefId) -> Self {
        Symbol {
            name: name.to_string(),
            ty,
            kind: SymbolKind::Function,
            def: Some(def),
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self.kind, SymbolKind::Variable(k) if k.is_mutable())
    }
}

#[derive(Debug, Default)]
struct Frame {
    symbols: RefCell<FxHashMap<String, Symbol>>,
    types: RefCell<FxHashMap<String, Ty>>,
    templates: RefCell<FxHashMap<String, DefId>>,
    moved: RefCell<FxHashSet<String>>,
}

/// Moved names of each frame of a chain, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovedState(Vec<FxHashSet<String>>);

#[derive(Debug, Clone)]
pub struct Scope {
    frame: Rc<Frame>,
    parent: Option<Box<Scope>>,
    builtins: Rc<FxHashMap<String, Ty>>,
}

impl Scope {
    /// A root scope whose chain resolves `builtins` before anything else.
    pub fn root(builtins: FxHashMap<String, Ty>) -> Self {
        Scope {
            frame: Rc::default(),
            parent: None,
            builtins: Rc::new(builtins),
        }
    }

    pub fn child(&self) -> Scope {
        Scope {
            frame: Rc::default(),
            parent: Some(Box::new(self.clone())),
            builtins: Rc::clone(&self.builtins),
        }
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.parent.as_deref()
    }

    fn frames(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self), |s| s.parent())
    }

    // ── Terms ──────────────────────────────────────────────────────────

    /// Bind a variable in this frame, shadowing outer bindings.
    pub fn define(&self, name: &str, ty: Ty, mutable: bool) {
        let kind = VariableKind::for_binding(&ty, mutable);
        self.define_symbol(Symbol::variable(name, ty, kind));
    }

    pub fn define_symbol(&self, symbol: Symbol) {
        self.frame.moved.borrow_mut().remove(&symbol.name);
        self.frame
            .symbols
            .borrow_mut()
            .insert(symbol.name.clone(), symbol);
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.frames()
            .find_map(|s| s.frame.symbols.borrow().get(name).cloned())
    }

    pub fn lookup_type_of(&self, name: &str) -> Option<Ty> {
        self.lookup(name).map(|s| s.ty)
    }

    pub fn is_mutable(&self, name: &str) -> Option<bool> {
        self.lookup(name).map(|s| s.is_mutable())
    }

    /// Whether this frame itself binds `name`.
    pub fn defines_locally(&self, name: &str) -> bool {
        self.frame.symbols.borrow().contains_key(name)
    }

    fn owner_of(&self, name: &str) -> Option<&Scope> {
        self.frames().find(|s| s.defines_locally(name))
    }

    /// Whether `name` resolves to a binding of the outermost frame.
    pub fn is_global(&self, name: &str) -> bool {
        self.owner_of(name).is_some_and(|owner| owner.parent().is_none())
    }

    /// Record that the value bound to `name` has been moved out.
    pub fn mark_moved(&self, name: &str) {
        if let Some(owner) = self.owner_of(name) {
            owner.frame.moved.borrow_mut().insert(name.to_string());
        }
    }

    pub fn is_moved(&self, name: &str) -> bool {
        self.owner_of(name)
            .is_some_and(|owner| owner.frame.moved.borrow().contains(name))
    }

    /// Clear the moved state of `name` after it is assigned a new value.
    pub fn reinitialize(&self, name: &str) {
        if let Some(owner) = self.owner_of(name) {
            owner.frame.moved.borrow_mut().remove(name);
        }
    }

    pub fn moved_state(&self) -> MovedState {
        MovedState(
            self.frames()
                .map(|s| s.frame.moved.borrow().clone())
                .collect(),
        )
    }

    /// Put back a state taken from this same scope.
    pub fn restore_moved(&self, state: &MovedState) {
        for (scope, moved) in self.frames().zip(&state.0) {
            *scope.frame.moved.borrow_mut() = moved.clone();
        }
    }

    /// Also count as moved everything `state` had moved.
    pub fn merge_moved(&self, state: &MovedState) {
        for (scope, moved) in self.frames().zip(&state.0) {
            scope.frame.moved.borrow_mut().extend(moved.iter().cloned());
        }
    }

    // ── Types ──────────────────────────────────────────────────────────

    pub fn define_type(&self, name: &str, ty: Ty) {
        self.frame.types.borrow_mut().insert(name.to_string(), ty);
    }

    pub fn lookup_type(&self, name: &str) -> Option<Ty> {
        if let Some(builtin) = self.builtins.get(name) {
            return Some(builtin.clone());
        }
        self.frames()
            .find_map(|s| s.frame.types.borrow().get(name).cloned())
    }

    pub fn is_builtin_type(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn define_template(&self, name: &str, template: DefId) {
        self.frame
            .templates
            .borrow_mut()
            .insert(name.to_string(), template);
    }

    pub fn lookup_template(&self, name: &str) -> Option<DefId> {
        self.frames()
            .find_map(|s| s.frame.templates.borrow().get(name).copied())
    }
}
