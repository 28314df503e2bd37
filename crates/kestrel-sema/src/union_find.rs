//! Disjoint-set forest with path compression and union by rank.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ty::{Ty, TypeVar};

#[derive(Debug, Clone)]
pub struct UnionFind<T> {
    parent: FxHashMap<T, T>,
    rank: FxHashMap<T, u32>,
}

impl<T> Default for UnionFind<T> {
    fn default() -> Self {
        Self {
            parent: FxHashMap::default(),
            rank: FxHashMap::default(),
        }
    }
}

impl<T: Clone + Eq + Hash> UnionFind<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Representative of `x`'s class. An element seen for the first time
    /// becomes its own singleton root.
    pub fn find(&mut self, x: &T) -> T {
        if !self.parent.contains_key(x) {
            self.parent.insert(x.clone(), x.clone());
            self.rank.insert(x.clone(), 0);
            return x.clone();
        }

        let mut root = x.clone();
        let mut path = Vec::new();
        while let Some(parent) = self.parent.get(&root) {
            if *parent == root {
                break;
            }
            path.push(root);
            root = parent.clone();
        }
        for node in path {
            self.parent.insert(node, root.clone());
        }
        root
    }

    /// Merge the classes of `x` and `y`, returning the surviving root.
    pub fn union(&mut self, x: &T, y: &T) -> T {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return rx;
        }
        let rank_x = self.rank.get(&rx).copied().unwrap_or(0);
        let rank_y = self.rank.get(&ry).copied().unwrap_or(0);
        if rank_x < rank_y {
            self.parent.insert(rx, ry.clone());
            ry
        } else {
            self.parent.insert(ry, rx.clone());
            if rank_x == rank_y {
                self.rank.insert(rx.clone(), rank_x + 1);
            }
            rx
        }
    }

    pub fn connected(&mut self, x: &T, y: &T) -> bool {
        self.find(x) == self.find(y)
    }

    pub fn contains(&self, x: &T) -> bool {
        self.parent.contains_key(x)
    }

    pub fn elements(&self) -> impl Iterator<Item = &T> {
        self.parent.keys()
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Members of every class, keyed by root.
    pub fn equivalence_classes(&mut self) -> FxHashMap<T, Vec<T>> {
        let elements: Vec<T> = self.parent.keys().cloned().collect();
        let mut classes: FxHashMap<T, Vec<T>> = FxHashMap::default();
        for e in elements {
            let root = self.find(&e);
            classes.entry(root).or_default().push(e);
        }
        classes
    }

    pub fn class_count(&self) -> usize {
        self.parent.iter().filter(|(k, v)| k == v).count()
    }

    pub fn reset(&mut self) {
        self.parent.clear();
        self.rank.clear();
    }
}

impl UnionFind<TypeVar> {
    /// The type bound to `tv`'s class, or the class representative as an
    /// open variable.
    pub fn resolve_type(&mut self, tv: &TypeVar, bindings: &FxHashMap<TypeVar, Ty>) -> Ty {
        let root = self.find(tv);
        match bindings.get(&root) {
            Some(ty) => ty.clone(),
            None => Ty::Var(root),
        }
    }
}
