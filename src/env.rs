//! Insertion-ordered typing environment.
//!
//! Maps symbol names to their types. Iteration order is insertion order so
//! that synthesized module output and tree hashing stay deterministic.

use std::collections::HashMap;

use crate::types::TypeId;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    entries: Vec<(String, TypeId)>,
    index: HashMap<String, usize>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.index.get(name).map(|&i| self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Bind `name`, replacing any previous binding in place.
    pub fn insert(&mut self, name: impl Into<String>, ty: TypeId) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&i) => self.entries[i].1 = ty,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, ty));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.entries.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
