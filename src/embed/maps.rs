//! Bookkeeping maps tying host values to synthesized types and handles.
//!
//! All three maps are owned by one [`Stitcher`](super::Stitcher) and live for
//! a single compilation. Host values are keyed by identity, never by value
//! equality.

use std::collections::HashMap;

use crate::host::HostValue;
use crate::span::Span;
use crate::types::TypeId;

/// Bijection between dense integer handles and host values, consulted by the
/// runtime dispatcher when a cross-boundary call executes. Handles start at 1
/// and a host object maps to exactly one handle for the lifetime of the map.
#[derive(Debug, Default)]
pub struct ObjectMap {
    values: Vec<HostValue>,
    by_identity: HashMap<usize, i32>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, value: &HostValue) -> i32 {
        if let Some(&handle) = self.by_identity.get(&value.identity()) {
            return handle;
        }
        self.values.push(value.clone());
        let handle = self.values.len() as i32;
        self.by_identity.insert(value.identity(), handle);
        handle
    }

    pub fn retrieve(&self, handle: i32) -> Option<&HostValue> {
        if handle < 1 {
            return None;
        }
        self.values.get(handle as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &HostValue)> {
        self.values
            .iter()
            .enumerate()
            .map(|(index, value)| (index as i32 + 1, value))
    }
}

/// The (Instance, Constructor) type pair registered for one embedded host
/// class, created lazily the first time a value of that class is quoted.
#[derive(Debug, Clone, Copy)]
pub struct ClassTypes {
    pub instance: TypeId,
    pub constructor: TypeId,
}

/// Host class identity to its registered type pair. Iteration order is
/// registration order so finalization output stays deterministic.
#[derive(Debug, Default)]
pub struct TypeMap {
    order: Vec<usize>,
    entries: HashMap<usize, ClassTypes>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class_identity: usize) -> Option<ClassTypes> {
        self.entries.get(&class_identity).copied()
    }

    pub fn insert(&mut self, class_identity: usize, types: ClassTypes) {
        if self.entries.insert(class_identity, types).is_none() {
            self.order.push(class_identity);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, ClassTypes)> + '_ {
        self.order
            .iter()
            .filter_map(|identity| self.entries.get(identity).map(|t| (*identity, *t)))
    }
}

/// Every concrete host value observed carrying a given nominal type, with
/// the location it was quoted at. The inference engine can only see types;
/// this is its side channel to the values behind them when an attribute
/// access needs host introspection.
#[derive(Debug, Default)]
pub struct ValueMap {
    entries: HashMap<TypeId, Vec<(HostValue, Span)>>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ty: TypeId, value: &HostValue, span: Span) {
        let values = self.entries.entry(ty).or_default();
        if values.iter().any(|(seen, _)| seen.ptr_eq(value)) {
            return;
        }
        values.push((value.clone(), span));
    }

    pub fn get(&self, ty: TypeId) -> &[(HostValue, Span)] {
        self.entries.get(&ty).map(Vec::as_slice).unwrap_or(&[])
    }
}
