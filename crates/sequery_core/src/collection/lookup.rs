//! Order-preserving key to sequence multimap.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use sequery_error::{QueryError, Result};

use super::equality::{DefaultEquality, EqualityComparer};
use crate::types::value::Value;

/// The elements sharing one key.
///
/// A grouping handed out by a [`Lookup`] is a read-only view: the
/// public mutation surface always fails with a capability error. Only
/// the owning lookup grows a grouping, through [`Lookup::append`].
#[derive(Debug)]
pub struct Grouping {
    key: Value,
    elements: RefCell<Vec<Value>>,
}

impl Grouping {
    fn new(key: Value, first: Value) -> Self {
        Grouping {
            key,
            elements: RefCell::new(vec![first]),
        }
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.borrow().is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Value> {
        self.elements.borrow().get(idx).cloned()
    }

    pub fn first(&self) -> Option<Value> {
        self.get(0)
    }

    /// Snapshot of the elements in insertion order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.elements.borrow().clone()
    }

    /// Always fails: groupings are immutable through this view.
    pub fn add(&self, _value: Value) -> Result<()> {
        Err(read_only())
    }

    /// Always fails: groupings are immutable through this view.
    pub fn remove(&self, _idx: usize) -> Result<()> {
        Err(read_only())
    }

    /// Always fails: groupings are immutable through this view.
    pub fn clear(&self) -> Result<()> {
        Err(read_only())
    }

    fn push_owned(&self, value: Value) {
        let mut elements = self.elements.borrow_mut();
        // Doubling growth keeps appends amortized O(1).
        if elements.len() == elements.capacity() {
            let additional = elements.capacity().max(1);
            elements.reserve(additional);
        }
        elements.push(value);
    }
}

fn read_only() -> QueryError {
    QueryError::new("Grouping is read-only; only its owning lookup may modify it")
}

/// Multimap from key to grouping, iterated in first-insertion order.
///
/// Enumeration order is a correctness requirement: grouping operators
/// must present groups in the order keys first occur in the source
/// sequence, not hash order. The hash index exists only for O(1)
/// average key probes.
pub struct Lookup {
    comparer: Rc<dyn EqualityComparer>,
    groups: Vec<Rc<Grouping>>,
    /// Key hash to positions in `groups`. Collisions are resolved by
    /// probing with the comparer.
    index: HashMap<u64, Vec<usize>>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::with_comparer(Rc::new(DefaultEquality))
    }

    pub fn with_comparer(comparer: Rc<dyn EqualityComparer>) -> Self {
        Lookup {
            comparer,
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Position of the grouping for a key, if present.
    pub fn position(&self, key: &Value) -> Option<usize> {
        let hash = self.comparer.hash(key);
        let positions = self.index.get(&hash)?;
        positions
            .iter()
            .copied()
            .find(|&idx| self.comparer.eq(self.groups[idx].key(), key))
    }

    /// Grouping for a key, if present.
    pub fn get(&self, key: &Value) -> Option<&Rc<Grouping>> {
        self.position(key).map(|idx| &self.groups[idx])
    }

    /// Elements for a key; empty (never an error) on a miss.
    pub fn find(&self, key: &Value) -> Vec<Value> {
        self.get(key).map(|g| g.to_vec()).unwrap_or_default()
    }

    /// Add a new grouping with its first element, returning its
    /// position.
    ///
    /// Duplicate keys are a caller error: key dedup belongs to the
    /// grouping operator that computes keys, not to the lookup.
    pub fn add(&mut self, key: Value, first: Value) -> Result<usize> {
        if self.position(&key).is_some() {
            return Err(QueryError::new(format!(
                "Duplicate key added to lookup: {key}"
            )));
        }

        let hash = self.comparer.hash(&key);
        let idx = self.groups.len();
        self.groups.push(Rc::new(Grouping::new(key, first)));
        self.index.entry(hash).or_default().push(idx);
        Ok(idx)
    }

    /// Append an element to the grouping at `idx`.
    pub fn append(&mut self, idx: usize, value: Value) -> Result<()> {
        let group = self.groups.get(idx).ok_or_else(|| {
            QueryError::new(format!("Grouping index {idx} out of bounds"))
        })?;
        group.push_owned(value);
        Ok(())
    }

    /// Groupings in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<Grouping>> {
        self.groups.iter()
    }
}

impl Default for Lookup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup")
            .field("comparer", &self.comparer)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}
