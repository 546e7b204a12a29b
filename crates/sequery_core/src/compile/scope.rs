//! Runtime scopes for compiled queries.
//!
//! Each lambda invocation pushes a child scope whose locals hold the
//! hoisted parameter values. Locals live in cells shared through the
//! parent chain, so a nested closure observes writes made after it was
//! created.

use std::cell::RefCell;
use std::rc::Rc;

use sequery_error::{QueryError, Result};

use crate::types::value::Value;

#[derive(Debug)]
pub struct ExecutionScope {
    parent: Option<Rc<ExecutionScope>>,
    /// Constants lifted out of the tree at compile time. Shared by
    /// every scope in the chain.
    globals: Rc<[Value]>,
    locals: Vec<RefCell<Value>>,
}

impl ExecutionScope {
    /// Root scope for one invocation. Holds the globals and no locals.
    pub fn root(globals: Rc<[Value]>) -> Rc<Self> {
        Rc::new(ExecutionScope {
            parent: None,
            globals,
            locals: Vec::new(),
        })
    }

    /// Child scope with `num_locals` hoisted slots, initially null.
    pub fn child(parent: &Rc<Self>, num_locals: usize) -> Rc<Self> {
        Rc::new(ExecutionScope {
            parent: Some(parent.clone()),
            globals: parent.globals.clone(),
            locals: (0..num_locals).map(|_| RefCell::new(Value::Null)).collect(),
        })
    }

    pub fn parent(&self) -> Option<&Rc<Self>> {
        self.parent.as_ref()
    }

    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    pub fn global(&self, idx: usize) -> Result<Value> {
        self.globals
            .get(idx)
            .cloned()
            .ok_or_else(|| inconsistent(format!("global index {idx} out of bounds")))
    }

    pub fn local(&self, slot: usize) -> Result<Value> {
        self.locals
            .get(slot)
            .map(|cell| cell.borrow().clone())
            .ok_or_else(|| inconsistent(format!("local slot {slot} out of bounds")))
    }

    pub fn set_local(&self, slot: usize, value: Value) -> Result<()> {
        let cell = self
            .locals
            .get(slot)
            .ok_or_else(|| inconsistent(format!("local slot {slot} out of bounds")))?;
        *cell.borrow_mut() = value;
        Ok(())
    }

    /// Read a local `depth` scopes up the parent chain. Depth zero is
    /// this scope.
    pub fn ancestor_local(&self, depth: usize, slot: usize) -> Result<Value> {
        let mut scope = self;
        for _ in 0..depth {
            scope = scope
                .parent
                .as_deref()
                .ok_or_else(|| inconsistent(format!("no scope at depth {depth}")))?;
        }
        scope.local(slot)
    }
}

/// Scope misses indicate a compiler bug, not a user error.
fn inconsistent(msg: String) -> QueryError {
    QueryError::new(format!("Execution scope inconsistency: {msg}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_are_shared_cells() {
        let root = ExecutionScope::root(Rc::from(Vec::new()));
        let child = ExecutionScope::child(&root, 1);

        child.set_local(0, Value::Int64(1)).unwrap();
        let alias = child.clone();
        alias.set_local(0, Value::Int64(2)).unwrap();
        assert_eq!(Value::Int64(2), child.local(0).unwrap());
    }

    #[test]
    fn ancestor_walks_parents() {
        let root = ExecutionScope::root(Rc::from(vec![Value::Int64(7)]));
        let outer = ExecutionScope::child(&root, 1);
        outer.set_local(0, Value::Int64(10)).unwrap();
        let inner = ExecutionScope::child(&outer, 1);
        inner.set_local(0, Value::Int64(20)).unwrap();

        assert_eq!(Value::Int64(20), inner.ancestor_local(0, 0).unwrap());
        assert_eq!(Value::Int64(10), inner.ancestor_local(1, 0).unwrap());
        assert!(inner.ancestor_local(3, 0).is_err());
        assert_eq!(Value::Int64(7), inner.global(0).unwrap());
    }

    #[test]
    fn out_of_bounds_slot_errors() {
        let root = ExecutionScope::root(Rc::from(Vec::new()));
        assert!(root.local(0).is_err());
        assert!(root.set_local(0, Value::Null).is_err());
        assert!(root.global(0).is_err());
    }
}
