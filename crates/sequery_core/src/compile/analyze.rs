//! Variable binding for lambda frames.

use std::rc::Rc;

use sequery_error::{QueryError, Result};

use crate::expr::parameter_expr::ParameterExpr;
use crate::types::value::Value;

/// Where a parameter reference lands at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef {
    /// Scopes between the reference and the declaring frame. Zero is
    /// the innermost enclosing lambda.
    pub depth: usize,
    /// Hoisted slot within the declaring frame.
    pub slot: usize,
}

/// Hoisted locals of one lambda under compilation.
///
/// Slots are assigned in parameter order. Parameters are matched by
/// identity, so two parameters with the same name stay distinct.
#[derive(Debug)]
pub struct FrameDescriptor {
    params: Vec<Rc<ParameterExpr>>,
}

impl FrameDescriptor {
    pub fn new(params: &[Rc<ParameterExpr>]) -> Self {
        FrameDescriptor {
            params: params.to_vec(),
        }
    }

    pub fn num_locals(&self) -> usize {
        self.params.len()
    }

    fn slot_of(&self, param: &Rc<ParameterExpr>) -> Option<usize> {
        self.params.iter().position(|p| Rc::ptr_eq(p, param))
    }
}

/// Stack of frames for the lambdas enclosing the node being compiled,
/// innermost last.
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<FrameDescriptor>,
}

impl FrameStack {
    pub fn push(&mut self, frame: FrameDescriptor) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Resolve a parameter reference to its frame and slot.
    pub fn resolve(&self, param: &Rc<ParameterExpr>) -> Result<VarRef> {
        for (depth, frame) in self.frames.iter().rev().enumerate() {
            if let Some(slot) = frame.slot_of(param) {
                return Ok(VarRef { depth, slot });
            }
        }
        Err(QueryError::new(format!(
            "Parameter '{}' is not bound by any enclosing lambda",
            param.name
        )))
    }
}

/// Constants lifted out of the tree, indexed by compiled closures.
#[derive(Debug, Default)]
pub struct GlobalTable {
    values: Vec<Value>,
}

impl GlobalTable {
    pub fn push(&mut self, value: Value) -> usize {
        let idx = self.values.len();
        self.values.push(value);
        idx
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Rc<[Value]> {
        Rc::from(self.values)
    }
}
