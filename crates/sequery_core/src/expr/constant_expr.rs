use std::fmt;

use crate::types::datatype::DataType;
use crate::types::value::Value;

/// Literal value with its declared static type.
///
/// The declared type participates in assignability checks during
/// operator resolution and may be wider than the value itself (e.g. a
/// widened element type for a materialized nested query).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantExpr {
    pub value: Value,
    pub datatype: DataType,
}

impl fmt::Display for ConstantExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
