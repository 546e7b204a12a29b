use std::fmt;
use std::rc::Rc;

use super::Expression;
use crate::types::datatype::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertExpr {
    pub operand: Rc<Expression>,
    pub target_type: DataType,
}

impl fmt::Display for ConvertExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cast({}, {})", self.operand, self.target_type)
    }
}
