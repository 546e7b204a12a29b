use std::fmt;
use std::rc::Rc;

use super::Expression;
use crate::types::datatype::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct NewArrayExpr {
    pub element_type: DataType,
    pub initializers: Vec<Rc<Expression>>,
}

impl fmt::Display for NewArrayExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, init) in self.initializers.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{init}")?;
        }
        write!(f, "]")
    }
}
