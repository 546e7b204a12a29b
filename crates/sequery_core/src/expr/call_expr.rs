use std::fmt;
use std::rc::Rc;

use super::Expression;
use crate::functions::OperatorRef;

/// Invocation of a catalog operator.
///
/// Operators are free-standing; there is no instance target. The
/// resolved `OperatorRef` pins the operator to a catalog entry along
/// with the generic type arguments it was instantiated with.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub operator: OperatorRef,
    pub arguments: Vec<Rc<Expression>>,
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operator.name)?;
        for (idx, arg) in self.arguments.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}
