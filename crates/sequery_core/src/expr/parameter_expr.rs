use std::fmt;

use crate::types::datatype::DataType;

/// Unbound variable introduced by a lambda.
///
/// Parameters are identity-compared: the same `Rc<ParameterExpr>` is
/// shared between a lambda's parameter list and every reference in its
/// body. Two parameters with equal names are still distinct variables.
#[derive(Debug)]
pub struct ParameterExpr {
    pub name: String,
    pub datatype: DataType,
}

impl fmt::Display for ParameterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
