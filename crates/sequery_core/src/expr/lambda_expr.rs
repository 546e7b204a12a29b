use std::fmt;
use std::rc::Rc;

use super::Expression;
use super::parameter_expr::ParameterExpr;
use crate::types::datatype::{DataType, FuncType};

#[derive(Debug, Clone)]
pub struct LambdaExpr {
    pub params: Vec<Rc<ParameterExpr>>,
    pub body: Rc<Expression>,
    pub result_type: DataType,
}

impl LambdaExpr {
    pub fn func_type(&self) -> FuncType {
        FuncType {
            params: self.params.iter().map(|p| p.datatype.clone()).collect(),
            return_type: Box::new(self.result_type.clone()),
        }
    }
}

impl PartialEq for LambdaExpr {
    fn eq(&self, other: &Self) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| Rc::ptr_eq(a, b))
            && self.body == other.body
            && self.result_type == other.result_type
    }
}

impl fmt::Display for LambdaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.body)
    }
}
