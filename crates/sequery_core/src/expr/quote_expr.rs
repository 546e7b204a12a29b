use std::fmt;
use std::rc::Rc;

use super::Expression;
use super::lambda_expr::LambdaExpr;

/// Marks a lambda that must survive as a tree.
///
/// Deferred-catalog operators take quoted lambdas; the rewriter unwraps
/// the quote when the in-memory target expects a plain callable.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteExpr {
    /// Always a `Expression::Lambda`, enforced by `expr::quote`.
    pub inner: Rc<Expression>,
}

impl QuoteExpr {
    pub fn inner_lambda(&self) -> Option<&LambdaExpr> {
        match self.inner.as_ref() {
            Expression::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }
}

impl fmt::Display for QuoteExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quote({})", self.inner)
    }
}
