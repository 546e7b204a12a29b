//! Query tree model.
//!
//! Nodes are immutable after construction and shared via `Rc`, letting
//! the rewriter return unchanged subtrees by reference. Builder helpers
//! validate argument types eagerly so malformed trees fail at
//! construction rather than deep inside rewrite or compile.

pub mod call_expr;
pub mod constant_expr;
pub mod convert_expr;
pub mod lambda_expr;
pub mod new_array_expr;
pub mod parameter_expr;
pub mod quote_expr;

use std::fmt;
use std::rc::Rc;

use call_expr::CallExpr;
use constant_expr::ConstantExpr;
use convert_expr::ConvertExpr;
use lambda_expr::LambdaExpr;
use new_array_expr::NewArrayExpr;
use parameter_expr::ParameterExpr;
use quote_expr::QuoteExpr;
use sequery_error::{QueryError, Result};

use crate::functions::{CatalogId, resolve_operator};
use crate::types::datatype::DataType;
use crate::types::value::Value;

#[derive(Debug, Clone)]
pub enum Expression {
    Constant(ConstantExpr),
    Parameter(Rc<ParameterExpr>),
    Call(CallExpr),
    Lambda(LambdaExpr),
    Quote(QuoteExpr),
    NewArray(NewArrayExpr),
    Convert(ConvertExpr),
}

impl Expression {
    /// Static type of the value this node evaluates to.
    pub fn datatype(&self) -> DataType {
        match self {
            Expression::Constant(c) => c.datatype.clone(),
            Expression::Parameter(p) => p.datatype.clone(),
            Expression::Call(c) => c.operator.return_type.clone(),
            Expression::Lambda(l) => DataType::Func(l.func_type()),
            Expression::Quote(q) => match q.inner_lambda() {
                Some(lambda) => DataType::Quoted(lambda.func_type()),
                None => DataType::Any,
            },
            Expression::NewArray(a) => DataType::array(a.element_type.clone()),
            Expression::Convert(c) => c.target_type.clone(),
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expression::Constant(a), Expression::Constant(b)) => a == b,
            // Parameters are variables, compared by identity.
            (Expression::Parameter(a), Expression::Parameter(b)) => Rc::ptr_eq(a, b),
            (Expression::Call(a), Expression::Call(b)) => a == b,
            (Expression::Lambda(a), Expression::Lambda(b)) => a == b,
            (Expression::Quote(a), Expression::Quote(b)) => a == b,
            (Expression::NewArray(a), Expression::NewArray(b)) => a == b,
            (Expression::Convert(a), Expression::Convert(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(c) => c.fmt(f),
            Expression::Parameter(p) => p.fmt(f),
            Expression::Call(c) => c.fmt(f),
            Expression::Lambda(l) => l.fmt(f),
            Expression::Quote(q) => q.fmt(f),
            Expression::NewArray(a) => a.fmt(f),
            Expression::Convert(c) => c.fmt(f),
        }
    }
}

/// Create a constant from a literal value, inferring the static type.
pub fn lit(value: impl Into<Value>) -> Rc<Expression> {
    let value = value.into();
    let datatype = value.datatype();
    constant(value, datatype)
}

/// Create a constant with an explicitly declared static type.
pub fn constant(value: Value, datatype: DataType) -> Rc<Expression> {
    Rc::new(Expression::Constant(ConstantExpr { value, datatype }))
}

/// Create a fresh parameter.
pub fn param(name: impl Into<String>, datatype: DataType) -> Rc<ParameterExpr> {
    Rc::new(ParameterExpr {
        name: name.into(),
        datatype,
    })
}

/// Reference a parameter inside a lambda body.
pub fn param_ref(param: &Rc<ParameterExpr>) -> Rc<Expression> {
    Rc::new(Expression::Parameter(param.clone()))
}

pub fn lambda(params: Vec<Rc<ParameterExpr>>, body: Rc<Expression>) -> Result<Rc<Expression>> {
    if params.is_empty() {
        return Err(QueryError::new("Lambda requires at least one parameter"));
    }
    let result_type = body.datatype();
    Ok(Rc::new(Expression::Lambda(LambdaExpr {
        params,
        body,
        result_type,
    })))
}

pub fn quote(inner: Rc<Expression>) -> Result<Rc<Expression>> {
    if !matches!(inner.as_ref(), Expression::Lambda(_)) {
        return Err(QueryError::new(format!(
            "Only lambdas can be quoted, got: {inner}"
        )));
    }
    Ok(Rc::new(Expression::Quote(QuoteExpr { inner })))
}

pub fn array(
    element_type: DataType,
    initializers: Vec<Rc<Expression>>,
) -> Result<Rc<Expression>> {
    for init in &initializers {
        let have = init.datatype();
        if !element_type.is_assignable_from(&have) {
            return Err(QueryError::new(format!(
                "Array initializer of type {have} is not assignable to element type {element_type}"
            )));
        }
    }
    Ok(Rc::new(Expression::NewArray(NewArrayExpr {
        element_type,
        initializers,
    })))
}

pub fn convert(operand: Rc<Expression>, target_type: DataType) -> Rc<Expression> {
    Rc::new(Expression::Convert(ConvertExpr {
        operand,
        target_type,
    }))
}

/// Build a call against the named operator in the given catalog,
/// resolving the overload from the arguments' static types.
///
/// Builders construct original trees, so every argument must fit its
/// formal exactly; fix-ups like quote-unwrapping are the rewriter's job.
pub fn call(
    catalog: CatalogId,
    name: &str,
    type_args: Vec<DataType>,
    arguments: Vec<Rc<Expression>>,
) -> Result<Rc<Expression>> {
    let arg_types: Vec<_> = arguments.iter().map(|a| a.datatype()).collect();
    let resolved = resolve_operator(catalog, name, &type_args, &arg_types)?;
    if resolved.needs_fixup() {
        return Err(QueryError::new(format!(
            "Arguments to '{name}' require quote-unwrapping; pass a quoted lambda only where the \
             operator expects one"
        )));
    }
    Ok(Rc::new(Expression::Call(CallExpr {
        operator: resolved.reference,
        arguments,
    })))
}

pub fn deferred_call(
    name: &str,
    type_args: Vec<DataType>,
    arguments: Vec<Rc<Expression>>,
) -> Result<Rc<Expression>> {
    call(CatalogId::Deferred, name, type_args, arguments)
}

pub fn memory_call(
    name: &str,
    type_args: Vec<DataType>,
    arguments: Vec<Rc<Expression>>,
) -> Result<Rc<Expression>> {
    call(CatalogId::Memory, name, type_args, arguments)
}

macro_rules! scalar_builder {
    ($name:ident) => {
        pub fn $name(left: Rc<Expression>, right: Rc<Expression>) -> Result<Rc<Expression>> {
            memory_call(stringify!($name), Vec::new(), vec![left, right])
        }
    };
}

scalar_builder!(add);
scalar_builder!(sub);
scalar_builder!(mul);
scalar_builder!(rem);
scalar_builder!(gt);
scalar_builder!(lt);
scalar_builder!(eq);
