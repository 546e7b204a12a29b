use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use sequery_error::{QueryError, Result};

use crate::collection::lookup::Grouping;
use crate::compile::scope::ExecutionScope;
use crate::query::DeferredQuery;
use crate::types::datatype::DataType;

/// Runtime value flowing through compiled queries.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// Materialized sequence. Shared, never mutated after construction.
    Seq(Rc<Vec<Value>>),
    /// A grouping produced by a grouping operator.
    Group(Rc<Grouping>),
    /// A callable, either a builtin or a compiled lambda.
    Func(FuncValue),
    /// A nested deferred query.
    Query(DeferredQuery),
}

impl Value {
    pub fn seq(values: Vec<Value>) -> Self {
        Value::Seq(Rc::new(values))
    }

    /// Best-effort static type of this value.
    ///
    /// Sequence element types are taken from the first element, or `Any`
    /// when empty. Good enough for constants introduced by builders;
    /// nodes built by the rewriter carry explicitly computed types.
    pub fn datatype(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::Utf8(_) => DataType::Utf8,
            Value::Seq(values) => DataType::seq(
                values
                    .first()
                    .map(|v| v.datatype())
                    .unwrap_or(DataType::Any),
            ),
            Value::Group(group) => DataType::group(
                group.key().datatype(),
                group
                    .first()
                    .map(|v| v.datatype())
                    .unwrap_or(DataType::Any),
            ),
            Value::Func(_) => DataType::Any,
            Value::Query(query) => DataType::query(query.element_type().clone()),
        }
    }

    /// Name of this value's kind, for error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::Utf8(_) => "utf8",
            Value::Seq(_) => "sequence",
            Value::Group(_) => "grouping",
            Value::Func(_) => "function",
            Value::Query(_) => "query",
        }
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(QueryError::new(format!(
                "Expected a bool, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Value::Int64(v) => Ok(*v),
            other => Err(QueryError::new(format!(
                "Expected an int64, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn try_as_seq(&self) -> Result<Rc<Vec<Value>>> {
        match self {
            Value::Seq(values) => Ok(values.clone()),
            Value::Group(group) => Ok(Rc::new(group.to_vec())),
            Value::Query(query) => query.enumerate(),
            other => Err(QueryError::new(format!(
                "Expected a sequence, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn try_as_func(&self) -> Result<&FuncValue> {
        match self {
            Value::Func(func) => Ok(func),
            other => Err(QueryError::new(format!(
                "Expected a function, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Compare two scalar values.
    ///
    /// Errors on non-scalars and mismatched kinds. Floats compare by
    /// total order so sorting never panics on NaN.
    pub fn try_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Ok(a.cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => Ok(a.total_cmp(b)),
            (Value::Utf8(a), Value::Utf8(b)) => Ok(a.cmp(b)),
            (a, b) => Err(QueryError::new(format!(
                "Cannot compare {} with {}",
                a.kind_name(),
                b.kind_name()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b) == Ordering::Equal,
            (Value::Utf8(a), Value::Utf8(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Group(a), Value::Group(b)) => {
                a.key() == b.key() && a.to_vec() == b.to_vec()
            }
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(&a.func, &b.func),
            (Value::Query(a), Value::Query(b)) => a.same_instance(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Utf8(v) => write!(f, "{v}"),
            Value::Seq(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Group(group) => {
                write!(f, "{}: [", group.key())?;
                for (idx, value) in group.to_vec().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Func(_) => write!(f, "<function>"),
            Value::Query(query) => write!(f, "{query}"),
        }
    }
}

/// A callable value.
///
/// Compiled lambdas carry the execution scope they captured so nested
/// closures can reach hoisted variables through the parent chain.
#[derive(Clone)]
pub struct FuncValue {
    func: Rc<dyn Fn(&[Value]) -> Result<Value>>,
    scope: Option<Rc<ExecutionScope>>,
}

impl FuncValue {
    /// Wrap a plain function with no captured scope.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        FuncValue {
            func: Rc::new(f),
            scope: None,
        }
    }

    pub(crate) fn with_scope<F>(f: F, scope: Rc<ExecutionScope>) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        FuncValue {
            func: Rc::new(f),
            scope: Some(scope),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }

    /// The scope this callable captured, if it was produced by compiling
    /// a lambda inside an enclosing frame.
    pub fn captured_scope(&self) -> Option<&Rc<ExecutionScope>> {
        self.scope.as_ref()
    }
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncValue")
            .field("captured_scope", &self.scope.is_some())
            .finish_non_exhaustive()
    }
}
