//! Scalar helpers usable inside lambda bodies.

use std::cmp::Ordering;

use sequery_error::{QueryError, Result};

use super::check_num_args;
use crate::types::value::Value;

pub fn add_int64(args: &[Value]) -> Result<Value> {
    checked_int_op("add", args, i64::checked_add)
}

pub fn sub_int64(args: &[Value]) -> Result<Value> {
    checked_int_op("sub", args, i64::checked_sub)
}

pub fn mul_int64(args: &[Value]) -> Result<Value> {
    checked_int_op("mul", args, i64::checked_mul)
}

pub fn rem_int64(args: &[Value]) -> Result<Value> {
    check_num_args("rem", args, 2)?;
    let a = args[0].try_as_i64()?;
    let b = args[1].try_as_i64()?;
    a.checked_rem(b)
        .map(Value::Int64)
        .ok_or_else(|| QueryError::new("Division by zero in 'rem'"))
}

pub fn add_float64(args: &[Value]) -> Result<Value> {
    float_op("add", args, |a, b| a + b)
}

pub fn sub_float64(args: &[Value]) -> Result<Value> {
    float_op("sub", args, |a, b| a - b)
}

pub fn mul_float64(args: &[Value]) -> Result<Value> {
    float_op("mul", args, |a, b| a * b)
}

pub fn gt(args: &[Value]) -> Result<Value> {
    compare(args, Ordering::Greater)
}

pub fn lt(args: &[Value]) -> Result<Value> {
    compare(args, Ordering::Less)
}

pub fn eq(args: &[Value]) -> Result<Value> {
    check_num_args("eq", args, 2)?;
    Ok(Value::Bool(args[0] == args[1]))
}

fn checked_int_op(
    name: &'static str,
    args: &[Value],
    op: fn(i64, i64) -> Option<i64>,
) -> Result<Value> {
    check_num_args(name, args, 2)?;
    let a = args[0].try_as_i64()?;
    let b = args[1].try_as_i64()?;
    op(a, b)
        .map(Value::Int64)
        .ok_or_else(|| QueryError::new(format!("Int64 overflow in '{name}'")))
}

fn float_op(name: &'static str, args: &[Value], op: fn(f64, f64) -> f64) -> Result<Value> {
    check_num_args(name, args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Float64(a), Value::Float64(b)) => Ok(Value::Float64(op(*a, *b))),
        (a, b) => Err(QueryError::new(format!(
            "Expected two float64 values, got {} and {}",
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

fn compare(args: &[Value], want: Ordering) -> Result<Value> {
    check_num_args("compare", args, 2)?;
    let ord = args[0].try_cmp(&args[1])?;
    Ok(Value::Bool(ord == want))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_overflow_errors() {
        assert!(add_int64(&[Value::Int64(i64::MAX), Value::Int64(1)]).is_err());
        assert_eq!(
            Value::Int64(3),
            add_int64(&[Value::Int64(1), Value::Int64(2)]).unwrap()
        );
    }

    #[test]
    fn rem_by_zero_errors() {
        assert!(rem_int64(&[Value::Int64(1), Value::Int64(0)]).is_err());
    }

    #[test]
    fn compare_strings() {
        assert_eq!(
            Value::Bool(true),
            gt(&[Value::from("b"), Value::from("a")]).unwrap()
        );
    }

    #[test]
    fn eq_across_kinds_is_false() {
        assert_eq!(
            Value::Bool(false),
            eq(&[Value::Int64(1), Value::from("1")]).unwrap()
        );
    }
}
