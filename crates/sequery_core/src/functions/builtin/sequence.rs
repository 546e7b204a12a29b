//! Sequence operators.

use std::cmp::Ordering;
use std::slice;

use sequery_error::Result;

use super::check_num_args;
use crate::types::value::Value;

pub fn filter(args: &[Value]) -> Result<Value> {
    check_num_args("filter", args, 2)?;
    let source = args[0].try_as_seq()?;
    let predicate = args[1].try_as_func()?;

    let mut out = Vec::new();
    for value in source.iter() {
        if predicate.call(slice::from_ref(value))?.try_as_bool()? {
            out.push(value.clone());
        }
    }
    Ok(Value::seq(out))
}

pub fn map(args: &[Value]) -> Result<Value> {
    check_num_args("map", args, 2)?;
    let source = args[0].try_as_seq()?;
    let selector = args[1].try_as_func()?;

    source
        .iter()
        .map(|value| selector.call(slice::from_ref(value)))
        .collect::<Result<Vec<_>>>()
        .map(Value::seq)
}

pub fn map_indexed(args: &[Value]) -> Result<Value> {
    check_num_args("map_indexed", args, 2)?;
    let source = args[0].try_as_seq()?;
    let selector = args[1].try_as_func()?;

    source
        .iter()
        .enumerate()
        .map(|(idx, value)| selector.call(&[value.clone(), Value::Int64(idx as i64)]))
        .collect::<Result<Vec<_>>>()
        .map(Value::seq)
}

pub fn order_by(args: &[Value]) -> Result<Value> {
    check_num_args("order_by", args, 2)?;
    let source = args[0].try_as_seq()?;
    let key_selector = args[1].try_as_func()?;

    let mut keyed: Vec<(Value, Value)> = source
        .iter()
        .map(|value| Ok((key_selector.call(slice::from_ref(value))?, value.clone())))
        .collect::<Result<_>>()?;

    // Validate all keys are mutually comparable up front so the sort
    // itself cannot fail.
    if let Some((first, _)) = keyed.first() {
        for (key, _) in &keyed[1..] {
            first.try_cmp(key)?;
        }
    }

    // Stable, so equal keys keep source order.
    keyed.sort_by(|a, b| a.0.try_cmp(&b.0).unwrap_or(Ordering::Equal));

    Ok(Value::seq(keyed.into_iter().map(|(_, v)| v).collect()))
}

pub fn take(args: &[Value]) -> Result<Value> {
    check_num_args("take", args, 2)?;
    let source = args[0].try_as_seq()?;
    let count = args[1].try_as_i64()?.max(0) as usize;

    Ok(Value::seq(source.iter().take(count).cloned().collect()))
}

pub fn count(args: &[Value]) -> Result<Value> {
    check_num_args("count", args, 1)?;
    let source = args[0].try_as_seq()?;
    Ok(Value::Int64(source.len() as i64))
}
