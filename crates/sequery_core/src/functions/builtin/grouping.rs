//! Grouping and join operators, backed by the order-preserving Lookup.

use std::slice;

use sequery_error::Result;

use super::check_num_args;
use crate::collection::lookup::Lookup;
use crate::types::value::{FuncValue, Value};

pub fn group_by(args: &[Value]) -> Result<Value> {
    check_num_args("group_by", args, 2)?;
    let lookup = build_lookup(&args[0], args[1].try_as_func()?, None)?;
    Ok(groups_value(lookup))
}

pub fn group_by_elem(args: &[Value]) -> Result<Value> {
    check_num_args("group_by", args, 3)?;
    let lookup = build_lookup(
        &args[0],
        args[1].try_as_func()?,
        Some(args[2].try_as_func()?),
    )?;
    Ok(groups_value(lookup))
}

pub fn join(args: &[Value]) -> Result<Value> {
    check_num_args("join", args, 5)?;
    let outer = args[0].try_as_seq()?;
    let outer_key = args[2].try_as_func()?;
    let inner_key = args[3].try_as_func()?;
    let result = args[4].try_as_func()?;

    // Index the inner side once; probe per outer element.
    let lookup = build_lookup(&args[1], inner_key, None)?;

    let mut out = Vec::new();
    for outer_value in outer.iter() {
        let key = outer_key.call(slice::from_ref(outer_value))?;
        if let Some(group) = lookup.get(&key) {
            for inner_value in group.to_vec() {
                out.push(result.call(&[outer_value.clone(), inner_value])?);
            }
        }
    }
    Ok(Value::seq(out))
}

/// Build a lookup keyed by the selector, preserving the first-seen
/// order of keys. Key dedup happens here, not in the Lookup.
fn build_lookup(
    source: &Value,
    key_selector: &FuncValue,
    elem_selector: Option<&FuncValue>,
) -> Result<Lookup> {
    let source = source.try_as_seq()?;
    let mut lookup = Lookup::new();

    for value in source.iter() {
        let key = key_selector.call(slice::from_ref(value))?;
        let elem = match elem_selector {
            Some(selector) => selector.call(slice::from_ref(value))?,
            None => value.clone(),
        };

        match lookup.position(&key) {
            Some(idx) => lookup.append(idx, elem)?,
            None => {
                lookup.add(key, elem)?;
            }
        }
    }

    Ok(lookup)
}

fn groups_value(lookup: Lookup) -> Value {
    Value::seq(lookup.iter().map(|g| Value::Group(g.clone())).collect())
}
