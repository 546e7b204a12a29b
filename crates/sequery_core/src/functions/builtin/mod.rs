//! Builtin in-memory operator implementations.

pub mod grouping;
pub mod scalar;
pub mod sequence;

use sequery_error::{QueryError, Result};

use crate::types::value::Value;

/// Check the number of arguments provided, erroring if it doesn't match
/// the expected number.
pub(crate) fn check_num_args(name: &'static str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(QueryError::new(format!(
            "Expected {} arguments for '{}', received {}",
            expected,
            name,
            args.len()
        )));
    }
    Ok(())
}
