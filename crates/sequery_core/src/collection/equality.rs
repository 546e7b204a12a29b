//! Pluggable equality for keys and elements.

use std::fmt::Debug;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::types::value::Value;

/// Hash bucket shared by all null keys.
///
/// Nulls are normalized to a single sentinel bucket so a null key
/// behaves like any other key rather than poisoning the index.
const NULL_KEY_HASH: u64 = 0;

/// Equality abstraction used wherever keys or elements are compared.
pub trait EqualityComparer: Debug {
    fn eq(&self, a: &Value, b: &Value) -> bool;
    fn hash(&self, value: &Value) -> u64;
}

/// Default equality: structural value equality with a fixed-seed ahash.
///
/// Seeds are fixed so hashes are stable within a process; the hash is
/// only ever an index into in-process containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEquality;

impl EqualityComparer for DefaultEquality {
    fn eq(&self, a: &Value, b: &Value) -> bool {
        a == b
    }

    fn hash(&self, value: &Value) -> u64 {
        if matches!(value, Value::Null) {
            return NULL_KEY_HASH;
        }

        let state = ahash::RandomState::with_seeds(17, 29, 5, 11);
        let mut hasher = state.build_hasher();
        hash_value(value, &mut hasher);
        hasher.finish()
    }
}

fn hash_value(value: &Value, hasher: &mut impl Hasher) {
    std::mem::discriminant(value).hash(hasher);
    match value {
        Value::Null => {}
        Value::Bool(v) => v.hash(hasher),
        Value::Int64(v) => v.hash(hasher),
        Value::Float64(v) => v.to_bits().hash(hasher),
        Value::Utf8(v) => v.hash(hasher),
        Value::Seq(values) => {
            values.len().hash(hasher);
            for v in values.iter() {
                hash_value(v, hasher);
            }
        }
        Value::Group(group) => {
            hash_value(group.key(), hasher);
            for v in group.to_vec() {
                hash_value(&v, hasher);
            }
        }
        // Functions and queries hash by identity; they are legal but
        // unusual keys.
        Value::Func(_) | Value::Query(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_hash_equal() {
        let cmp = DefaultEquality;
        assert_eq!(cmp.hash(&Value::Int64(42)), cmp.hash(&Value::Int64(42)));
        assert_ne!(cmp.hash(&Value::Int64(1)), cmp.hash(&Value::Int64(2)));
    }

    #[test]
    fn nulls_share_a_bucket() {
        let cmp = DefaultEquality;
        assert_eq!(NULL_KEY_HASH, cmp.hash(&Value::Null));
        assert!(cmp.eq(&Value::Null, &Value::Null));
    }

    #[test]
    fn seq_hash_is_structural() {
        let cmp = DefaultEquality;
        let a = Value::seq(vec![Value::Int64(1), Value::Int64(2)]);
        let b = Value::seq(vec![Value::Int64(1), Value::Int64(2)]);
        assert_eq!(cmp.hash(&a), cmp.hash(&b));
    }
}
