//! Operator catalogs.
//!
//! The deferred and memory catalogs are process-wide immutable tables
//! built once at first use. User operators go through the external
//! registry, which keeps a public tier and an internal tier; lookups
//! prefer the public tier.

use std::sync::LazyLock;

use hashbrown::HashMap;
use parking_lot::RwLock;
use sequery_error::{QueryError, Result};

use super::builtin::{grouping, scalar, sequence};
use super::{
    ArgFixup, CandidateSignature, CatalogId, OperatorDesc, OperatorEval, OperatorRef,
    OperatorSignature, ResolvedOperator, displayable_types,
};
use crate::types::datatype::DataType;

/// Minimum similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.7;

#[derive(Debug)]
pub struct Catalog {
    id: CatalogId,
    ops: Vec<OperatorDesc>,
    by_name: HashMap<&'static str, Vec<usize>>,
}

impl Catalog {
    fn new(id: CatalogId, ops: Vec<OperatorDesc>) -> Self {
        let mut by_name: HashMap<&'static str, Vec<usize>> = HashMap::new();
        for (idx, op) in ops.iter().enumerate() {
            by_name.entry(op.name).or_default().push(idx);
        }
        Catalog { id, ops, by_name }
    }

    pub fn get(&self, idx: usize) -> Option<&OperatorDesc> {
        self.ops.get(idx)
    }

    /// Indices of all operators sharing a name, in catalog order.
    pub fn ops_with_name(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Resolve the best-matching overload for the given arguments.
    pub fn resolve(
        &self,
        name: &str,
        type_args: &[DataType],
        arg_types: &[DataType],
    ) -> Result<ResolvedOperator> {
        let indices = self.ops_with_name(name);
        if indices.is_empty() {
            let mut msg = format!("Unknown operator '{name}'");
            if let Some(suggestion) = self.suggest(name) {
                msg.push_str(&format!(", did you mean '{suggestion}'?"));
            }
            return Err(QueryError::new(msg));
        }

        let sigs = indices.iter().map(|&idx| (idx, &self.ops[idx].sig));
        let candidates = CandidateSignature::find_candidates(arg_types, type_args, sigs);

        match candidates.into_iter().next() {
            Some(candidate) => Ok(resolved_from_candidate(
                self.id,
                name,
                &self.ops[candidate.op_idx].sig,
                type_args,
                candidate,
            )),
            None => Err(QueryError::new(format!(
                "No overload of '{}' matches argument types ({})",
                name,
                displayable_types(arg_types)
            ))),
        }
    }

    /// Implementation for a previously resolved reference.
    pub fn eval(&self, reference: &OperatorRef) -> Result<OperatorEval> {
        let op = self.ops.get(reference.op_idx).ok_or_else(|| {
            QueryError::new(format!(
                "Internal: operator index {} out of bounds for '{}'",
                reference.op_idx, reference.name
            ))
        })?;
        op.eval.ok_or_else(|| {
            QueryError::new(format!(
                "Internal: operator '{}' has no implementation",
                reference.name
            ))
        })
    }

    /// Closest known operator name, if any is close enough.
    fn suggest(&self, name: &str) -> Option<&'static str> {
        self.by_name
            .keys()
            .map(|known| (*known, strsim::jaro_winkler(name, known)))
            .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(known, _)| known)
    }
}

fn resolved_from_candidate(
    catalog: CatalogId,
    name: &str,
    sig: &OperatorSignature,
    type_args: &[DataType],
    candidate: CandidateSignature,
) -> ResolvedOperator {
    ResolvedOperator {
        reference: OperatorRef {
            catalog,
            op_idx: candidate.op_idx,
            name: name.to_string(),
            type_args: type_args.to_vec(),
            params: sig.params.iter().map(|p| p.substitute(type_args)).collect(),
            return_type: sig.return_type.substitute(type_args),
        },
        fixups: candidate.fixups,
    }
}

fn var(n: usize) -> DataType {
    DataType::Var(n)
}

static DEFERRED_CATALOG: LazyLock<Catalog> = LazyLock::new(|| {
    let ops = vec![
        OperatorDesc::descriptor(
            "filter",
            1,
            vec![
                DataType::query(var(0)),
                DataType::quoted([var(0)], DataType::Bool),
            ],
            DataType::query(var(0)),
        ),
        OperatorDesc::descriptor(
            "map",
            2,
            vec![
                DataType::query(var(0)),
                DataType::quoted([var(0)], var(1)),
            ],
            DataType::query(var(1)),
        ),
        OperatorDesc::descriptor(
            "group_by",
            2,
            vec![
                DataType::query(var(0)),
                DataType::quoted([var(0)], var(1)),
            ],
            DataType::query(DataType::group(var(1), var(0))),
        ),
        OperatorDesc::descriptor(
            "group_by",
            3,
            vec![
                DataType::query(var(0)),
                DataType::quoted([var(0)], var(1)),
                DataType::quoted([var(0)], var(2)),
            ],
            DataType::query(DataType::group(var(1), var(2))),
        ),
        OperatorDesc::descriptor(
            "order_by",
            2,
            vec![
                DataType::query(var(0)),
                DataType::quoted([var(0)], var(1)),
            ],
            DataType::query(var(0)),
        ),
        OperatorDesc::descriptor(
            "join",
            4,
            vec![
                DataType::query(var(0)),
                DataType::seq(var(1)),
                DataType::quoted([var(0)], var(2)),
                DataType::quoted([var(1)], var(2)),
                DataType::quoted([var(0), var(1)], var(3)),
            ],
            DataType::query(var(3)),
        ),
        OperatorDesc::descriptor(
            "take",
            1,
            vec![DataType::query(var(0)), DataType::Int64],
            DataType::query(var(0)),
        ),
    ];
    Catalog::new(CatalogId::Deferred, ops)
});

static MEMORY_CATALOG: LazyLock<Catalog> = LazyLock::new(|| {
    let ops = vec![
        // Sequence operators.
        OperatorDesc::new(
            "filter",
            1,
            vec![
                DataType::seq(var(0)),
                DataType::func([var(0)], DataType::Bool),
            ],
            DataType::seq(var(0)),
            sequence::filter,
        ),
        OperatorDesc::new(
            "map",
            2,
            vec![DataType::seq(var(0)), DataType::func([var(0)], var(1))],
            DataType::seq(var(1)),
            sequence::map,
        ),
        OperatorDesc::new(
            "map_indexed",
            2,
            vec![
                DataType::seq(var(0)),
                DataType::func([var(0), DataType::Int64], var(1)),
            ],
            DataType::seq(var(1)),
            sequence::map_indexed,
        ),
        OperatorDesc::new(
            "group_by",
            2,
            vec![DataType::seq(var(0)), DataType::func([var(0)], var(1))],
            DataType::seq(DataType::group(var(1), var(0))),
            grouping::group_by,
        ),
        OperatorDesc::new(
            "group_by",
            3,
            vec![
                DataType::seq(var(0)),
                DataType::func([var(0)], var(1)),
                DataType::func([var(0)], var(2)),
            ],
            DataType::seq(DataType::group(var(1), var(2))),
            grouping::group_by_elem,
        ),
        OperatorDesc::new(
            "order_by",
            2,
            vec![DataType::seq(var(0)), DataType::func([var(0)], var(1))],
            DataType::seq(var(0)),
            sequence::order_by,
        ),
        OperatorDesc::new(
            "join",
            4,
            vec![
                DataType::seq(var(0)),
                DataType::seq(var(1)),
                DataType::func([var(0)], var(2)),
                DataType::func([var(1)], var(2)),
                DataType::func([var(0), var(1)], var(3)),
            ],
            DataType::seq(var(3)),
            grouping::join,
        ),
        OperatorDesc::new(
            "take",
            1,
            vec![DataType::seq(var(0)), DataType::Int64],
            DataType::seq(var(0)),
            sequence::take,
        ),
        OperatorDesc::new(
            "count",
            1,
            vec![DataType::seq(var(0))],
            DataType::Int64,
            sequence::count,
        ),
        // Scalar helpers for lambda bodies. Int64 overloads come first
        // so ties break towards integer arithmetic.
        OperatorDesc::new(
            "add",
            0,
            vec![DataType::Int64, DataType::Int64],
            DataType::Int64,
            scalar::add_int64,
        ),
        OperatorDesc::new(
            "add",
            0,
            vec![DataType::Float64, DataType::Float64],
            DataType::Float64,
            scalar::add_float64,
        ),
        OperatorDesc::new(
            "sub",
            0,
            vec![DataType::Int64, DataType::Int64],
            DataType::Int64,
            scalar::sub_int64,
        ),
        OperatorDesc::new(
            "sub",
            0,
            vec![DataType::Float64, DataType::Float64],
            DataType::Float64,
            scalar::sub_float64,
        ),
        OperatorDesc::new(
            "mul",
            0,
            vec![DataType::Int64, DataType::Int64],
            DataType::Int64,
            scalar::mul_int64,
        ),
        OperatorDesc::new(
            "mul",
            0,
            vec![DataType::Float64, DataType::Float64],
            DataType::Float64,
            scalar::mul_float64,
        ),
        OperatorDesc::new(
            "rem",
            0,
            vec![DataType::Int64, DataType::Int64],
            DataType::Int64,
            scalar::rem_int64,
        ),
        OperatorDesc::new(
            "gt",
            0,
            vec![DataType::Int64, DataType::Int64],
            DataType::Bool,
            scalar::gt,
        ),
        OperatorDesc::new(
            "gt",
            0,
            vec![DataType::Float64, DataType::Float64],
            DataType::Bool,
            scalar::gt,
        ),
        OperatorDesc::new(
            "gt",
            0,
            vec![DataType::Utf8, DataType::Utf8],
            DataType::Bool,
            scalar::gt,
        ),
        OperatorDesc::new(
            "lt",
            0,
            vec![DataType::Int64, DataType::Int64],
            DataType::Bool,
            scalar::lt,
        ),
        OperatorDesc::new(
            "lt",
            0,
            vec![DataType::Float64, DataType::Float64],
            DataType::Bool,
            scalar::lt,
        ),
        OperatorDesc::new(
            "lt",
            0,
            vec![DataType::Utf8, DataType::Utf8],
            DataType::Bool,
            scalar::lt,
        ),
        OperatorDesc::new(
            "eq",
            0,
            vec![DataType::Any, DataType::Any],
            DataType::Bool,
            scalar::eq,
        ),
    ];
    Catalog::new(CatalogId::Memory, ops)
});

pub fn deferred_catalog() -> &'static Catalog {
    &DEFERRED_CATALOG
}

pub fn memory_catalog() -> &'static Catalog {
    &MEMORY_CATALOG
}

/// Visibility tier of an external operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorVisibility {
    Public,
    Internal,
}

/// User-registered operator.
#[derive(Debug, Clone)]
pub struct ExternalOperator {
    pub name: String,
    pub sig: OperatorSignature,
    pub eval: OperatorEval,
    pub visibility: OperatorVisibility,
}

static EXTERNAL_OPERATORS: LazyLock<RwLock<Vec<ExternalOperator>>> =
    LazyLock::new(|| RwLock::new(Vec::new()));

/// Register an external operator, returning its registry index.
///
/// The registry is append-only so indices stay stable for the lifetime
/// of the process.
pub fn register_external_operator(op: ExternalOperator) -> usize {
    let mut ops = EXTERNAL_OPERATORS.write();
    ops.push(op);
    ops.len() - 1
}

/// Resolve an external operator: public tier first, internal tier only
/// when no public overload matches.
pub fn resolve_external(
    name: &str,
    type_args: &[DataType],
    arg_types: &[DataType],
) -> Result<ResolvedOperator> {
    let ops = EXTERNAL_OPERATORS.read();

    let mut found_name = false;
    for visibility in [OperatorVisibility::Public, OperatorVisibility::Internal] {
        let sigs = ops.iter().enumerate().filter_map(|(idx, op)| {
            (op.name == name && op.visibility == visibility).then_some((idx, &op.sig))
        });
        found_name |= ops
            .iter()
            .any(|op| op.name == name && op.visibility == visibility);

        let candidates = CandidateSignature::find_candidates(arg_types, type_args, sigs);
        if let Some(candidate) = candidates.into_iter().next() {
            let sig = ops[candidate.op_idx].sig.clone();
            return Ok(resolved_from_candidate(
                CatalogId::External,
                name,
                &sig,
                type_args,
                candidate,
            ));
        }
    }

    if found_name {
        Err(QueryError::new(format!(
            "No overload of external operator '{}' matches argument types ({})",
            name,
            displayable_types(arg_types)
        )))
    } else {
        Err(QueryError::new(format!(
            "Unknown external operator '{name}'"
        )))
    }
}

pub fn external_eval(reference: &OperatorRef) -> Result<OperatorEval> {
    let ops = EXTERNAL_OPERATORS.read();
    ops.get(reference.op_idx).map(|op| op.eval).ok_or_else(|| {
        QueryError::new(format!(
            "Internal: external operator index {} out of bounds for '{}'",
            reference.op_idx, reference.name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_suggests_near_miss() {
        let err = memory_catalog().resolve("fitler", &[], &[]).unwrap_err();
        assert!(err.msg.contains("filter"), "{}", err.msg);
    }

    #[test]
    fn resolve_substitutes_return_type() {
        let resolved = memory_catalog()
            .resolve(
                "map",
                &[DataType::Int64, DataType::Utf8],
                &[
                    DataType::seq(DataType::Int64),
                    DataType::func([DataType::Int64], DataType::Utf8),
                ],
            )
            .unwrap();
        assert_eq!(
            DataType::seq(DataType::Utf8),
            resolved.reference.return_type
        );
        assert!(!resolved.needs_fixup());
    }

    #[test]
    fn group_by_overloads_disambiguate_by_arity() {
        let keyed = memory_catalog()
            .resolve(
                "group_by",
                &[DataType::Int64, DataType::Utf8],
                &[
                    DataType::seq(DataType::Int64),
                    DataType::func([DataType::Int64], DataType::Utf8),
                ],
            )
            .unwrap();
        assert_eq!(
            DataType::seq(DataType::group(DataType::Utf8, DataType::Int64)),
            keyed.reference.return_type
        );

        let projected = memory_catalog()
            .resolve(
                "group_by",
                &[DataType::Int64, DataType::Utf8, DataType::Bool],
                &[
                    DataType::seq(DataType::Int64),
                    DataType::func([DataType::Int64], DataType::Utf8),
                    DataType::func([DataType::Int64], DataType::Bool),
                ],
            )
            .unwrap();
        assert_eq!(
            DataType::seq(DataType::group(DataType::Utf8, DataType::Bool)),
            projected.reference.return_type
        );
    }

    #[test]
    fn external_registry_prefers_public_tier() {
        use crate::types::value::Value;

        fn internal_impl(_args: &[Value]) -> Result<Value> {
            Ok(Value::Int64(1))
        }
        fn public_impl(_args: &[Value]) -> Result<Value> {
            Ok(Value::Int64(2))
        }

        let sig = OperatorSignature {
            params: vec![DataType::Int64],
            generic_arity: 0,
            return_type: DataType::Int64,
        };
        register_external_operator(ExternalOperator {
            name: "tiered_op".to_string(),
            sig: sig.clone(),
            eval: internal_impl,
            visibility: OperatorVisibility::Internal,
        });
        register_external_operator(ExternalOperator {
            name: "tiered_op".to_string(),
            sig,
            eval: public_impl,
            visibility: OperatorVisibility::Public,
        });

        let resolved = resolve_external("tiered_op", &[], &[DataType::Int64]).unwrap();
        let eval = external_eval(&resolved.reference).unwrap();
        assert_eq!(Value::Int64(2), eval(&[Value::Int64(0)]).unwrap());
    }

    #[test]
    fn external_internal_tier_is_fallback() {
        use crate::types::value::Value;

        fn internal_impl(_args: &[Value]) -> Result<Value> {
            Ok(Value::Int64(7))
        }

        register_external_operator(ExternalOperator {
            name: "internal_only_op".to_string(),
            sig: OperatorSignature {
                params: vec![],
                generic_arity: 0,
                return_type: DataType::Int64,
            },
            eval: internal_impl,
            visibility: OperatorVisibility::Internal,
        });

        let resolved = resolve_external("internal_only_op", &[], &[]).unwrap();
        let eval = external_eval(&resolved.reference).unwrap();
        assert_eq!(Value::Int64(7), eval(&[]).unwrap());

        assert!(resolve_external("no_such_op", &[], &[]).is_err());
    }

    #[test]
    fn deferred_ops_have_no_eval() {
        let resolved = deferred_catalog()
            .resolve(
                "take",
                &[DataType::Int64],
                &[DataType::query(DataType::Int64), DataType::Int64],
            )
            .unwrap();
        assert!(super::super::operator_eval(&resolved.reference).is_err());
    }
}
