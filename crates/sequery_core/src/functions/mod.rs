pub mod builtin;
pub mod catalog;

use sequery_error::{QueryError, Result};

use crate::types::datatype::DataType;
use crate::types::value::Value;

/// Score for an argument that fits its formal parameter as-is.
pub const NO_FIXUP_SCORE: u32 = 200;

/// Score for an argument that fits only after unwrapping a quote.
///
/// Kept strictly below [`NO_FIXUP_SCORE`] so an exact match always beats
/// one requiring a fix-up.
pub const UNWRAP_QUOTE_SCORE: u32 = 100;

/// Which catalog an operator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogId {
    /// Deferred-queryable operators. Descriptors only, never evaluated;
    /// the rewriter retargets them at the memory catalog.
    Deferred,
    /// In-memory sequence operators plus the scalar helpers usable
    /// inside lambda bodies.
    Memory,
    /// User-registered operators, looked up in the external registry.
    External,
}

pub type OperatorEval = fn(&[Value]) -> Result<Value>;

/// Operator signature.
///
/// Parameter types may contain `Var` placeholders; `generic_arity` is
/// the number of distinct placeholders a call must supply arguments for.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSignature {
    pub params: Vec<DataType>,
    pub generic_arity: usize,
    pub return_type: DataType,
}

/// A catalog operator descriptor.
#[derive(Debug, Clone)]
pub struct OperatorDesc {
    pub name: &'static str,
    pub sig: OperatorSignature,
    /// None for deferred operators, which exist only to be rewritten.
    pub eval: Option<OperatorEval>,
}

impl OperatorDesc {
    pub fn new(
        name: &'static str,
        generic_arity: usize,
        params: Vec<DataType>,
        return_type: DataType,
        eval: OperatorEval,
    ) -> Self {
        OperatorDesc {
            name,
            sig: OperatorSignature {
                params,
                generic_arity,
                return_type,
            },
            eval: Some(eval),
        }
    }

    /// Descriptor without an implementation.
    pub fn descriptor(
        name: &'static str,
        generic_arity: usize,
        params: Vec<DataType>,
        return_type: DataType,
    ) -> Self {
        OperatorDesc {
            name,
            sig: OperatorSignature {
                params,
                generic_arity,
                return_type,
            },
            eval: None,
        }
    }
}

/// Resolved reference to an operator inside a call node.
///
/// `params` and `return_type` are the signature after substituting
/// `type_args`, so call sites never need the placeholder form.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRef {
    pub catalog: CatalogId,
    pub op_idx: usize,
    pub name: String,
    pub type_args: Vec<DataType>,
    pub params: Vec<DataType>,
    pub return_type: DataType,
}

/// How an argument satisfies its formal parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgFixup {
    /// Fits as-is.
    None,
    /// Fits after replacing the quoted lambda (possibly inside array
    /// initializers) with its inner plain lambda.
    UnwrapQuote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSignature {
    /// Index of the operator in its catalog.
    pub op_idx: usize,
    /// Per-argument fix-ups needed to satisfy the signature.
    pub fixups: Vec<ArgFixup>,
    /// Sum of per-argument scores, higher is better.
    pub score: u32,
}

impl CandidateSignature {
    /// Find candidate operators for the given argument types.
    ///
    /// Returned candidates are sorted with the highest score first; the
    /// sort is stable so catalog order breaks ties.
    pub fn find_candidates<'a>(
        arg_types: &[DataType],
        type_args: &[DataType],
        ops: impl IntoIterator<Item = (usize, &'a OperatorSignature)>,
    ) -> Vec<Self> {
        let mut candidates = Vec::new();

        let mut buf = Vec::new();
        for (idx, sig) in ops {
            if sig.generic_arity != type_args.len() {
                continue;
            }
            if sig.params.len() != arg_types.len() {
                continue;
            }

            let Some(score) = Self::compare_and_fill_fixups(arg_types, sig, type_args, &mut buf)
            else {
                continue;
            };

            candidates.push(CandidateSignature {
                op_idx: idx,
                fixups: std::mem::take(&mut buf),
                score,
            });
        }

        candidates.sort_by_key(|c| std::cmp::Reverse(c.score));
        candidates
    }

    /// Compare the argument types we have with the substituted formals,
    /// filling the buffer with the per-argument fix-up.
    ///
    /// Returns the total score if every argument fits, None otherwise.
    fn compare_and_fill_fixups(
        have: &[DataType],
        sig: &OperatorSignature,
        type_args: &[DataType],
        buf: &mut Vec<ArgFixup>,
    ) -> Option<u32> {
        buf.clear();

        let mut score = 0;
        for (have, formal) in have.iter().zip(&sig.params) {
            let want = formal.substitute(type_args);

            if want.is_assignable_from(have) {
                buf.push(ArgFixup::None);
                score += NO_FIXUP_SCORE;
                continue;
            }

            let unquoted = have.unquoted();
            if unquoted != *have && want.is_assignable_from(&unquoted) {
                buf.push(ArgFixup::UnwrapQuote);
                score += UNWRAP_QUOTE_SCORE;
                continue;
            }

            return None;
        }

        Some(score)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedOperator {
    pub reference: OperatorRef,
    pub fixups: Vec<ArgFixup>,
}

impl ResolvedOperator {
    pub fn needs_fixup(&self) -> bool {
        self.fixups.iter().any(|f| *f != ArgFixup::None)
    }
}

/// Resolve an operator by name and argument types in the given catalog.
///
/// Fails with a resolution error when nothing matches; the error names
/// the operator and suggests a near-miss when one exists.
pub fn resolve_operator(
    catalog: CatalogId,
    name: &str,
    type_args: &[DataType],
    arg_types: &[DataType],
) -> Result<ResolvedOperator> {
    match catalog {
        CatalogId::Deferred => catalog::deferred_catalog().resolve(name, type_args, arg_types),
        CatalogId::Memory => catalog::memory_catalog().resolve(name, type_args, arg_types),
        CatalogId::External => catalog::resolve_external(name, type_args, arg_types),
    }
}

/// Get the implementation for a resolved operator reference.
pub fn operator_eval(reference: &OperatorRef) -> Result<OperatorEval> {
    match reference.catalog {
        CatalogId::Deferred => Err(QueryError::new(format!(
            "Deferred operator '{}' cannot be evaluated; the tree must be rewritten first",
            reference.name
        ))),
        CatalogId::Memory => catalog::memory_catalog().eval(reference),
        CatalogId::External => catalog::external_eval(reference),
    }
}

/// Render a slice of types for error messages.
pub(crate) fn displayable_types(types: &[DataType]) -> String {
    let mut out = String::new();
    for (idx, ty) in types.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        out.push_str(&ty.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: Vec<DataType>, arity: usize) -> OperatorSignature {
        OperatorSignature {
            params,
            generic_arity: arity,
            return_type: DataType::Any,
        }
    }

    #[test]
    fn exact_beats_unwrap() {
        let func = DataType::func([DataType::Int64], DataType::Bool);
        let quoted = DataType::quoted([DataType::Int64], DataType::Bool);

        // Two overloads, one taking the quoted form, one the plain form.
        let takes_quoted = sig(vec![quoted.clone()], 0);
        let takes_func = sig(vec![func.clone()], 0);

        let candidates = CandidateSignature::find_candidates(
            &[quoted.clone()],
            &[],
            [(0, &takes_func), (1, &takes_quoted)],
        );

        // Both match, but the exact (quoted) overload wins.
        assert_eq!(2, candidates.len());
        assert_eq!(1, candidates[0].op_idx);
        assert_eq!(vec![ArgFixup::None], candidates[0].fixups);
        assert_eq!(vec![ArgFixup::UnwrapQuote], candidates[1].fixups);
    }

    #[test]
    fn arity_mismatch_rejected() {
        let takes_one_generic = sig(vec![DataType::Var(0)], 1);
        let candidates =
            CandidateSignature::find_candidates(&[DataType::Int64], &[], [(0, &takes_one_generic)]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn substituted_generics_checked() {
        let filter_like = sig(
            vec![
                DataType::seq(DataType::Var(0)),
                DataType::func([DataType::Var(0)], DataType::Bool),
            ],
            1,
        );

        let ok = CandidateSignature::find_candidates(
            &[
                DataType::seq(DataType::Int64),
                DataType::func([DataType::Int64], DataType::Bool),
            ],
            &[DataType::Int64],
            [(0, &filter_like)],
        );
        assert_eq!(1, ok.len());

        let wrong_elem = CandidateSignature::find_candidates(
            &[
                DataType::seq(DataType::Utf8),
                DataType::func([DataType::Utf8], DataType::Bool),
            ],
            &[DataType::Int64],
            [(0, &filter_like)],
        );
        assert!(wrong_elem.is_empty());
    }
}
