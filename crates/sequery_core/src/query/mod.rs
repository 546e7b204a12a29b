//! Deferred query façade.
//!
//! A query wraps either a materialized sequence or an unevaluated tree
//! of deferred operator calls. The first enumeration rewrites the tree
//! at the in-memory catalog, compiles it, runs it once, and caches the
//! result; later enumerations return the cached sequence.

use std::cell::{Cell, OnceCell};
use std::fmt;
use std::rc::Rc;

use sequery_error::{QueryError, Result, ResultExt};
use tracing::debug;

use crate::compile;
use crate::expr::{self, Expression};
use crate::rewrite;
use crate::types::datatype::DataType;
use crate::types::value::Value;

/// How much work a query has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryStats {
    pub rewrites: usize,
    pub compiles: usize,
}

#[derive(Debug, Clone)]
pub struct DeferredQuery {
    inner: Rc<QueryInner>,
}

#[derive(Debug)]
struct QueryInner {
    /// None for queries built directly over materialized data.
    tree: Option<Rc<Expression>>,
    element_type: DataType,
    cache: OnceCell<Rc<Vec<Value>>>,
    rewrites: Cell<usize>,
    compiles: Cell<usize>,
}

impl DeferredQuery {
    /// Query over an already materialized sequence.
    pub fn from_seq(values: Vec<Value>) -> Self {
        let element_type = values
            .first()
            .map(|v| v.datatype())
            .unwrap_or(DataType::Any);
        let cache = OnceCell::new();
        let _ = cache.set(Rc::new(values));
        DeferredQuery {
            inner: Rc::new(QueryInner {
                tree: None,
                element_type,
                cache,
                rewrites: Cell::new(0),
                compiles: Cell::new(0),
            }),
        }
    }

    /// Query over an unevaluated tree. The tree must be sequence-typed.
    pub fn from_tree(tree: Rc<Expression>) -> Result<Self> {
        let element_type = match tree.datatype() {
            DataType::Query(elem) | DataType::Seq(elem) | DataType::Array(elem) => *elem,
            other => {
                return Err(QueryError::new(format!(
                    "Query tree must produce a sequence, got {other}: {tree}"
                )));
            }
        };
        Ok(DeferredQuery {
            inner: Rc::new(QueryInner {
                tree: Some(tree),
                element_type,
                cache: OnceCell::new(),
                rewrites: Cell::new(0),
                compiles: Cell::new(0),
            }),
        })
    }

    pub fn tree(&self) -> Option<Rc<Expression>> {
        self.inner.tree.clone()
    }

    pub fn element_type(&self) -> &DataType {
        &self.inner.element_type
    }

    pub fn is_materialized(&self) -> bool {
        self.inner.cache.get().is_some()
    }

    /// The cached result, if this query already ran.
    pub fn materialized(&self) -> Option<Rc<Vec<Value>>> {
        self.inner.cache.get().cloned()
    }

    /// True when both handles refer to the same underlying query.
    pub fn same_instance(&self, other: &DeferredQuery) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn stats(&self) -> QueryStats {
        QueryStats {
            rewrites: self.inner.rewrites.get(),
            compiles: self.inner.compiles.get(),
        }
    }

    /// Run the query, or return the cached result of an earlier run.
    pub fn enumerate(&self) -> Result<Rc<Vec<Value>>> {
        if let Some(values) = self.inner.cache.get() {
            return Ok(values.clone());
        }

        // No cache means a tree is present; from_seq pre-fills the cache.
        let tree = self.inner.tree.clone().ok_or_else(|| {
            QueryError::new("Query has neither a tree nor materialized data")
        })?;

        let rewritten = rewrite::rewrite(&tree).context("Failed to rewrite query tree")?;
        self.inner.rewrites.set(self.inner.rewrites.get() + 1);

        let compiled = compile::compile(&rewritten).context("Failed to compile query tree")?;
        self.inner.compiles.set(self.inner.compiles.get() + 1);

        let values = compiled.invoke()?.try_as_seq()?;
        debug!(
            element_type = %self.inner.element_type,
            num_values = values.len(),
            "enumerated deferred query"
        );

        let _ = self.inner.cache.set(values.clone());
        Ok(values)
    }

    /// Source node for composing a new operator on top of this query.
    ///
    /// Deferred queries contribute their tree directly; materialized
    /// ones are referenced as a constant so the cache stays shared.
    fn source_expr(&self) -> Rc<Expression> {
        match &self.inner.tree {
            Some(tree) => tree.clone(),
            None => expr::constant(
                Value::Query(self.clone()),
                DataType::query(self.inner.element_type.clone()),
            ),
        }
    }

    /// Extend this query with a deferred operator call. The query
    /// itself becomes the call's first argument.
    pub fn compose(
        &self,
        name: &str,
        type_args: Vec<DataType>,
        arguments: Vec<Rc<Expression>>,
    ) -> Result<DeferredQuery> {
        let mut args = Vec::with_capacity(arguments.len() + 1);
        args.push(self.source_expr());
        args.extend(arguments);
        let tree = expr::deferred_call(name, type_args, args)?;
        DeferredQuery::from_tree(tree)
    }

    pub fn filter(&self, predicate: Rc<Expression>) -> Result<DeferredQuery> {
        self.compose(
            "filter",
            vec![self.inner.element_type.clone()],
            vec![predicate],
        )
    }

    pub fn map(&self, result_type: DataType, selector: Rc<Expression>) -> Result<DeferredQuery> {
        self.compose(
            "map",
            vec![self.inner.element_type.clone(), result_type],
            vec![selector],
        )
    }

    pub fn group_by(&self, key_type: DataType, key_selector: Rc<Expression>) -> Result<DeferredQuery> {
        self.compose(
            "group_by",
            vec![self.inner.element_type.clone(), key_type],
            vec![key_selector],
        )
    }

    pub fn group_by_with(
        &self,
        key_type: DataType,
        element_type: DataType,
        key_selector: Rc<Expression>,
        element_selector: Rc<Expression>,
    ) -> Result<DeferredQuery> {
        self.compose(
            "group_by",
            vec![self.inner.element_type.clone(), key_type, element_type],
            vec![key_selector, element_selector],
        )
    }

    pub fn order_by(&self, key_type: DataType, key_selector: Rc<Expression>) -> Result<DeferredQuery> {
        self.compose(
            "order_by",
            vec![self.inner.element_type.clone(), key_type],
            vec![key_selector],
        )
    }

    pub fn take(&self, count: i64) -> Result<DeferredQuery> {
        self.compose(
            "take",
            vec![self.inner.element_type.clone()],
            vec![expr::lit(count)],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn join(
        &self,
        inner: Rc<Expression>,
        inner_element_type: DataType,
        key_type: DataType,
        result_type: DataType,
        outer_key_selector: Rc<Expression>,
        inner_key_selector: Rc<Expression>,
        result_selector: Rc<Expression>,
    ) -> Result<DeferredQuery> {
        self.compose(
            "join",
            vec![
                self.inner.element_type.clone(),
                inner_element_type,
                key_type,
                result_type,
            ],
            vec![
                inner,
                outer_key_selector,
                inner_key_selector,
                result_selector,
            ],
        )
    }
}

impl fmt::Display for DeferredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(values) = self.inner.cache.get() {
            return Value::Seq(values.clone()).fmt(f);
        }
        match &self.inner.tree {
            Some(tree) => tree.fmt(f),
            None => write!(f, "<empty query>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, param, param_ref};
    use crate::types::datatype::DataType;

    fn source(values: impl IntoIterator<Item = i64>) -> DeferredQuery {
        DeferredQuery::from_seq(values.into_iter().map(Value::Int64).collect())
    }

    fn quoted_lambda(body: impl Fn(Rc<Expression>) -> Rc<Expression>) -> Rc<Expression> {
        let x = param("x", DataType::Int64);
        let lambda = expr::lambda(vec![x.clone()], body(param_ref(&x))).unwrap();
        expr::quote(lambda).unwrap()
    }

    fn ints(values: impl IntoIterator<Item = i64>) -> Vec<Value> {
        values.into_iter().map(Value::Int64).collect()
    }

    #[test]
    fn enumerate_runs_once_and_caches() {
        let query = source([1, 2, 3, 4])
            .filter(quoted_lambda(|x| expr::gt(x, lit(2_i64)).unwrap()))
            .unwrap();

        let first = query.enumerate().unwrap();
        let second = query.enumerate().unwrap();

        assert_eq!(ints([3, 4]), *first);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(QueryStats { rewrites: 1, compiles: 1 }, query.stats());
        assert!(query.is_materialized());
    }

    #[test]
    fn composed_pipeline() {
        let query = source([1, 2, 3, 4, 5])
            .filter(quoted_lambda(|x| expr::rem(x, lit(2_i64)).and_then(|r| expr::eq(r, lit(1_i64))).unwrap()))
            .unwrap()
            .map(DataType::Int64, quoted_lambda(|x| expr::mul(x, lit(10_i64)).unwrap()))
            .unwrap()
            .take(2)
            .unwrap();

        assert_eq!(ints([10, 30]), *query.enumerate().unwrap());
    }

    #[test]
    fn order_by_sorts() {
        let query = source([3, 1, 2])
            .order_by(DataType::Int64, quoted_lambda(|x| x))
            .unwrap();
        assert_eq!(ints([1, 2, 3]), *query.enumerate().unwrap());
    }

    #[test]
    fn group_by_keeps_first_occurrence_order() {
        let query = source([3, 1, 6, 2, 4])
            .group_by(
                DataType::Int64,
                quoted_lambda(|x| expr::rem(x, lit(3_i64)).unwrap()),
            )
            .unwrap();

        let groups = query.enumerate().unwrap();
        let keys: Vec<_> = groups
            .iter()
            .map(|g| match g {
                Value::Group(g) => g.key().clone(),
                other => panic!("not a group: {other:?}"),
            })
            .collect();
        assert_eq!(ints([0, 1, 2]), keys);
    }

    #[test]
    fn join_with_nested_query_inner() {
        // The inner side is itself a deferred query, passed as a query
        // constant and inlined during rewrite.
        let inner = source([2, 3, 3, 4]);
        let inner_expr = expr::constant(
            Value::Query(inner.clone()),
            DataType::query(DataType::Int64),
        );

        let x = param("x", DataType::Int64);
        let y = param("y", DataType::Int64);
        let result = expr::quote(
            expr::lambda(
                vec![x.clone(), y.clone()],
                expr::add(param_ref(&x), param_ref(&y)).unwrap(),
            )
            .unwrap(),
        )
        .unwrap();

        let query = source([1, 2, 3])
            .join(
                inner_expr,
                DataType::Int64,
                DataType::Int64,
                DataType::Int64,
                quoted_lambda(|x| x),
                quoted_lambda(|x| x),
                result,
            )
            .unwrap();

        // 2 matches once, 3 matches twice.
        assert_eq!(ints([4, 6, 6]), *query.enumerate().unwrap());
    }

    #[test]
    fn group_by_with_projects_elements() {
        let query = source([1, 4])
            .group_by_with(
                DataType::Int64,
                DataType::Int64,
                quoted_lambda(|x| expr::rem(x, lit(3_i64)).unwrap()),
                quoted_lambda(|x| expr::mul(x, lit(2_i64)).unwrap()),
            )
            .unwrap();

        let groups = query.enumerate().unwrap();
        match &groups[0] {
            Value::Group(g) => assert_eq!(ints([2, 8]), g.to_vec()),
            other => panic!("not a group: {other:?}"),
        }
    }

    #[test]
    fn from_tree_rejects_scalars() {
        assert!(DeferredQuery::from_tree(lit(3_i64)).is_err());
    }

    #[test]
    fn display_shows_tree_then_values() {
        let query = source([1, 2])
            .map(DataType::Int64, quoted_lambda(|x| expr::add(x, lit(1_i64)).unwrap()))
            .unwrap();

        assert!(query.to_string().contains("map"));
        query.enumerate().unwrap();
        assert_eq!("[2, 3]", query.to_string());
    }

    #[test]
    fn shared_handles_share_the_cache() {
        let query = source([1, 2, 3])
            .take(2)
            .unwrap();
        let alias = query.clone();
        assert!(query.same_instance(&alias));

        query.enumerate().unwrap();
        assert!(alias.is_materialized());
        assert_eq!(QueryStats { rewrites: 1, compiles: 1 }, alias.stats());
    }
}
