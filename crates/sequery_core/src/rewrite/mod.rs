//! Retarget deferred operator calls at the in-memory catalog.
//!
//! The rewrite is bottom-up. Subtrees that come back unchanged are
//! returned by reference, so a caller can detect a no-op rewrite with
//! `Rc::ptr_eq`.

use std::rc::Rc;

use sequery_error::{QueryError, Result};
use tracing::trace;

use crate::expr::Expression;
use crate::expr::call_expr::CallExpr;
use crate::expr::constant_expr::ConstantExpr;
use crate::expr::convert_expr::ConvertExpr;
use crate::expr::lambda_expr::LambdaExpr;
use crate::expr::new_array_expr::NewArrayExpr;
use crate::expr::quote_expr::QuoteExpr;
use crate::functions::{ArgFixup, CatalogId, resolve_operator};
use crate::types::datatype::DataType;
use crate::types::value::Value;

pub fn rewrite(expr: &Rc<Expression>) -> Result<Rc<Expression>> {
    match expr.as_ref() {
        Expression::Constant(constant) => rewrite_constant(expr, constant),
        Expression::Parameter(_) => Ok(expr.clone()),
        Expression::Call(call) => rewrite_call(expr, call),
        Expression::Lambda(lambda) => rewrite_lambda(expr, lambda),
        Expression::Quote(quote) => rewrite_quote(expr, quote),
        Expression::NewArray(array) => rewrite_array(expr, array),
        Expression::Convert(convert) => rewrite_convert(expr, convert),
    }
}

/// Nested query constants are the seam between trees.
///
/// A query that already ran becomes a plain sequence constant with a
/// widened element type. A deferred one contributes its tree, rewritten
/// in place of the constant.
fn rewrite_constant(expr: &Rc<Expression>, constant: &ConstantExpr) -> Result<Rc<Expression>> {
    let Value::Query(query) = &constant.value else {
        return Ok(expr.clone());
    };

    if let Some(values) = query.materialized() {
        let element_type = widened(query.element_type());
        trace!(%element_type, "inlining materialized nested query");
        return Ok(crate::expr::constant(
            Value::Seq(values),
            DataType::seq(element_type),
        ));
    }

    match query.tree() {
        Some(tree) => {
            trace!("splicing nested deferred query tree");
            rewrite(&tree)
        }
        None => Err(QueryError::new(
            "Nested query has neither a tree nor materialized data",
        )),
    }
}

fn rewrite_call(expr: &Rc<Expression>, call: &CallExpr) -> Result<Rc<Expression>> {
    let mut arguments = Vec::with_capacity(call.arguments.len());
    let mut changed = false;
    for arg in &call.arguments {
        let rewritten = rewrite(arg)?;
        changed |= !Rc::ptr_eq(arg, &rewritten);
        arguments.push(rewritten);
    }

    match call.operator.catalog {
        CatalogId::Deferred => {
            trace!(name = %call.operator.name, "retargeting deferred call");
            build_call(
                CatalogId::Memory,
                &call.operator.name,
                &call.operator.type_args,
                arguments,
            )
        }
        catalog => {
            if !changed {
                return Ok(expr.clone());
            }
            // Argument types may have shifted (e.g. a nested query
            // became a sequence), so re-resolve the overload.
            build_call(catalog, &call.operator.name, &call.operator.type_args, arguments)
        }
    }
}

fn rewrite_lambda(expr: &Rc<Expression>, lambda: &LambdaExpr) -> Result<Rc<Expression>> {
    let body = rewrite(&lambda.body)?;
    if Rc::ptr_eq(&lambda.body, &body) {
        return Ok(expr.clone());
    }
    Ok(Rc::new(Expression::Lambda(LambdaExpr {
        params: lambda.params.clone(),
        result_type: body.datatype(),
        body,
    })))
}

fn rewrite_quote(expr: &Rc<Expression>, quote: &QuoteExpr) -> Result<Rc<Expression>> {
    let inner = rewrite(&quote.inner)?;
    if Rc::ptr_eq(&quote.inner, &inner) {
        return Ok(expr.clone());
    }
    Ok(Rc::new(Expression::Quote(QuoteExpr { inner })))
}

fn rewrite_array(expr: &Rc<Expression>, array: &NewArrayExpr) -> Result<Rc<Expression>> {
    let mut initializers = Vec::with_capacity(array.initializers.len());
    let mut changed = false;
    for init in &array.initializers {
        let rewritten = rewrite(init)?;
        changed |= !Rc::ptr_eq(init, &rewritten);
        initializers.push(rewritten);
    }
    if !changed {
        return Ok(expr.clone());
    }
    Ok(Rc::new(Expression::NewArray(NewArrayExpr {
        element_type: array.element_type.clone(),
        initializers,
    })))
}

fn rewrite_convert(expr: &Rc<Expression>, convert: &ConvertExpr) -> Result<Rc<Expression>> {
    let operand = rewrite(&convert.operand)?;
    if Rc::ptr_eq(&convert.operand, &operand) {
        return Ok(expr.clone());
    }
    Ok(Rc::new(Expression::Convert(ConvertExpr {
        operand,
        target_type: convert.target_type.clone(),
    })))
}

/// Resolve a call in the given catalog and apply the fix-ups the chosen
/// overload requires.
fn build_call(
    catalog: CatalogId,
    name: &str,
    type_args: &[DataType],
    arguments: Vec<Rc<Expression>>,
) -> Result<Rc<Expression>> {
    let arg_types: Vec<_> = arguments.iter().map(|a| a.datatype()).collect();
    let resolved = resolve_operator(catalog, name, type_args, &arg_types)?;

    let arguments = arguments
        .into_iter()
        .zip(&resolved.fixups)
        .map(|(arg, fixup)| match fixup {
            ArgFixup::None => Ok(arg),
            ArgFixup::UnwrapQuote => unwrap_quote(arg),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Rc::new(Expression::Call(CallExpr {
        operator: resolved.reference,
        arguments,
    })))
}

/// Replace a quoted lambda with its inner lambda. Arrays of quoted
/// lambdas unwrap elementwise, with the element type unquoted to match.
fn unwrap_quote(arg: Rc<Expression>) -> Result<Rc<Expression>> {
    match arg.as_ref() {
        Expression::Quote(quote) => Ok(quote.inner.clone()),
        Expression::NewArray(array) => {
            let initializers = array
                .initializers
                .iter()
                .cloned()
                .map(unwrap_quote)
                .collect::<Result<Vec<_>>>()?;
            Ok(Rc::new(Expression::NewArray(NewArrayExpr {
                element_type: array.element_type.unquoted(),
                initializers,
            })))
        }
        other => Err(QueryError::new(format!(
            "Cannot unwrap a quote from: {other}"
        ))),
    }
}

/// Widen a nested query's element type for use as a plain constant.
///
/// Function-typed and placeholder element types are not meaningful
/// outside the tree that produced them, so they widen to `Any`.
fn widened(datatype: &DataType) -> DataType {
    match datatype {
        DataType::Func(_) | DataType::Quoted(_) | DataType::Var(_) => DataType::Any,
        DataType::Seq(inner) => DataType::seq(widened(inner)),
        DataType::Query(inner) => DataType::seq(widened(inner)),
        DataType::Array(inner) => DataType::array(widened(inner)),
        DataType::Group(key, value) => DataType::group(widened(key), widened(value)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{self, lit, param, param_ref};
    use crate::query::DeferredQuery;

    fn ints(values: impl IntoIterator<Item = i64>) -> Value {
        Value::seq(values.into_iter().map(Value::Int64).collect())
    }

    fn deferred_source(values: impl IntoIterator<Item = i64>) -> Rc<Expression> {
        let query = DeferredQuery::from_seq(values.into_iter().map(Value::Int64).collect());
        let datatype = DataType::query(query.element_type().clone());
        expr::constant(Value::Query(query), datatype)
    }

    #[test]
    fn memory_tree_is_shared_unchanged() {
        let x = param("x", DataType::Int64);
        let selector =
            expr::lambda(vec![x.clone()], expr::add(param_ref(&x), lit(1_i64)).unwrap()).unwrap();
        let tree = expr::memory_call(
            "map",
            vec![DataType::Int64, DataType::Int64],
            vec![lit(ints([1, 2])), selector],
        )
        .unwrap();

        let rewritten = rewrite(&tree).unwrap();
        assert!(Rc::ptr_eq(&tree, &rewritten));
    }

    #[test]
    fn deferred_filter_is_retargeted() {
        let x = param("x", DataType::Int64);
        let predicate =
            expr::lambda(vec![x.clone()], expr::gt(param_ref(&x), lit(1_i64)).unwrap()).unwrap();
        let tree = expr::deferred_call(
            "filter",
            vec![DataType::Int64],
            vec![
                deferred_source([1, 2, 3]),
                expr::quote(predicate.clone()).unwrap(),
            ],
        )
        .unwrap();

        let rewritten = rewrite(&tree).unwrap();
        let Expression::Call(call) = rewritten.as_ref() else {
            panic!("not a call: {rewritten}");
        };
        assert_eq!(CatalogId::Memory, call.operator.catalog);
        // The quote is unwrapped and the lambda is shared by reference.
        assert!(Rc::ptr_eq(&predicate, &call.arguments[1]));
        // The materialized source becomes a plain sequence constant.
        assert_eq!(DataType::seq(DataType::Int64), call.arguments[0].datatype());
    }

    #[test]
    fn nested_deferred_tree_is_spliced() {
        let x = param("x", DataType::Int64);
        let predicate =
            expr::lambda(vec![x.clone()], expr::gt(param_ref(&x), lit(1_i64)).unwrap()).unwrap();
        let inner = DeferredQuery::from_seq(vec![
            Value::Int64(1),
            Value::Int64(2),
            Value::Int64(3),
        ])
        .filter(expr::quote(predicate).unwrap())
        .unwrap();

        let n = param("n", DataType::Int64);
        let selector =
            expr::lambda(vec![n.clone()], expr::mul(param_ref(&n), lit(10_i64)).unwrap()).unwrap();
        let outer = inner.map(DataType::Int64, expr::quote(selector).unwrap()).unwrap();

        let rewritten = rewrite(&outer.tree().unwrap()).unwrap();
        let Expression::Call(outer_call) = rewritten.as_ref() else {
            panic!("not a call: {rewritten}");
        };
        assert_eq!(CatalogId::Memory, outer_call.operator.catalog);

        // The source argument is the inner query's rewritten tree, not a
        // query constant.
        let Expression::Call(inner_call) = outer_call.arguments[0].as_ref() else {
            panic!("inner tree not spliced: {}", outer_call.arguments[0]);
        };
        assert_eq!("filter", inner_call.operator.name);
        assert_eq!(CatalogId::Memory, inner_call.operator.catalog);
    }

    #[test]
    fn rewrite_is_idempotent() {
        let x = param("x", DataType::Int64);
        let predicate =
            expr::lambda(vec![x.clone()], expr::gt(param_ref(&x), lit(1_i64)).unwrap()).unwrap();
        let tree = expr::deferred_call(
            "filter",
            vec![DataType::Int64],
            vec![
                deferred_source([1, 2, 3]),
                expr::quote(predicate).unwrap(),
            ],
        )
        .unwrap();

        let once = rewrite(&tree).unwrap();
        let twice = rewrite(&once).unwrap();
        assert!(Rc::ptr_eq(&once, &twice));
    }

    #[test]
    fn widened_types_drop_function_shapes() {
        assert_eq!(
            DataType::seq(DataType::Any),
            widened(&DataType::seq(DataType::func([DataType::Int64], DataType::Bool)))
        );
        assert_eq!(
            DataType::group(DataType::Utf8, DataType::Int64),
            widened(&DataType::group(DataType::Utf8, DataType::Int64))
        );
    }
}
