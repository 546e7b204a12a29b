//! Compile a query tree into a chain of closures.
//!
//! Each node becomes one closure over an execution scope. Operator
//! implementations and scope slots are resolved at compile time, so
//! invocation does no name lookups.

use std::rc::Rc;

use sequery_error::{QueryError, Result};
use tracing::debug;

use super::analyze::{FrameDescriptor, FrameStack, GlobalTable};
use super::scope::ExecutionScope;
use crate::expr::Expression;
use crate::expr::call_expr::CallExpr;
use crate::expr::lambda_expr::LambdaExpr;
use crate::functions::operator_eval;
use crate::types::datatype::DataType;
use crate::types::value::{FuncValue, Value};

type NodeFn = Rc<dyn Fn(&Rc<ExecutionScope>) -> Result<Value>>;

/// A tree compiled down to closures, ready to invoke.
pub struct CompiledQuery {
    root: NodeFn,
    globals: Rc<[Value]>,
}

impl CompiledQuery {
    /// Run the compiled tree. Each invocation gets a fresh root scope.
    pub fn invoke(&self) -> Result<Value> {
        let scope = ExecutionScope::root(self.globals.clone());
        (self.root)(&scope)
    }
}

pub fn compile(tree: &Rc<Expression>) -> Result<CompiledQuery> {
    let mut compiler = Compiler::default();
    let root = compiler.compile_node(tree)?;
    debug!(num_globals = compiler.globals.len(), "compiled query tree");
    Ok(CompiledQuery {
        root,
        globals: compiler.globals.into_values(),
    })
}

#[derive(Default)]
struct Compiler {
    frames: FrameStack,
    globals: GlobalTable,
}

impl Compiler {
    fn compile_node(&mut self, expr: &Rc<Expression>) -> Result<NodeFn> {
        match expr.as_ref() {
            Expression::Constant(constant) => {
                let idx = self.globals.push(constant.value.clone());
                Ok(Rc::new(move |scope| scope.global(idx)))
            }
            Expression::Parameter(param) => {
                let var = self.frames.resolve(param)?;
                Ok(Rc::new(move |scope| scope.ancestor_local(var.depth, var.slot)))
            }
            Expression::Call(call) => self.compile_call(call),
            Expression::Lambda(lambda) => self.compile_lambda(lambda),
            Expression::Quote(_) => Err(QueryError::new(
                "Quoted lambda reached the compiler; the tree must be rewritten first",
            )),
            Expression::NewArray(array) => {
                let inits = array
                    .initializers
                    .iter()
                    .map(|init| self.compile_node(init))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Rc::new(move |scope| {
                    inits
                        .iter()
                        .map(|init| init(scope))
                        .collect::<Result<Vec<_>>>()
                        .map(Value::seq)
                }))
            }
            Expression::Convert(convert) => {
                let operand = self.compile_node(&convert.operand)?;
                let target = convert.target_type.clone();
                Ok(Rc::new(move |scope| cast(operand(scope)?, &target)))
            }
        }
    }

    fn compile_call(&mut self, call: &CallExpr) -> Result<NodeFn> {
        let eval = operator_eval(&call.operator)?;
        let args = call
            .arguments
            .iter()
            .map(|arg| self.compile_node(arg))
            .collect::<Result<Vec<_>>>()?;

        Ok(Rc::new(move |scope| {
            let argv = args
                .iter()
                .map(|arg| arg(scope))
                .collect::<Result<Vec<_>>>()?;
            eval(&argv)
        }))
    }

    /// A lambda node evaluates to a callable. Calling it pushes a child
    /// scope, writes the arguments into the hoisted slots, and runs the
    /// body. The callable keeps the scope it was created under, so
    /// free variables resolve through the parent chain.
    fn compile_lambda(&mut self, lambda: &LambdaExpr) -> Result<NodeFn> {
        self.frames.push(FrameDescriptor::new(&lambda.params));
        let body = self.compile_node(&lambda.body);
        self.frames.pop();
        let body = body?;

        let num_params = lambda.params.len();
        Ok(Rc::new(move |scope| {
            let captured = scope.clone();
            let body = body.clone();
            let func = move |args: &[Value]| -> Result<Value> {
                if args.len() != num_params {
                    return Err(QueryError::new(format!(
                        "Lambda expects {num_params} arguments, got {}",
                        args.len()
                    )));
                }
                let child = ExecutionScope::child(&captured, num_params);
                for (slot, arg) in args.iter().enumerate() {
                    child.set_local(slot, arg.clone())?;
                }
                body(&child)
            };
            Ok(Value::Func(FuncValue::with_scope(func, scope.clone())))
        }))
    }
}

/// Runtime conversion for `Convert` nodes. Identity and numeric casts
/// only.
fn cast(value: Value, target: &DataType) -> Result<Value> {
    match (value, target) {
        (value, DataType::Any) => Ok(value),
        (Value::Null, DataType::Null) => Ok(Value::Null),
        (Value::Bool(v), DataType::Bool) => Ok(Value::Bool(v)),
        (Value::Int64(v), DataType::Int64) => Ok(Value::Int64(v)),
        (Value::Float64(v), DataType::Float64) => Ok(Value::Float64(v)),
        (Value::Utf8(v), DataType::Utf8) => Ok(Value::Utf8(v)),
        (Value::Int64(v), DataType::Float64) => Ok(Value::Float64(v as f64)),
        (Value::Float64(v), DataType::Int64) => {
            if !v.is_finite() || v < i64::MIN as f64 || v > i64::MAX as f64 {
                return Err(QueryError::new(format!(
                    "Float64 value {v} does not fit in an int64"
                )));
            }
            Ok(Value::Int64(v as i64))
        }
        (value, DataType::Seq(_)) if matches!(value, Value::Seq(_) | Value::Query(_)) => Ok(value),
        (value, target) => Err(QueryError::new(format!(
            "Cannot convert {} to {target}",
            value.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{self, lit, memory_call, param, param_ref};

    fn ints(values: impl IntoIterator<Item = i64>) -> Value {
        Value::seq(values.into_iter().map(Value::Int64).collect())
    }

    #[test]
    fn constant_round_trips() {
        let compiled = compile(&lit(42_i64)).unwrap();
        assert_eq!(Value::Int64(42), compiled.invoke().unwrap());
    }

    #[test]
    fn scalar_call() {
        let tree = expr::add(lit(1_i64), lit(2_i64)).unwrap();
        let compiled = compile(&tree).unwrap();
        assert_eq!(Value::Int64(3), compiled.invoke().unwrap());
    }

    #[test]
    fn map_with_lambda() {
        let x = param("x", DataType::Int64);
        let selector =
            expr::lambda(vec![x.clone()], expr::add(param_ref(&x), lit(1_i64)).unwrap()).unwrap();
        let tree = memory_call(
            "map",
            vec![DataType::Int64, DataType::Int64],
            vec![lit(ints([1, 2, 3])), selector],
        )
        .unwrap();

        let compiled = compile(&tree).unwrap();
        assert_eq!(ints([2, 3, 4]), compiled.invoke().unwrap());
    }

    #[test]
    fn nested_lambda_reads_hoisted_cell() {
        // outer = |x| (|y| x + y)
        let x = param("x", DataType::Int64);
        let y = param("y", DataType::Int64);
        let inner = expr::lambda(
            vec![y.clone()],
            expr::add(param_ref(&x), param_ref(&y)).unwrap(),
        )
        .unwrap();
        let outer = expr::lambda(vec![x.clone()], inner).unwrap();

        let compiled = compile(&outer).unwrap();
        let outer_fn = compiled.invoke().unwrap();
        let inner_fn = outer_fn.try_as_func().unwrap().call(&[Value::Int64(10)]).unwrap();
        let inner_fn = inner_fn.try_as_func().unwrap().clone();

        assert_eq!(Value::Int64(11), inner_fn.call(&[Value::Int64(1)]).unwrap());

        // The inner closure reads x through a shared cell, so a write to
        // the hoisted slot is visible on the next call.
        let captured = inner_fn.captured_scope().unwrap();
        captured.set_local(0, Value::Int64(100)).unwrap();
        assert_eq!(Value::Int64(101), inner_fn.call(&[Value::Int64(1)]).unwrap());
    }

    #[test]
    fn quote_is_rejected() {
        let x = param("x", DataType::Int64);
        let lambda = expr::lambda(vec![x.clone()], param_ref(&x)).unwrap();
        let quoted = expr::quote(lambda).unwrap();
        assert!(compile(&quoted).is_err());
    }

    #[test]
    fn unbound_parameter_is_rejected() {
        let free = param("free", DataType::Int64);
        assert!(compile(&param_ref(&free)).is_err());
    }

    #[test]
    fn convert_casts_numerics() {
        let tree = expr::convert(lit(3_i64), DataType::Float64);
        assert_eq!(Value::Float64(3.0), compile(&tree).unwrap().invoke().unwrap());

        let tree = expr::convert(lit(3.9_f64), DataType::Int64);
        assert_eq!(Value::Int64(3), compile(&tree).unwrap().invoke().unwrap());

        let tree = expr::convert(lit(f64::NAN), DataType::Int64);
        assert!(compile(&tree).unwrap().invoke().is_err());
    }
}
