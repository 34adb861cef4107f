//! Best-effort evaluation of computation descriptors.
//!
//! The evaluator produces a value that identifies a descriptor's semantic
//! inputs: constants and member reads are resolved exactly, conditionals
//! follow the taken branch, calls are described rather than executed and
//! opaque fragments are compiled and invoked.
//!
//! Evaluation never fails from the caller's point of view. Any error or
//! panic along the way yields the descriptor's textual rendering instead.

use crate::compiled::CompiledFragments;
use crate::error::{Error, Result};
use crate::expression::{Expr, Fragment, Method, Owner};
use serde_json::{json, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Descriptor evaluator backed by a fragment memoizer.
#[derive(Default, Clone)]
pub struct Evaluator {
    compiled: Arc<CompiledFragments>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator sharing an existing memoizer.
    pub fn with_compiled(compiled: Arc<CompiledFragments>) -> Self {
        Evaluator { compiled }
    }

    pub fn compiled(&self) -> &Arc<CompiledFragments> {
        &self.compiled
    }

    /// Evaluate `expr`, falling back to its textual rendering on failure.
    pub fn evaluate(&self, expr: &Expr) -> Value {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_evaluate(expr))) {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                debug!("Falling back to rendering for `{}`: {}", expr, e);
                Value::String(expr.to_string())
            }
            Err(_) => {
                debug!("Falling back to rendering for `{}`: evaluation panicked", expr);
                Value::String(expr.to_string())
            }
        }
    }

    /// Evaluate `expr`, reporting the first failure.
    ///
    /// # Errors
    ///
    /// Returns `Error::EvaluationError` for a null owner, a missing member
    /// or a failing opaque invokable.
    pub fn try_evaluate(&self, expr: &Expr) -> Result<Value> {
        self.eval(expr, true)
    }

    // `root` is true until the first node that is not a lambda body or a
    // conditional branch is left behind.
    fn eval(&self, expr: &Expr, root: bool) -> Result<Value> {
        match expr {
            Expr::Lambda(body) => self.eval(body, root),
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Member { owner, member } => self.eval_member(owner, member),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => match self.eval(test, false)? {
                Value::Bool(true) => self.eval(if_true, root),
                Value::Bool(false) => self.eval(if_false, root),
                other => Ok(json!({
                    "test": other,
                    "if_true": if_true.to_string(),
                    "if_false": if_false.to_string(),
                })),
            },
            Expr::Call { method, .. } if !root && method.returns_async() => {
                // A pending computation can't be awaited while deriving a key.
                Ok(Value::String(expr.to_string()))
            }
            Expr::Call {
                target,
                method,
                args,
            } => self.describe_call(target.as_deref(), method, args),
            Expr::Opaque(fragment) if fragment.returns_async() => {
                Ok(Value::String(expr.to_string()))
            }
            Expr::Opaque(fragment) => self.invoke(fragment),
        }
    }

    fn eval_member(&self, owner: &Owner, member: &str) -> Result<Value> {
        match owner {
            Owner::Static(owner) => owner.member(member).ok_or_else(|| {
                Error::EvaluationError(format!(
                    "{} has no static member `{}`",
                    owner.type_name(),
                    member
                ))
            }),
            Owner::Instance(owner) => {
                let container = self.eval(owner, false)?;
                read_member(&container, member)
            }
        }
    }

    fn describe_call(&self, target: Option<&Expr>, method: &Method, args: &[Expr]) -> Result<Value> {
        let target = match target {
            Some(target) => json!({
                "expression": target.to_string(),
                "value": self.eval(target, false)?,
            }),
            None => Value::Null,
        };

        let arguments = args
            .iter()
            .map(|arg| self.eval(arg, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(json!({
            "target": target,
            "method": method.to_string(),
            "arguments": arguments,
        }))
    }

    fn invoke(&self, fragment: &Arc<Fragment>) -> Result<Value> {
        let invokable = self.compiled.get_compiled(fragment);
        invokable()
    }
}

fn read_member(container: &Value, member: &str) -> Result<Value> {
    match container {
        Value::Null => Err(Error::EvaluationError(format!(
            "cannot read `{}` from a null owner",
            member
        ))),
        Value::Object(fields) => fields.get(member).cloned().ok_or_else(|| {
            Error::EvaluationError(format!("owner has no member `{}`", member))
        }),
        Value::Array(items) if member == "length" => Ok(json!(items.len())),
        Value::Array(items) => member
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index).cloned())
            .ok_or_else(|| Error::EvaluationError(format!("no element `{}`", member))),
        Value::String(text) if member == "length" => Ok(json!(text.chars().count())),
        other => Err(Error::EvaluationError(format!(
            "cannot read `{}` from {}",
            member, other
        ))),
    }
}
