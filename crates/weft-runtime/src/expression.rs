//! Condition and custom function evaluation.
//!
//! Expressions use minijinja expression syntax:
//! ```text
//! inputs.score > 10 and "urgent" in nodes.classify
//! items | map(attribute="price") | sum
//! ```

use std::time::Duration;

use minijinja::{Environment, ErrorKind, Value};
use weft_config::CompareOperator;

use crate::error::NodeError;

/// Evaluate a boolean expression against the template context, spending at
/// most `fuel` instructions.
pub fn evaluate_condition(expression: &str, context: &Value, fuel: u64) -> Result<bool, NodeError> {
  let mut env = Environment::new();
  env.set_fuel(Some(fuel));

  let compiled = env
    .compile_expression(expression)
    .map_err(|e| NodeError::Expression {
      message: e.to_string(),
    })?;
  let value = compiled
    .eval(context.clone())
    .map_err(|e| NodeError::Expression {
      message: match e.kind() {
        ErrorKind::OutOfFuel => format!("fuel budget of {fuel} exhausted"),
        _ => e.to_string(),
      },
    })?;
  Ok(value.is_true())
}

/// Structured comparison of a resolved variable against a configured value.
///
/// Equality and containment compare display strings, so `"5"` equals `5`.
/// Ordering compares numbers; values that are not numeric never match.
pub fn compare(
  operator: CompareOperator,
  left: Option<&serde_json::Value>,
  right: &serde_json::Value,
) -> bool {
  let null = serde_json::Value::Null;
  let left = left.unwrap_or(&null);

  match operator {
    CompareOperator::Equals => display(left) == display(right),
    CompareOperator::NotEquals => display(left) != display(right),
    CompareOperator::Contains => contains(left, right),
    CompareOperator::NotContains => !contains(left, right),
    CompareOperator::GreaterThan => match (number(left), number(right)) {
      (Some(l), Some(r)) => l > r,
      _ => false,
    },
    CompareOperator::LessThan => match (number(left), number(right)) {
      (Some(l), Some(r)) => l < r,
      _ => false,
    },
    CompareOperator::IsEmpty => is_empty(left),
    CompareOperator::IsNotEmpty => !is_empty(left),
  }
}

fn display(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    serde_json::Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn number(value: &serde_json::Value) -> Option<f64> {
  match value {
    serde_json::Value::Number(n) => n.as_f64(),
    serde_json::Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
  match haystack {
    serde_json::Value::Array(items) => {
      let needle = display(needle);
      items.iter().any(|item| display(item) == needle)
    }
    serde_json::Value::Object(map) => map.contains_key(&display(needle)),
    other => display(other).contains(&display(needle)),
  }
}

fn is_empty(value: &serde_json::Value) -> bool {
  match value {
    serde_json::Value::Null => true,
    serde_json::Value::Bool(b) => !b,
    serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
    serde_json::Value::String(s) => s.is_empty(),
    serde_json::Value::Array(items) => items.is_empty(),
    serde_json::Value::Object(map) => map.is_empty(),
  }
}

/// Evaluate a user expression in an isolated environment.
///
/// Runs on a blocking worker under an instruction budget (`fuel`) and a
/// wall-clock `timeout`. Compile errors, fuel exhaustion, timeouts and panics
/// all surface as [`NodeError::Function`].
pub async fn evaluate_function(
  expression: String,
  context: serde_json::Value,
  fuel: u64,
  timeout: Duration,
) -> Result<serde_json::Value, NodeError> {
  let task = tokio::task::spawn_blocking(move || -> Result<serde_json::Value, String> {
    let mut env = Environment::new();
    env.set_fuel(Some(fuel));

    let compiled = env
      .compile_expression(&expression)
      .map_err(|e| e.to_string())?;
    let value = compiled
      .eval(Value::from_serialize(&context))
      .map_err(|e| match e.kind() {
        ErrorKind::OutOfFuel => format!("fuel budget of {fuel} exhausted"),
        _ => e.to_string(),
      })?;
    serde_json::to_value(&value).map_err(|e| e.to_string())
  });

  match tokio::time::timeout(timeout, task).await {
    Ok(Ok(Ok(value))) => Ok(value),
    Ok(Ok(Err(message))) => Err(NodeError::Function { message }),
    Ok(Err(join_error)) => Err(NodeError::Function {
      message: format!("evaluation aborted: {join_error}"),
    }),
    Err(_) => Err(NodeError::Function {
      message: format!("timed out after {}ms", timeout.as_millis()),
    }),
  }
}
