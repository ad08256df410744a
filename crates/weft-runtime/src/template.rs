//! Template rendering for node configs using minijinja.
//!
//! Templates see the execution context as produced by
//! [`ExecutionContext::template_context`](crate::ExecutionContext::template_context):
//! ```text
//! "Weather for {{ city }}: {{ nodes.fetch.body.temp }}C"
//! ```
//! Undefined variables render as empty strings.

use minijinja::{Environment, Value};

use crate::error::NodeError;

/// Render one template string.
pub fn render(field: &str, template: &str, context: &Value) -> Result<String, NodeError> {
  let env = Environment::new();
  env
    .render_str(template, context.clone())
    .map_err(|e| NodeError::Template {
      field: field.to_string(),
      message: e.to_string(),
    })
}

/// Render every string leaf of a JSON value, leaving other leaves as-is.
pub fn render_value(
  field: &str,
  value: &serde_json::Value,
  context: &Value,
) -> Result<serde_json::Value, NodeError> {
  match value {
    serde_json::Value::String(s) => Ok(serde_json::Value::String(render(field, s, context)?)),
    serde_json::Value::Array(items) => items
      .iter()
      .map(|item| render_value(field, item, context))
      .collect::<Result<Vec<_>, _>>()
      .map(serde_json::Value::Array),
    serde_json::Value::Object(map) => {
      let mut rendered = serde_json::Map::with_capacity(map.len());
      for (key, item) in map {
        rendered.insert(key.clone(), render_value(&format!("{field}.{key}"), item, context)?);
      }
      Ok(serde_json::Value::Object(rendered))
    }
    other => Ok(other.clone()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn ctx() -> Value {
    Value::from_serialize(json!({
      "city": "Bangkok",
      "inputs": { "city": "Bangkok" },
      "nodes": { "fetch": { "body": { "temp": 31 } } }
    }))
  }

  #[test]
  fn test_render_simple_and_nested() {
    assert_eq!(render("prompt", "Hi {{ city }}", &ctx()).unwrap(), "Hi Bangkok");
    assert_eq!(
      render(
        "prompt",
        "{{ nodes.fetch.body.temp }}C in {{ inputs.city | upper }}",
        &ctx()
      )
      .unwrap(),
      "31C in BANGKOK"
    );
  }

  #[test]
  fn test_undefined_renders_empty() {
    assert_eq!(render("prompt", "[{{ missing }}]", &ctx()).unwrap(), "[]");
  }

  #[test]
  fn test_syntax_error_names_field() {
    let err = render("url", "{{ city ", &ctx()).unwrap_err();
    match err {
      NodeError::Template { field, .. } => assert_eq!(field, "url"),
      other => panic!("expected template error, got {other:?}"),
    }
  }

  #[test]
  fn test_render_value_leaves() {
    let rendered = render_value(
      "args",
      &json!({ "q": "weather {{ city }}", "limit": 3, "tags": ["{{ city }}", true] }),
      &ctx(),
    )
    .unwrap();

    assert_eq!(
      rendered,
      json!({ "q": "weather Bangkok", "limit": 3, "tags": ["Bangkok", true] })
    );
  }
}
