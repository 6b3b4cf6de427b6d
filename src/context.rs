//! Render context and the values the pipeline derives from it.

use serde_json::Value;

/// Key/value data used to resolve template expressions.
pub type Context = serde_json::Map<String, Value>;

/// Values computed during a render call.
///
/// The caller's context is never written to; anything the pipeline adds to
/// its working scope is reported here instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedFields {
    /// `server` or `server:port`, visible to `@@http_server@@` tokens.
    pub http_server: Option<String>,
    /// Shallow copy of the context exposed to legacy templates.
    pub template_universe: Option<Context>,
}

/// Textual form of a context value as it appears in rendered output.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_not_quoted() {
        assert_eq!(value_to_text(&json!("alpha")), "alpha");
    }

    #[test]
    fn other_values_use_json_display() {
        assert_eq!(value_to_text(&json!(8080)), "8080");
        assert_eq!(value_to_text(&json!(true)), "true");
        assert_eq!(value_to_text(&json!(["a", 1])), r#"["a",1]"#);
    }
}
