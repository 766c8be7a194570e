//! Uniform handler result
//!
//! Every tool answers `{success: true, ...data}` or
//! `{success: false, error, ...data}`. The dispatcher serializes this value
//! verbatim as the function call output.

use crate::VoxError;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Result of one tool invocation
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    success: bool,
    fields: Map<String, Value>,
}

impl ToolOutput {
    pub fn success() -> Self {
        Self {
            success: true,
            fields: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("error".to_string(), Value::String(error.into()));
        Self {
            success: false,
            fields,
        }
    }

    /// Attach a data field
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field shorthand
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.get_str("error")
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("success".to_string(), Value::Bool(self.success));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    /// JSON text as carried in a `function_call_output` item
    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}

impl From<VoxError> for ToolOutput {
    fn from(err: VoxError) -> Self {
        let output = ToolOutput::failure(err.to_string());
        match err {
            VoxError::NotFound(ids) => output.with("missingIds", ids),
            _ => output,
        }
    }
}

impl Serialize for ToolOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let output = ToolOutput::success().with("buttonId", "b1");
        assert_eq!(output.to_value(), json!({"success": true, "buttonId": "b1"}));
    }

    #[test]
    fn test_error_conversion_lists_missing() {
        let output = ToolOutput::from(VoxError::NotFound(vec!["y".into()]));
        assert!(!output.is_success());
        assert_eq!(output.error(), Some("Element with ID y not found"));
        assert_eq!(output.get("missingIds"), Some(&json!(["y"])));
    }

    #[test]
    fn test_json_string_roundtrip() {
        let output = ToolOutput::failure("boom").with("containerId", "img-1");
        let parsed: Value = serde_json::from_str(&output.to_json_string()).unwrap();
        assert_eq!(parsed["success"], json!(false));
        assert_eq!(parsed["containerId"], json!("img-1"));
    }
}
