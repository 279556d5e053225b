use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Outcome of one tool invocation.
///
/// Exactly one of `result` and `error` is present; `ok` is true iff
/// `result` is. The constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    ok: bool,
    tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, result: Value) -> Self {
        Self {
            ok: true,
            tool: tool.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "Unknown error".to_string();
        }
        Self {
            ok: false,
            tool: tool.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Folds a handler's inner outcome into a result.
    pub fn from_outcome(tool: impl Into<String>, outcome: Result<Value, ToolError>) -> Self {
        match outcome {
            Ok(value) => Self::success(tool, value),
            Err(e) => Self::failure(tool, e.to_string()),
        }
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Executable half of a tool. Expected failures (missing file, non-zero
/// exit) come back as `Ok(ToolResult::failure(..))`; `Err` is reserved for
/// conditions the handler could not turn into a result.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError>;
}

/// Deserializes validated arguments into a handler's input struct.
pub fn parse_args<T: serde::de::DeserializeOwned>(
    args: Map<String, Value>,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|e| ToolError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_serializes_without_error() {
        let value = ToolResult::success("datetime", json!({"iso": "x"})).to_json();
        assert_eq!(value, json!({"ok": true, "tool": "datetime", "result": {"iso": "x"}}));
    }

    #[test]
    fn failure_serializes_without_result() {
        let value = ToolResult::failure("write_file", "boom").to_json();
        assert_eq!(value, json!({"ok": false, "tool": "write_file", "error": "boom"}));
    }

    #[test]
    fn failure_error_is_never_empty() {
        let result = ToolResult::failure("x", "");
        assert!(!result.ok());
        assert!(!result.error().unwrap_or_default().is_empty());
        assert!(result.result().is_none());
    }
}
