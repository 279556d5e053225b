//! Boundary between the gateway and whatever turns a chat message into
//! tool calls.

use async_trait::async_trait;
use serde_json::Value;
use shellgate_tools::ToolDispatcher;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Backend failure: {0}")]
    Backend(String),
    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The model loop, seen from the gateway. `process` runs under the
/// gateway's wall-clock timeout and may be cancelled at any await point.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn process(&self, identity: &str, message: &str) -> Result<String, AgentError>;

    /// Drops any conversation state kept for `identity`.
    fn reset(&self, identity: &str);
}

/// Backend without a model: messages are `<tool_name> [json-args]` and go
/// straight to the dispatcher.
pub struct DirectDispatchAgent {
    dispatcher: Arc<ToolDispatcher>,
}

impl DirectDispatchAgent {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    fn usage(&self) -> String {
        format!(
            "Usage: <tool_name> [json-args]\nAvailable tools: {}",
            self.dispatcher.registry().list().join(", ")
        )
    }
}

#[async_trait]
impl AgentBackend for DirectDispatchAgent {
    async fn process(&self, _identity: &str, message: &str) -> Result<String, AgentError> {
        let message = message.trim();
        let (tool, raw_args) = match message.split_once(char::is_whitespace) {
            Some((tool, rest)) => (tool, rest.trim()),
            None => (message, ""),
        };
        if tool.is_empty() {
            return Ok(self.usage());
        }

        let args = if raw_args.is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(raw_args) {
                Ok(args) => args,
                Err(e) => return Ok(format!("Invalid JSON arguments: {}\n{}", e, self.usage())),
            }
        };

        let result = self.dispatcher.execute(tool, args).await;
        Ok(serde_json::to_string_pretty(&result)?)
    }

    fn reset(&self, _identity: &str) {}
}
