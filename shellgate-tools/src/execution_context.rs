use std::path::PathBuf;
use std::time::Duration;

/// Per-call context handed to a tool handler by the dispatcher.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub call_id: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl ExecutionContext {
    pub fn new(working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            working_dir: working_dir.into(),
            timeout,
        }
    }
}
