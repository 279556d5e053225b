use crate::execution_context::ExecutionContext;
use crate::registry::{ToolEntry, ToolRegistry};
use crate::sandbox::path_guard::absolutize;
use crate::tools::ToolResult;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const LONG_RUNNING_TIMEOUT: Duration = Duration::from_secs(300);

/// Validates a call against its descriptor and runs the handler under a
/// time budget. Holds no per-call state; share it behind an `Arc`.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    working_dir: PathBuf,
    dry_run: bool,
    default_timeout: Duration,
    long_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            registry,
            working_dir: absolutize(&working_dir).unwrap_or(working_dir),
            dry_run: false,
            default_timeout: DEFAULT_TIMEOUT,
            long_timeout: LONG_RUNNING_TIMEOUT,
        }
    }

    /// Destructive tools are described instead of run while enabled.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeouts(mut self, default_timeout: Duration, long_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self.long_timeout = long_timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs one tool call. Every failure mode comes back as an `ok=false`
    /// result; this never returns an error or panics.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let started = Instant::now();
        let result = self.execute_inner(name, args).await;

        if result.ok() {
            info!(tool = name, elapsed_ms = started.elapsed().as_millis() as u64, "Tool succeeded");
        } else {
            warn!(
                tool = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = result.error().unwrap_or_default(),
                "Tool failed"
            );
        }
        result
    }

    async fn execute_inner(&self, name: &str, args: Value) -> ToolResult {
        let Some(entry) = self.registry.get(name) else {
            return ToolResult::failure(
                name,
                format!("Unknown tool: {}. Available: {:?}", name, self.registry.list()),
            );
        };

        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return ToolResult::failure(
                    name,
                    format!("Invalid arguments: expected an object, got {}", type_name(&other)),
                )
            }
        };

        if let Err(reason) = entry.descriptor.validate(&args) {
            return ToolResult::failure(name, format!("Invalid arguments: {}", reason));
        }

        let shown = Value::Object(args.clone());
        debug!(tool = name, args = %shown, "Dispatching");

        if self.dry_run && entry.descriptor.is_destructive {
            return dry_run_result(name, args);
        }

        let budget = if entry.descriptor.long_running {
            self.long_timeout
        } else {
            self.default_timeout
        };
        let filled = entry.descriptor.with_defaults(&args);
        self.run_isolated(name, entry, filled, budget).await
    }

    async fn run_isolated(
        &self,
        name: &str,
        entry: &ToolEntry,
        args: Map<String, Value>,
        budget: Duration,
    ) -> ToolResult {
        let ctx = ExecutionContext::new(self.working_dir.clone(), budget);
        debug!(tool = name, call_id = %ctx.call_id, "Spawning handler");

        let handler = entry.handler.clone();
        let mut handle = tokio::spawn(async move { handler.run(ctx, args).await });

        match timeout(budget, &mut handle).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => ToolResult::failure(name, format!("Execution error: {}", e)),
            Ok(Err(join_err)) => {
                error!(tool = name, "Tool handler panicked or was cancelled: {}", join_err);
                ToolResult::failure(name, format!("Execution error: {}", join_err))
            }
            Err(_) => {
                // Dropping the task kills any child spawned with kill_on_drop.
                handle.abort();
                ToolResult::failure(name, format!("Timed out after {}s", budget.as_secs()))
            }
        }
    }
}

fn dry_run_result(name: &str, args: Map<String, Value>) -> ToolResult {
    let args = Value::Object(args);
    ToolResult::success(
        name,
        json!({
            "dry_run": true,
            "message": format!("[DRY-RUN] Would execute {} with args: {}", name, args),
            "args": args,
        }),
    )
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
