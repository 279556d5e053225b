use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::sandbox::{CommandGuard, ResourceLimits, ShellApproval};
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use crate::tools::truncate_chars;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

const NAME: &str = "shell_command";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 300;
const MAX_OUTPUT_CHARS: usize = 10_000;

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Execute a shell command in the working directory. Dangerous commands are blocked. Use for build/run tasks.",
    )
    .arg(ToolArgument::required("command", ArgKind::String, "The shell command to execute"))
    .arg(
        ToolArgument::optional("timeout", ArgKind::Integer, "Timeout in seconds (default: 60, max: 300)")
            .with_default(json!(DEFAULT_TIMEOUT_SECS)),
    )
    .destructive()
    .long_running()
}

#[derive(Deserialize)]
struct ShellExecInput {
    command: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Default)]
pub struct ShellExecTool {
    approval: Option<ShellApproval>,
}

impl ShellExecTool {
    /// With `approval` set, every call must pass the host-side approval
    /// file check first.
    pub fn new(approval: Option<ShellApproval>) -> Self {
        Self { approval }
    }
}

#[async_trait]
impl ToolHandler for ShellExecTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: ShellExecInput = parse_args(args)?;
        let outcome = exec(&ctx, self.approval.as_ref(), &input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

async fn exec(
    ctx: &ExecutionContext,
    approval: Option<&ShellApproval>,
    input: &ShellExecInput,
) -> Result<Value, ToolError> {
    let working_dir: &Path = &ctx.working_dir;
    CommandGuard::validate(&input.command, working_dir)?;
    ensure_dir(working_dir)?;
    if let Some(approval) = approval {
        approval.check(working_dir, &ctx.call_id).await?;
    }

    let secs = input.timeout.clamp(1, MAX_TIMEOUT_SECS);
    debug!(call_id = %ctx.call_id, timeout_secs = secs, "Spawning shell command");

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&input.command);
    let output = run_limited(cmd, working_dir, secs).await?;

    Ok(json!({
        "command": input.command,
        "exit_code": output.status.code(),
        "output": combined_output(&output),
    }))
}

pub(crate) fn ensure_dir(working_dir: &Path) -> Result<(), ToolError> {
    if working_dir.is_dir() {
        Ok(())
    } else {
        Err(ToolError::NotFound(format!(
            "Working directory does not exist: {}",
            working_dir.display()
        )))
    }
}

/// Runs `cmd` in its own session under rlimits, killing it after `secs`.
pub(crate) async fn run_limited(mut cmd: Command, working_dir: &Path, secs: u64) -> Result<Output, ToolError> {
    let limits = ResourceLimits::for_timeout(Duration::from_secs(secs));
    cmd.current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        // SAFETY: the closure only calls setsid and setrlimit, both
        // async-signal-safe.
        unsafe {
            cmd.pre_exec(move || {
                libc::setsid();
                limits.apply()
            });
        }
    }

    timeout(Duration::from_secs(secs), cmd.output())
        .await
        .map_err(|_| ToolError::Timeout(secs))?
        .map_err(ToolError::from)
}

/// Stdout, then stderr under a marker, cut to the output limit.
pub(crate) fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.stderr.is_empty() {
        text.push_str("\n[stderr]\n");
        text.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    let (mut text, truncated) = truncate_chars(&text, MAX_OUTPUT_CHARS);
    if truncated {
        text.push_str("\n... [truncated]");
    }
    text
}
