use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::sandbox::{PathGuard, ShellApproval};
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use crate::tools::sensitive_fragment;
use crate::tools::shell_exec::{combined_output, ensure_dir, run_limited};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::debug;

const NAME: &str = "run_python_file";
const INTERPRETER: &str = "python3";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 300;

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Execute a Python file with optional arguments. Returns stdout/stderr.",
    )
    .arg(ToolArgument::required("path", ArgKind::String, "Relative path to the Python file"))
    .arg(ToolArgument::optional(
        "args",
        ArgKind::String,
        "Command line arguments to pass to the script",
    ))
    .arg(
        ToolArgument::optional("timeout", ArgKind::Integer, "Timeout in seconds (default: 60)")
            .with_default(json!(DEFAULT_TIMEOUT_SECS)),
    )
    .destructive()
    .long_running()
}

#[derive(Deserialize)]
struct PythonExecInput {
    path: String,
    args: Option<String>,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Default)]
pub struct PythonExecTool {
    approval: Option<ShellApproval>,
}

impl PythonExecTool {
    pub fn new(approval: Option<ShellApproval>) -> Self {
        Self { approval }
    }
}

#[async_trait]
impl ToolHandler for PythonExecTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: PythonExecInput = parse_args(args)?;
        let outcome = exec(&ctx, self.approval.as_ref(), &input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

async fn exec(
    ctx: &ExecutionContext,
    approval: Option<&ShellApproval>,
    input: &PythonExecInput,
) -> Result<Value, ToolError> {
    if let Some(fragment) = sensitive_fragment(&input.path) {
        return Err(ToolError::SandboxViolation(format!(
            "Cannot run sensitive files matching '{}'",
            fragment
        )));
    }
    ensure_dir(&ctx.working_dir)?;
    let script = PathGuard::new(&ctx.working_dir).resolve_file(&input.path)?;
    if script.extension().and_then(|e| e.to_str()) != Some("py") {
        return Err(ToolError::Validation("File must be a .py file".into()));
    }
    let script_args = split_args(input.args.as_deref().unwrap_or_default())?;
    if let Some(approval) = approval {
        approval.check(&ctx.working_dir, &ctx.call_id).await?;
    }

    let secs = input.timeout.clamp(1, MAX_TIMEOUT_SECS);
    debug!(call_id = %ctx.call_id, timeout_secs = secs, "Spawning python script");

    let mut cmd = Command::new(INTERPRETER);
    cmd.arg(&script).args(&script_args);
    let output = run_limited(cmd, &ctx.working_dir, secs).await?;

    Ok(json!({
        "path": input.path,
        "exit_code": output.status.code(),
        "output": combined_output(&output),
    }))
}

/// Splits an argument string the way a POSIX shell would, without any
/// expansion: whitespace separates, quotes group, backslash escapes outside
/// single quotes.
fn split_args(raw: &str) -> Result<Vec<String>, ToolError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unbalanced()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(unbalanced()),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unbalanced()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

fn unbalanced() -> ToolError {
    ToolError::Validation("Unbalanced quotes in args".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn python_available() -> bool {
        std::process::Command::new(INTERPRETER)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn splits_quoted_arguments() {
        assert_eq!(
            split_args(r#"--name "Ada Lovelace" 'a b' c\ d "" x"#).unwrap(),
            vec!["--name", "Ada Lovelace", "a b", "c d", "", "x"]
        );
        assert!(split_args("").unwrap().is_empty());
        assert!(split_args("'open").is_err());
    }

    #[tokio::test]
    async fn non_python_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "echo hi").unwrap();
        let ctx = ExecutionContext::new(dir.path(), Duration::from_secs(10));

        let result = PythonExecTool::default()
            .run(ctx, args(json!({"path": "run.sh"})))
            .await
            .unwrap();
        assert_eq!(result.error(), Some("Validation error: File must be a .py file"));
    }

    #[tokio::test]
    async fn missing_and_escaping_paths_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let tool = PythonExecTool::default();

        let ctx = ExecutionContext::new(dir.path(), Duration::from_secs(10));
        let missing = tool.run(ctx, args(json!({"path": "nope.py"}))).await.unwrap();
        assert!(missing.error().unwrap().starts_with("Not found:"));

        let ctx = ExecutionContext::new(dir.path(), Duration::from_secs(10));
        let escaped = tool.run(ctx, args(json!({"path": "../x.py"}))).await.unwrap();
        assert!(escaped.error().unwrap().contains("escapes working directory"));
    }

    #[tokio::test]
    async fn approval_gate_applies_to_scripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.py"), "print('hi')").unwrap();
        let ctx = ExecutionContext::new(dir.path(), Duration::from_secs(10));

        let result = PythonExecTool::new(Some(ShellApproval::default()))
            .run(ctx, args(json!({"path": "hello.py"})))
            .await
            .unwrap();
        assert!(result.error().unwrap().contains("Local approval required"));
    }

    #[tokio::test]
    async fn runs_script_with_arguments() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("echo.py"),
            "import sys\nprint('|'.join(sys.argv[1:]))\n",
        )
        .unwrap();
        let ctx = ExecutionContext::new(dir.path(), Duration::from_secs(30));

        let result = PythonExecTool::default()
            .run(ctx, args(json!({"path": "echo.py", "args": "one 'two words'"})))
            .await
            .unwrap();
        assert!(result.ok(), "{:?}", result.error());
        let value = result.result().unwrap();
        assert_eq!(value["exit_code"], json!(0));
        assert_eq!(value["output"], json!("one|two words\n"));
    }
}
