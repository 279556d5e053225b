use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use crate::tools::truncate_chars;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOG_COUNT: u64 = 50;
const MAX_DIFF_CHARS: usize = 10_000;

pub fn status_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "git_status",
        "Show the current git status including staged, unstaged, and untracked files.",
    )
}

pub fn diff_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "git_diff",
        "Show file changes. Use staged=true for staged changes, or specify a file path.",
    )
    .arg(
        ToolArgument::optional("staged", ArgKind::Boolean, "Show staged changes only (default: false)")
            .with_default(json!(false)),
    )
    .arg(ToolArgument::optional("path", ArgKind::String, "Specific file to diff"))
}

pub fn log_descriptor() -> ToolDescriptor {
    ToolDescriptor::new("git_log", "Show recent commit history with messages and authors.").arg(
        ToolArgument::optional("count", ArgKind::Integer, "Number of commits to show (default: 10)")
            .with_default(json!(10)),
    )
}

pub fn commit_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "git_commit",
        "Stage all changes and create a commit with the given message.",
    )
    .arg(ToolArgument::required("message", ArgKind::String, "Commit message"))
    .destructive()
}

pub fn branch_descriptor() -> ToolDescriptor {
    ToolDescriptor::new("git_branch", "List, create, switch, or delete git branches.")
        .arg(
            ToolArgument::required(
                "action",
                ArgKind::String,
                "Action to perform: list, create, switch, delete",
            )
            .one_of(&["list", "create", "switch", "delete"]),
        )
        .arg(ToolArgument::optional(
            "name",
            ArgKind::String,
            "Branch name (required for create, switch, delete)",
        ))
        .destructive()
}

/// One handler type for every git operation; the variant picks the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitTool {
    Status,
    Diff,
    Log,
    Commit,
    Branch,
}

impl GitTool {
    pub fn name(&self) -> &'static str {
        match self {
            GitTool::Status => "git_status",
            GitTool::Diff => "git_diff",
            GitTool::Log => "git_log",
            GitTool::Commit => "git_commit",
            GitTool::Branch => "git_branch",
        }
    }
}

#[derive(Deserialize)]
struct DiffInput {
    #[serde(default)]
    staged: bool,
    path: Option<String>,
}

#[derive(Deserialize)]
struct LogInput {
    #[serde(default = "default_log_count")]
    count: u64,
}

fn default_log_count() -> u64 {
    10
}

#[derive(Deserialize)]
struct CommitInput {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum BranchAction {
    List,
    Create,
    Switch,
    Delete,
}

#[derive(Deserialize)]
struct BranchInput {
    action: BranchAction,
    name: Option<String>,
}

#[async_trait]
impl ToolHandler for GitTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let dir = ctx.working_dir.as_path();
        let outcome = match self {
            GitTool::Status => status(dir).await,
            GitTool::Diff => diff(dir, parse_args(args)?).await,
            GitTool::Log => log(dir, parse_args(args)?).await,
            GitTool::Commit => commit(dir, parse_args(args)?).await,
            GitTool::Branch => branch(dir, parse_args(args)?).await,
        };
        Ok(ToolResult::from_outcome(self.name(), outcome))
    }
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

async fn git(dir: &Path, args: &[&str]) -> Result<GitOutput, ToolError> {
    let child = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = timeout(GIT_TIMEOUT, child)
        .await
        .map_err(|_| ToolError::ExecutionFailed("Git command timed out".into()))??;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Fails with stderr (or `fallback` when stderr is empty) on a non-zero exit.
fn check(output: GitOutput, fallback: &str) -> Result<GitOutput, ToolError> {
    if output.success {
        return Ok(output);
    }
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        Err(ToolError::ExecutionFailed(fallback.to_string()))
    } else {
        Err(ToolError::ExecutionFailed(stderr.to_string()))
    }
}

async fn status(dir: &Path) -> Result<Value, ToolError> {
    let out = check(git(dir, &["status", "--porcelain", "-b"]).await?, "Not a git repository")?;
    Ok(json!({"status": out.stdout}))
}

async fn diff(dir: &Path, input: DiffInput) -> Result<Value, ToolError> {
    let mut args = vec!["diff"];
    if input.staged {
        args.push("--cached");
    }
    if let Some(path) = input.path.as_deref() {
        args.push("--");
        args.push(path);
    }

    let out = check(git(dir, &args).await?, "git diff failed")?;
    let (mut text, truncated) = truncate_chars(&out.stdout, MAX_DIFF_CHARS);
    if truncated {
        text.push_str("\n... [truncated]");
    }
    Ok(json!({"diff": text}))
}

async fn log(dir: &Path, input: LogInput) -> Result<Value, ToolError> {
    let count = format!("-{}", input.count.clamp(1, MAX_LOG_COUNT));
    let out = check(
        git(dir, &["log", count.as_str(), "--oneline", "--decorate"]).await?,
        "git log failed",
    )?;
    Ok(json!({"log": out.stdout}))
}

async fn commit(dir: &Path, input: CommitInput) -> Result<Value, ToolError> {
    let staged = git(dir, &["add", "-A"]).await?;
    if !staged.success {
        return Err(ToolError::ExecutionFailed(format!(
            "Failed to stage: {}",
            staged.stderr.trim()
        )));
    }

    let out = check(
        git(dir, &["commit", "-m", &input.message]).await?,
        "git commit failed",
    )?;
    Ok(json!({"message": input.message, "output": out.stdout}))
}

async fn branch(dir: &Path, input: BranchInput) -> Result<Value, ToolError> {
    if matches!(input.action, BranchAction::List) {
        let out = check(git(dir, &["branch", "-a"]).await?, "git branch failed")?;
        return Ok(json!({"branches": out.stdout}));
    }

    let name = match input.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(ToolError::Validation(format!(
                "Branch name required for {}",
                input.action.as_str()
            )))
        }
    };

    if name.starts_with('-') {
        return Err(ToolError::Validation(format!("Invalid branch name: {}", name)));
    }

    let args = match input.action {
        BranchAction::Create => vec!["checkout", "-b", name],
        BranchAction::Delete => vec!["branch", "-d", name],
        BranchAction::Switch | BranchAction::List => vec!["checkout", name],
    };

    let out = check(git(dir, &args).await?, "git branch failed")?;
    let output = if out.stdout.trim().is_empty() { out.stderr } else { out.stdout };
    Ok(json!({"action": input.action.as_str(), "branch": name, "output": output}))
}

impl BranchAction {
    fn as_str(&self) -> &'static str {
        match self {
            BranchAction::List => "list",
            BranchAction::Create => "create",
            BranchAction::Switch => "switch",
            BranchAction::Delete => "delete",
        }
    }
}
