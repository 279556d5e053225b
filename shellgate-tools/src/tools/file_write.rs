use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::sandbox::PathGuard;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const NAME: &str = "write_file";

/// Write-protected fragments: secrets plus shell startup files.
const PROTECTED: &[&str] = &[".env", ".ssh", ".aws", ".gnupg", "id_rsa", ".bash", ".profile", ".zsh"];

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Write content to a file. Creates parent directories if needed. Overwrites existing files.",
    )
    .arg(ToolArgument::required("path", ArgKind::String, "Relative path to the file to write"))
    .arg(ToolArgument::required("content", ArgKind::String, "Content to write to the file"))
    .destructive()
}

#[derive(Deserialize)]
struct FileWriteInput {
    path: String,
    content: String,
}

pub struct FileWriteTool;

#[async_trait]
impl ToolHandler for FileWriteTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: FileWriteInput = parse_args(args)?;
        let outcome = write(&ctx.working_dir, &ctx.call_id, &input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

async fn write(working_dir: &Path, call_id: &str, input: &FileWriteInput) -> Result<Value, ToolError> {
    let lower = input.path.to_lowercase();
    if let Some(fragment) = PROTECTED.iter().find(|p| lower.contains(*p)) {
        return Err(ToolError::SandboxViolation(format!(
            "Writing to sensitive file pattern blocked: {}",
            fragment
        )));
    }

    let path = PathGuard::new(working_dir).resolve_writable(&input.path)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // Write to a per-call sibling temp file and rename so readers never see
    // a partially written file. `create_new` refuses a planted symlink.
    let file_name = path
        .file_name()
        .ok_or_else(|| ToolError::Validation(format!("Not a file path: {}", input.path)))?;
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name.to_string_lossy(), call_id));
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await?;
    file.write_all(input.content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    if let Err(e) = fs::rename(&temp_path, &path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(json!({
        "path": input.path,
        "bytes_written": input.content.len(),
    }))
}
