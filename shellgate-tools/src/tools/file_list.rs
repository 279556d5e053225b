use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::sandbox::PathGuard;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

const NAME: &str = "get_files_info";
const MAX_ENTRIES: usize = 1000;

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "List files and directories in the specified path with sizes and types. Use to explore project structure.",
    )
    .arg(
        ToolArgument::optional("path", ArgKind::String, "Relative path to list (default: current directory)")
            .with_default(json!(".")),
    )
    .arg(
        ToolArgument::optional("recursive", ArgKind::Boolean, "Whether to list recursively (default: false)")
            .with_default(json!(false)),
    )
}

#[derive(Deserialize)]
struct FileListInput {
    #[serde(default = "current_dir")]
    path: String,
    #[serde(default)]
    recursive: bool,
}

fn current_dir() -> String {
    ".".to_string()
}

pub struct FileListTool;

#[async_trait]
impl ToolHandler for FileListTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: FileListInput = parse_args(args)?;
        let outcome = list(&ctx.working_dir, &input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

async fn list(working_dir: &Path, input: &FileListInput) -> Result<Value, ToolError> {
    let guard = PathGuard::new(working_dir);
    let target = guard.resolve(&input.path)?;

    if !target.exists() {
        return Err(ToolError::NotFound(format!("Path not found: {}", input.path)));
    }
    if !target.is_dir() {
        return Err(ToolError::Validation(format!("Not a directory: {}", input.path)));
    }

    let mut files = Vec::new();
    let mut pending: Vec<PathBuf> = vec![target.clone()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        let mut batch = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            batch.push(entry);
        }
        batch.sort_by_key(|entry| entry.file_name());

        for entry in batch {
            if files.len() >= MAX_ENTRIES {
                break;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }

            let full = entry.path();
            let rel = full
                .strip_prefix(&target)
                .unwrap_or(&full)
                .to_string_lossy()
                .to_string();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                files.push(json!({"name": format!("{rel}/"), "type": "directory", "size": 0}));
                if input.recursive {
                    pending.push(full);
                }
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push(json!({"name": rel, "type": "file", "size": size}));
            }
        }
    }

    Ok(json!({"path": input.path, "files": files}))
}
