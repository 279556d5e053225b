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

const NAME: &str = "delete_file";

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(NAME, "Delete a file from the file system. Use with caution.")
        .arg(ToolArgument::required("path", ArgKind::String, "Relative path to the file to delete"))
        .destructive()
}

#[derive(Deserialize)]
struct FileDeleteInput {
    path: String,
}

pub struct FileDeleteTool;

#[async_trait]
impl ToolHandler for FileDeleteTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: FileDeleteInput = parse_args(args)?;
        let outcome = delete(&ctx.working_dir, &input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

async fn delete(working_dir: &Path, input: &FileDeleteInput) -> Result<Value, ToolError> {
    // Directories are refused by resolve_file.
    let path = PathGuard::new(working_dir).resolve_file(&input.path)?;
    fs::remove_file(&path).await?;
    Ok(json!({"path": input.path, "deleted": true}))
}
