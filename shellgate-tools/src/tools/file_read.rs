use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::sandbox::PathGuard;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use crate::tools::{sensitive_fragment, truncate_chars};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use tokio::fs;

const NAME: &str = "get_file_content";

pub fn descriptor(max_chars: usize) -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Read the contents of a file. Large files are truncated. Use for reading source code, configs, docs.",
    )
    .arg(ToolArgument::required("path", ArgKind::String, "Relative path to the file to read"))
    .arg(
        ToolArgument::optional("max_chars", ArgKind::Integer, "Maximum characters to return")
            .with_default(json!(max_chars)),
    )
}

#[derive(Deserialize)]
struct FileReadInput {
    path: String,
    #[serde(default = "default_max_chars")]
    max_chars: usize,
}

fn default_max_chars() -> usize {
    10_000
}

pub struct FileReadTool;

#[async_trait]
impl ToolHandler for FileReadTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: FileReadInput = parse_args(args)?;
        let outcome = read(&ctx.working_dir, &input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

async fn read(working_dir: &Path, input: &FileReadInput) -> Result<Value, ToolError> {
    if let Some(fragment) = sensitive_fragment(&input.path) {
        return Err(ToolError::SandboxViolation(format!(
            "Cannot read sensitive files matching '{}'",
            fragment
        )));
    }

    let path = PathGuard::new(working_dir).resolve_file(&input.path)?;
    let bytes = fs::read(&path).await?;
    let text = String::from_utf8_lossy(&bytes);
    let (content, truncated) = truncate_chars(&text, input.max_chars);

    Ok(json!({
        "path": input.path,
        "content": content,
        "truncated": truncated,
    }))
}
