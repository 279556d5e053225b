use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::sandbox::PathGuard;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use crate::tools::{sensitive_fragment, truncate_chars};
use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

const NAME: &str = "search_files";
const MAX_FILES: usize = 100;
const MAX_MATCHES: usize = 50;
const MAX_LINE_CHARS: usize = 200;

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Search for text or regex patterns across files. Like grep. Returns matching lines.",
    )
    .arg(ToolArgument::required("pattern", ArgKind::String, "Text or regex pattern to search for"))
    .arg(
        ToolArgument::optional("path", ArgKind::String, "Directory or file to search in (default: current directory)")
            .with_default(json!(".")),
    )
    .arg(ToolArgument::optional(
        "file_pattern",
        ArgKind::String,
        "Glob pattern to filter files (e.g., '*.rs')",
    ))
}

#[derive(Deserialize)]
struct FileSearchInput {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
    file_pattern: Option<String>,
}

fn default_path() -> String {
    ".".to_string()
}

pub struct FileSearchTool;

#[async_trait]
impl ToolHandler for FileSearchTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: FileSearchInput = parse_args(args)?;
        let outcome = search(&ctx.working_dir, &input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

async fn search(working_dir: &Path, input: &FileSearchInput) -> Result<Value, ToolError> {
    let guard = PathGuard::new(working_dir);
    let target = guard.resolve(&input.path)?;
    if !target.exists() {
        return Err(ToolError::NotFound(format!("Path not found: {}", input.path)));
    }

    let regex = RegexBuilder::new(&input.pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ToolError::Validation(format!("Invalid regex: {}", e)))?;

    let glob: Option<GlobMatcher> = match &input.file_pattern {
        Some(pattern) => Some(
            Glob::new(pattern)
                .map_err(|e| ToolError::Validation(format!("Invalid file pattern: {}", e)))?
                .compile_matcher(),
        ),
        None => None,
    };

    let root = guard.resolve(".")?;
    let files = if target.is_file() {
        if sensitive_fragment(&relative(&root, &target)).is_some() {
            return Err(ToolError::SandboxViolation("Cannot search sensitive files".into()));
        }
        vec![target.clone()]
    } else {
        collect_files(&root, &target, glob.as_ref()).await?
    };

    let mut matches = Vec::new();
    let mut files_searched = 0;

    'files: for file in files.iter().take(MAX_FILES) {
        let Ok(bytes) = fs::read(file).await else {
            continue;
        };
        files_searched += 1;
        let text = String::from_utf8_lossy(&bytes);
        let rel = relative(&root, file);

        for (idx, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                let (snippet, _) = truncate_chars(line.trim_end(), MAX_LINE_CHARS);
                matches.push(json!({"file": rel, "line": idx + 1, "text": snippet}));
                if matches.len() >= MAX_MATCHES {
                    break 'files;
                }
            }
        }
    }

    Ok(json!({
        "pattern": input.pattern,
        "files_searched": files_searched,
        "matches": matches,
    }))
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string()
}

/// Walks `dir` skipping hidden entries and sensitive files.
async fn collect_files(
    root: &Path,
    dir: &Path,
    glob: Option<&GlobMatcher>,
) -> Result<Vec<PathBuf>, ToolError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        let mut batch = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            batch.push(entry);
        }
        batch.sort_by_key(|entry| entry.file_name());

        for entry in batch {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() || sensitive_fragment(&relative(root, &path)).is_some() {
                continue;
            }
            if let Some(glob) = glob {
                if !glob.is_match(&name) {
                    continue;
                }
            }
            files.push(path);
        }
    }

    Ok(files)
}
