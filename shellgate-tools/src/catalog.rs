//! Static table of built-in tools.
//!
//! Each entry knows how to build its descriptor and handler; the registry
//! walks the table once at startup and records entries that fail to build.

use crate::descriptor::ToolDescriptor;
use crate::error::ToolError;
use crate::sandbox::ShellApproval;
use crate::tools::{
    calculate, datetime, file_delete, file_list, file_read, file_search, file_write, git, memory,
    python_exec, shell_exec, web_fetch, ToolHandler,
};
use std::sync::Arc;
use std::time::Duration;

pub type BuiltTool = (ToolDescriptor, Arc<dyn ToolHandler>);

/// Settings shared by tool constructors.
#[derive(Debug, Clone)]
pub struct CatalogContext {
    pub max_file_chars: usize,
    pub http_timeout: Duration,
    /// Gate for `shell_command` and `run_python_file`; `None` disables it.
    pub shell_approval: Option<ShellApproval>,
}

impl Default for CatalogContext {
    fn default() -> Self {
        Self {
            max_file_chars: 10_000,
            http_timeout: Duration::from_secs(30),
            shell_approval: None,
        }
    }
}

pub struct BuiltinTool {
    pub name: &'static str,
    pub build: fn(&CatalogContext) -> Result<BuiltTool, ToolError>,
}

fn build_files_info(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((file_list::descriptor(), Arc::new(file_list::FileListTool)))
}

fn build_file_content(ctx: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((
        file_read::descriptor(ctx.max_file_chars),
        Arc::new(file_read::FileReadTool),
    ))
}

fn build_write_file(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((file_write::descriptor(), Arc::new(file_write::FileWriteTool)))
}

fn build_delete_file(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((file_delete::descriptor(), Arc::new(file_delete::FileDeleteTool)))
}

fn build_search_files(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((file_search::descriptor(), Arc::new(file_search::FileSearchTool)))
}

fn build_git_status(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((git::status_descriptor(), Arc::new(git::GitTool::Status)))
}

fn build_git_diff(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((git::diff_descriptor(), Arc::new(git::GitTool::Diff)))
}

fn build_git_log(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((git::log_descriptor(), Arc::new(git::GitTool::Log)))
}

fn build_git_commit(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((git::commit_descriptor(), Arc::new(git::GitTool::Commit)))
}

fn build_git_branch(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((git::branch_descriptor(), Arc::new(git::GitTool::Branch)))
}

fn build_shell_command(ctx: &CatalogContext) -> Result<BuiltTool, ToolError> {
    let tool = shell_exec::ShellExecTool::new(ctx.shell_approval.clone());
    Ok((shell_exec::descriptor(), Arc::new(tool)))
}

fn build_run_python_file(ctx: &CatalogContext) -> Result<BuiltTool, ToolError> {
    let tool = python_exec::PythonExecTool::new(ctx.shell_approval.clone());
    Ok((python_exec::descriptor(), Arc::new(tool)))
}

fn build_fetch_url(ctx: &CatalogContext) -> Result<BuiltTool, ToolError> {
    let tool = web_fetch::WebFetchTool::new(ctx.http_timeout)?;
    Ok((web_fetch::descriptor(), Arc::new(tool)))
}

fn build_datetime(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((datetime::descriptor(), Arc::new(datetime::DateTimeTool)))
}

fn build_calculate(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((calculate::descriptor(), Arc::new(calculate::CalculateTool)))
}

fn build_save_memory(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((memory::save_descriptor(), Arc::new(memory::MemoryTool::Save)))
}

fn build_get_memory(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((memory::get_descriptor(), Arc::new(memory::MemoryTool::Get)))
}

fn build_delete_memory(_: &CatalogContext) -> Result<BuiltTool, ToolError> {
    Ok((memory::delete_descriptor(), Arc::new(memory::MemoryTool::Delete)))
}

pub const BUILTIN_TOOLS: &[BuiltinTool] = &[
    BuiltinTool { name: "get_files_info", build: build_files_info },
    BuiltinTool { name: "get_file_content", build: build_file_content },
    BuiltinTool { name: "write_file", build: build_write_file },
    BuiltinTool { name: "delete_file", build: build_delete_file },
    BuiltinTool { name: "search_files", build: build_search_files },
    BuiltinTool { name: "git_status", build: build_git_status },
    BuiltinTool { name: "git_diff", build: build_git_diff },
    BuiltinTool { name: "git_log", build: build_git_log },
    BuiltinTool { name: "git_commit", build: build_git_commit },
    BuiltinTool { name: "git_branch", build: build_git_branch },
    BuiltinTool { name: "shell_command", build: build_shell_command },
    BuiltinTool { name: "run_python_file", build: build_run_python_file },
    BuiltinTool { name: "fetch_url", build: build_fetch_url },
    BuiltinTool { name: "datetime", build: build_datetime },
    BuiltinTool { name: "calculate", build: build_calculate },
    BuiltinTool { name: "save_memory", build: build_save_memory },
    BuiltinTool { name: "get_memory", build: build_get_memory },
    BuiltinTool { name: "delete_memory", build: build_delete_memory },
];

/// Read-only tools plus `write_file`; the default surface for remote chat.
pub const DEFAULT_CHAT_TOOLS: &[&str] = &[
    "get_files_info",
    "get_file_content",
    "write_file",
    "search_files",
    "git_status",
    "git_diff",
    "git_log",
    "calculate",
    "datetime",
];
