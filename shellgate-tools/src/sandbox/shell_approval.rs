use crate::error::ToolError;
use crate::sandbox::PathGuard;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

pub const DEFAULT_APPROVAL_FILE: &str = ".shellgate_shell_approve";

/// Host-side switch for process-spawning tools: a call runs only while an
/// approval file exists in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellApproval {
    /// Relative to the working directory.
    pub file_name: String,
    /// When set, the file must contain exactly this token.
    pub token: Option<String>,
    /// Each approval file admits a single call.
    pub consume: bool,
}

impl Default for ShellApproval {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_APPROVAL_FILE.to_string(),
            token: None,
            consume: false,
        }
    }
}

impl ShellApproval {
    /// Fails unless the approval file is present and, if a token is
    /// configured, matches it.
    ///
    /// A consuming check first renames the file to a per-call name, so two
    /// concurrent calls can never share one approval. A claimed file is
    /// gone even when its token turns out to be wrong.
    pub async fn check(&self, working_dir: &Path, call_id: &str) -> Result<(), ToolError> {
        let path = PathGuard::new(working_dir).resolve(&self.file_name)?;

        let content = if self.consume {
            let claimed = path.with_file_name(format!("{}.{}.claim", self.file_name_only(), call_id));
            match fs::rename(&path, &claimed).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => return Err(self.missing()),
                Err(e) => return Err(e.into()),
            }
            let content = fs::read_to_string(&claimed).await;
            let _ = fs::remove_file(&claimed).await;
            content?
        } else {
            match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => return Err(self.missing()),
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            if content.trim() != token {
                warn!(call_id, "Shell approval token mismatch");
                return Err(ToolError::SandboxViolation(
                    "Local approval token missing or invalid".into(),
                ));
            }
        }
        info!(call_id, consumed = self.consume, "Shell approval accepted");
        Ok(())
    }

    fn file_name_only(&self) -> String {
        Path::new(&self.file_name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.file_name.clone())
    }

    fn missing(&self) -> ToolError {
        ToolError::SandboxViolation(format!(
            "Local approval required. Create {} in working directory.",
            self.file_name
        ))
    }
}
