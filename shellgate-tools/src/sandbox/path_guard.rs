use crate::error::ToolError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes an absolute path: drops `.`, folds `..` into its
/// parent and never climbs above the filesystem root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

pub(crate) fn absolutize(path: &Path) -> Result<PathBuf, ToolError> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ToolError::SandboxViolation(format!("Invalid sandbox root: {}", e)))?;
    Ok(normalize(&cwd.join(path)))
}

/// Resolves `relative` against `root` and rejects anything that lands
/// outside of it, including through symlinks.
///
/// Containment is checked per path component, so `/work-evil` is never
/// inside `/work`.
pub fn resolve(root: impl AsRef<Path>, relative: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
    let root = absolutize(root.as_ref())?;
    let relative = relative.as_ref();
    let target = normalize(&root.join(relative));

    if !target.starts_with(&root) {
        return Err(ToolError::SandboxViolation(format!(
            "Path escapes working directory: {}",
            relative.display()
        )));
    }

    check_real_path(&root, &target, relative)?;
    Ok(target)
}

/// Checks that the real location of `target` (or of its deepest existing
/// ancestor below `root`) is still inside the real root.
fn check_real_path(root: &Path, target: &Path, relative: &Path) -> Result<(), ToolError> {
    let Ok(real_root) = fs::canonicalize(root) else {
        // Nothing below a missing root can exist either.
        return Ok(());
    };

    let mut probe = target.to_path_buf();
    loop {
        if fs::symlink_metadata(&probe).is_ok() {
            let real = fs::canonicalize(&probe).map_err(|_| {
                ToolError::SandboxViolation(format!(
                    "Path cannot be resolved: {}",
                    relative.display()
                ))
            })?;
            if !real.starts_with(&real_root) {
                return Err(ToolError::SandboxViolation(format!(
                    "Symlink escapes working directory: {}",
                    relative.display()
                )));
            }
            return Ok(());
        }
        if probe == root || !probe.pop() {
            return Ok(());
        }
    }
}

/// Path resolver bound to one sandbox root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    sandbox_root: PathBuf,
}

impl PathGuard {
    pub fn new(sandbox_root: impl AsRef<Path>) -> Self {
        Self {
            sandbox_root: sandbox_root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.sandbox_root
    }

    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        resolve(&self.sandbox_root, relative)
    }

    /// Resolves a path that must be an existing regular file.
    pub fn resolve_file(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        let relative = relative.as_ref();
        let path = self.resolve(relative)?;
        if !path.exists() {
            return Err(ToolError::NotFound(format!("File not found: {}", relative.display())));
        }
        if !path.is_file() {
            return Err(ToolError::Validation(format!("Not a file: {}", relative.display())));
        }
        Ok(path)
    }

    /// Resolves a path that may be created or overwritten as a file.
    pub fn resolve_writable(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        let relative = relative.as_ref();
        let path = self.resolve(relative)?;
        if path.is_dir() {
            return Err(ToolError::Validation(format!(
                "Cannot write to {} as it is a directory",
                relative.display()
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_inner_parent_segments() {
        let resolved = resolve("/work", "a/b/../c").unwrap();
        assert_eq!(resolved, PathBuf::from("/work/a/c"));
    }

    #[test]
    fn rejects_parent_escape() {
        let result = resolve("/work", "../../etc/passwd");
        assert!(matches!(result, Err(ToolError::SandboxViolation(_))));
    }

    #[test]
    fn rejects_sibling_with_shared_prefix() {
        let result = resolve("/work", "../work-evil/file");
        assert!(matches!(result, Err(ToolError::SandboxViolation(_))));
    }

    #[test]
    fn rejects_absolute_path_outside_root() {
        let result = resolve("/work", "/etc/passwd");
        assert!(matches!(result, Err(ToolError::SandboxViolation(_))));
    }

    #[test]
    fn root_itself_is_allowed() {
        assert_eq!(resolve("/work", ".").unwrap(), PathBuf::from("/work"));
        assert_eq!(resolve("/work", "a/..").unwrap(), PathBuf::from("/work"));
    }
}
