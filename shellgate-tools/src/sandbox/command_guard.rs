use crate::error::ToolError;
use regex::{Regex, RegexSet};
use std::path::Path;
use std::sync::OnceLock;

const ALLOWED_COMMANDS: &[&str] = &[
    // files
    "ls", "cat", "head", "tail", "wc", "find", "grep", "awk", "sed", "cp", "mv", "mkdir",
    "rmdir", "touch",
    // development
    "python", "python3", "node", "npm", "npx", "cargo", "rustc", "go", "java", "javac",
    "make", "cmake", "gradle", "mvn", "git",
    // utilities
    "echo", "printf", "date", "which", "whereis", "tar", "unzip", "zip", "gzip", "ps", "df",
    "du",
];

const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "sudo", "su", "dd", "mkfs", "fdisk", "shutdown", "reboot", "init", "systemctl",
];

const BLOCKED_PATTERNS: &[&str] = &[
    r"rm\s+-rf",
    r">\s*/dev/",
    r"\|\s*(ba)?sh\b",
    r"curl.*\|",
    r"wget.*\|",
    r";\s*(ba)?sh\b",
    r"`.*`",
    r"\$\(.*\)",
    r"nc\s+-[el]",
    r"ncat.*-e",
    r"python3?\s+-c",
    r"perl\s+-e",
    r"ruby\s+-e",
    r"base64.*\|",
    r"\beval\s+",
    r"\bexec\s+",
    r"nohup\s+",
    r"screen\s+-dm",
    r"tmux\s+new",
    r"/etc/passwd",
    r"/etc/shadow",
    r"\.ssh/",
    r"\.gnupg/",
    r"\.aws/",
    r"id_rsa",
    r"\.bash_history",
];

const ALLOWED_ABSOLUTE: &[&str] = &["/dev/null", "/tmp"];

fn blocked_patterns() -> Option<&'static RegexSet> {
    static SET: OnceLock<Option<RegexSet>> = OnceLock::new();
    SET.get_or_init(|| {
        let patterns: Vec<String> = BLOCKED_PATTERNS.iter().map(|p| format!("(?i){p}")).collect();
        RegexSet::new(patterns).ok()
    })
    .as_ref()
}

fn absolute_paths() -> &'static Option<Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?:^|[\s=:'"(])(/[^\s;|&'"]*)"#).ok())
}

/// Screens a shell command line before it reaches `sh -c`.
pub struct CommandGuard;

impl CommandGuard {
    pub fn validate(command: &str, working_dir: &Path) -> Result<(), ToolError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ToolError::Validation("Empty command".into()));
        }
        if command.contains('\0') {
            return Err(ToolError::SandboxViolation("NUL byte in command".into()));
        }

        let program = command.split_whitespace().next().unwrap_or_default();
        let base_cmd = program.rsplit('/').next().unwrap_or(program);
        if !ALLOWED_COMMANDS.contains(&base_cmd) {
            return Err(ToolError::SandboxViolation(format!(
                "Command '{}' is not in the allowed list",
                base_cmd
            )));
        }

        let lowered = command.to_lowercase();
        for word in lowered.split(|c: char| c.is_whitespace() || ";|&()".contains(c)) {
            let word = word.rsplit('/').next().unwrap_or(word);
            if BLOCKED_COMMANDS.contains(&word) {
                return Err(ToolError::SandboxViolation(format!(
                    "Command '{}' is blocked for safety",
                    word
                )));
            }
        }

        // A pattern set that failed to compile refuses everything.
        if blocked_patterns().map_or(true, |set| set.is_match(command)) {
            return Err(ToolError::SandboxViolation(
                "Dangerous pattern detected in command".into(),
            ));
        }

        Self::validate_absolute_paths(command, working_dir)
    }

    fn validate_absolute_paths(command: &str, working_dir: &Path) -> Result<(), ToolError> {
        let Some(re) = absolute_paths() else {
            return Err(ToolError::Internal("Path screening unavailable".into()));
        };
        for capture in re.captures_iter(command) {
            let Some(found) = capture.get(1) else { continue };
            let path = found.as_str();
            if ALLOWED_ABSOLUTE
                .iter()
                .any(|allowed| Path::new(path).starts_with(allowed))
            {
                continue;
            }
            if !Path::new(path).starts_with(working_dir) {
                return Err(ToolError::SandboxViolation(format!(
                    "Access to path outside working directory blocked: {}",
                    path
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(cmd: &str) -> Result<(), ToolError> {
        CommandGuard::validate(cmd, Path::new("/work"))
    }

    #[test]
    fn allows_plain_commands() {
        assert!(check("ls -la").is_ok());
        assert!(check("cargo test --workspace").is_ok());
        assert!(check("npm run format").is_ok());
        assert!(check("cat /work/notes.txt").is_ok());
        assert!(check("ls /dev/null").is_ok());
    }

    #[test]
    fn rejects_unlisted_program() {
        assert!(matches!(check("vim a.txt"), Err(ToolError::SandboxViolation(_))));
    }

    #[test]
    fn rejects_blocked_words_anywhere() {
        assert!(check("ls && rm file").is_err());
        assert!(check("echo x; sudo ls").is_err());
    }

    #[test]
    fn rejects_substitution_and_pipes_to_shell() {
        assert!(check("echo $(whoami)").is_err());
        assert!(check("echo `id`").is_err());
        assert!(check("cat script | sh").is_err());
        assert!(check("python3 -c 'print(1)'").is_err());
    }

    #[test]
    fn rejects_absolute_paths_outside_working_dir() {
        assert!(check("cat /etc/hosts").is_err());
        assert!(check("ls /work-evil").is_err());
        assert!(check("ls /tmp/scratch").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(check("   "), Err(ToolError::Validation(_))));
    }
}
