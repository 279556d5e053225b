pub mod base;
pub mod calculate;
pub mod datetime;
pub mod file_delete;
pub mod file_list;
pub mod file_read;
pub mod file_search;
pub mod file_write;
pub mod git;
pub mod memory;
pub mod python_exec;
pub mod shell_exec;
pub mod web_fetch;

pub use base::{parse_args, ToolHandler, ToolResult};

const SENSITIVE_NAMES: &[&str] = &[
    ".env",
    ".ssh",
    ".aws",
    ".gnupg",
    "id_rsa",
    "id_ed25519",
    "credentials",
    "private_key",
    "secret",
    ".netrc",
    ".npmrc",
    "token",
];

/// Returns the sensitive fragment `path` contains, if any.
pub(crate) fn sensitive_fragment(path: &str) -> Option<&'static str> {
    let lower = path.to_lowercase();
    SENSITIVE_NAMES
        .iter()
        .copied()
        .find(|fragment| lower.contains(fragment))
}

/// Truncates to at most `max_chars` characters; reports whether it cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}
