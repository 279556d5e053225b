use regex::RegexSet;
use serde::Serialize;
use std::sync::OnceLock;

/// Refused outright; never enters the approval flow.
const BLOCKED_PATTERNS: &[&str] = &[
    r"rm\s+-rf\s+[/~]",
    r">\s*/dev/s?d",
    r"mkfs\.",
    r"dd\s+if=",
    r":\(\)\s*\{\s*:\s*\|\s*:\s*;\s*\}\s*;:",
    r"while\s+true",
    r"nc\s+-l",
    r"bash\s+-i",
];

/// Allowed only after confirmation (and local approval when enabled).
const DANGEROUS_PATTERNS: &[&str] = &[
    r"\brm\b",
    r"\bdelete\b",
    r"\bremove\b",
    r"\bsudo\b",
    r"\bchmod\b",
    r"\bchown\b",
    r"\bformat\b",
    r"\bwipe\b",
    r"\bkill\b",
    r"\bpassword\b",
    r"\bsecret\b",
    r"\btoken\b",
    r"\bapi.?key\b",
    r"\bssh\b",
    r"\bcurl\b",
    r"\bwget\b",
    r"\beval\b",
    r"\bexec\b",
    r"\.env\b",
    r"\.ssh",
    r"\.aws",
    r"\binstall\b",
    r"\bpip\b",
    r"\bapt\b",
    r"/etc/",
    r"/sys/",
    r"/proc/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Dangerous,
    Blocked,
}

fn compile(patterns: &[&str]) -> Option<RegexSet> {
    RegexSet::new(patterns.iter().map(|p| format!("(?i){p}"))).ok()
}

fn blocked() -> Option<&'static RegexSet> {
    static SET: OnceLock<Option<RegexSet>> = OnceLock::new();
    SET.get_or_init(|| compile(BLOCKED_PATTERNS)).as_ref()
}

fn dangerous() -> Option<&'static RegexSet> {
    static SET: OnceLock<Option<RegexSet>> = OnceLock::new();
    SET.get_or_init(|| compile(DANGEROUS_PATTERNS)).as_ref()
}

/// Classifies a free-text request. Blocked wins over dangerous; a pattern
/// set that failed to compile classifies everything as blocked.
pub fn classify(message: &str) -> RiskLevel {
    let (Some(blocked), Some(dangerous)) = (blocked(), dangerous()) else {
        return RiskLevel::Blocked;
    };
    if blocked.is_match(message) {
        RiskLevel::Blocked
    } else if dangerous.is_match(message) {
        RiskLevel::Dangerous
    } else {
        RiskLevel::Safe
    }
}
