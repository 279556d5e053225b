use regex::Regex;
use std::sync::OnceLock;

pub const MAX_OUTPUT_CHARS: usize = 100_000;
const TRUNCATION_NOTICE: &str = "\n\n... [Output truncated for security]";
const REDACTED: &str = "[REDACTED]";
const IP_PLACEHOLDER: &str = "[IP_ADDRESS]";

/// Keys whose value gets blanked when followed by `=` or `:`.
const SECRET_KEYS: &[&str] = &[r"api[_-]?key", "password", "token", "secret"];

/// A key may be closed by a quote, escaped or not, as in JSON output.
const KEY_CLOSE: &str = r#"\\?"?\s*[=:]\s*"#;

/// Escaped-quoted, quoted, then bare values. A bare value stops at a quote
/// or backslash so an escaped newline does not swallow the next line.
const VALUE: &str = r#"(?P<value>\\"[^"\\]*\\"|"(?:[^"\\]|\\.)*"|[^\s"\\]+)"#;

struct Rules {
    /// Prefixes whose value gets blanked; the `key` group is kept.
    secrets: Vec<Regex>,
    ipv4: Regex,
}

fn rules() -> Option<&'static Rules> {
    static RULES: OnceLock<Option<Rules>> = OnceLock::new();
    RULES
        .get_or_init(|| {
            let mut patterns: Vec<String> = SECRET_KEYS
                .iter()
                .map(|key| format!("(?i)(?P<key>{}{}){}", key, KEY_CLOSE, VALUE))
                .collect();
            patterns.push(r"(?i)(?P<key>bearer\s+)(?P<value>\S+)".to_string());
            patterns.push(format!(r"(?i)(?P<key>authorization{})(?P<value>[^\n]+)", KEY_CLOSE));
            let secrets = patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            let ipv4 = Regex::new(r"\b(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})\b").ok()?;
            Some(Rules { secrets, ipv4 })
        })
        .as_ref()
}

/// Keeps the quoting of a redacted value so JSON stays well-formed.
fn redact_value(value: &str) -> String {
    if value.starts_with("\\\"") && value.len() >= 4 {
        format!("\\\"{}\\\"", REDACTED)
    } else if value.starts_with('"') && value.len() >= 2 && value.ends_with('"') {
        format!("\"{}\"", REDACTED)
    } else {
        REDACTED.to_string()
    }
}

fn keep_ip(ip: &str) -> bool {
    ip.starts_with("127.") || ip == "0.0.0.0" || ip == "255.255.255.255"
}

/// Prepares tool output for a remote channel: truncates, redacts credential
/// values and masks IPv4 addresses other than loopback, unspecified and
/// broadcast.
pub fn sanitize_output(text: &str) -> String {
    let mut out = match text.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_NOTICE),
        None => text.to_string(),
    };

    let Some(rules) = rules() else {
        return "[output withheld]".to_string();
    };

    for rule in &rules.secrets {
        out = rule
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                format!("{}{}", &caps["key"], redact_value(&caps["value"]))
            })
            .into_owned();
    }

    rules
        .ipv4
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let ip = &caps[0];
            if keep_ip(ip) {
                ip.to_string()
            } else {
                IP_PLACEHOLDER.to_string()
            }
        })
        .into_owned()
}
