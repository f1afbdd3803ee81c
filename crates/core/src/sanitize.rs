//! Secret-redacting sanitizer for error messages and log lines.
//!
//! Every outbound error `details` string and every log line containing
//! externally-derived text goes through [`sanitize_error_message`] or
//! [`sanitize_for_log`]. Redaction replaces credentials, IPv4 literals,
//! email-shaped tokens and connection URIs with `[REDACTED]`; control
//! characters are stripped to prevent log forging.

use regex::Regex;
use std::sync::LazyLock;

/// Replacement token for redacted content.
pub const REDACTED: &str = "[REDACTED]";

/// Maximum sanitized log line length before truncation.
const MAX_LOG_LEN: usize = 200;

static SENSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Connection URIs first so embedded credentials vanish in one pass.
        r"(?i)(mongodb|postgresql|mysql|milvus)://[^\s]+",
        r#"(?i)password[=:\s]+[^\s'"]+"#,
        r#"(?i)token[=:\s]+[^\s'"]+"#,
        r#"(?i)key[=:\s]+[^\s'"]+"#,
        r#"(?i)secret[=:\s]+[^\s'"]+"#,
        r#"(?i)auth[=:\s]+[^\s'"]+"#,
        // IPv4 literals.
        r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b",
        // Email-shaped tokens.
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static sanitizer pattern"))
    .collect()
});

/// Strip control characters; CR, LF and tab become a single space.
fn strip_control_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\r' | '\n' | '\t' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Sanitize an error message before it leaves the process.
///
/// Applies every redaction pattern, then strips control characters.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        sanitized = pattern.replace_all(&sanitized, REDACTED).into_owned();
    }
    strip_control_chars(&sanitized)
}

/// Sanitize an arbitrary value for inclusion in a log line.
///
/// Strips control characters and caps the length to prevent log flooding.
pub fn sanitize_for_log(value: &str) -> String {
    let mut sanitized = strip_control_chars(value);
    if sanitized.len() > MAX_LOG_LEN {
        let mut cut = MAX_LOG_LEN - 3;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("...");
    }
    sanitized
}
