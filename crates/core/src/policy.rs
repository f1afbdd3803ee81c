//! Pattern matcher for CORS origins and trusted hosts.
//!
//! Each pattern is one of:
//! - an exact string, matched by equality;
//! - a wildcard where a single `*` stands for any substring — a pattern
//!   beginning with `*.` also matches the bare suffix (`*.example.com`
//!   matches both `example.com` and `api.example.com`);
//! - a regular expression prefixed with `re:`, evaluated with full-match
//!   semantics.

use regex::Regex;

/// Match `value` against a single allowed pattern.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(raw) = pattern.strip_prefix("re:") {
        return match Regex::new(&format!("^(?:{raw})$")) {
            Ok(re) => re.is_match(value),
            Err(e) => {
                tracing::warn!("invalid regex pattern in allowed list: {e}");
                false
            }
        };
    }
    if pattern.contains('*') {
        // `*.example.com` also matches the bare domain.
        if let Some(domain) = pattern.strip_prefix("*.") {
            if !domain.contains('*') {
                return value == domain
                    || value
                        .strip_suffix(domain)
                        .is_some_and(|head| head.ends_with('.'));
            }
        }
        let escaped = regex::escape(pattern).replace(r"\*", ".*");
        return match Regex::new(&format!("^{escaped}$")) {
            Ok(re) => re.is_match(value),
            Err(e) => {
                tracing::warn!("wildcard pattern conversion failed: {e}");
                false
            }
        };
    }
    value == pattern
}

/// Returns `true` if `value` matches any entry in `allowed`.
///
/// `value` should already be normalized (hostname only for host checks,
/// full origin or hostname for origin checks, per the caller).
pub fn is_allowed(value: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|p| matches_pattern(value, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_pattern("api.example.com", "api.example.com"));
        assert!(!matches_pattern("api.example.com", "example.com"));
    }

    #[test]
    fn test_star_matches_everything() {
        assert!(matches_pattern("anything", "*"));
        assert!(matches_pattern("", "*"));
    }

    #[test]
    fn test_subdomain_wildcard_matches_bare_domain() {
        assert!(matches_pattern("example.com", "*.example.com"));
        assert!(matches_pattern("api.example.com", "*.example.com"));
        assert!(matches_pattern("a.b.example.com", "*.example.com"));
        assert!(!matches_pattern("evilexample.com", "*.example.com"));
        assert!(!matches_pattern("example.org", "*.example.com"));
    }

    #[test]
    fn test_infix_wildcard() {
        assert!(matches_pattern("https://app.example.com", "https://*.example.com"));
        assert!(matches_pattern("host-17", "host-*"));
        assert!(!matches_pattern("other-17", "host-*"));
    }

    #[test]
    fn test_regex_pattern_full_match() {
        assert!(matches_pattern("api.example.com", r"re:.*\.example\.com"));
        assert!(!matches_pattern("api.example.com.evil", r"re:.*\.example\.com"));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        assert!(!matches_pattern("anything", "re:["));
    }

    #[test]
    fn test_is_allowed_over_list() {
        let allowed = vec!["localhost".to_string(), "*.example.com".to_string()];
        assert!(is_allowed("localhost", &allowed));
        assert!(is_allowed("api.example.com", &allowed));
        assert!(!is_allowed("attacker.net", &allowed));
        assert!(!is_allowed("localhost", &[]));
    }
}
