//! Structured audit logging for security-sensitive operations.
//!
//! [`AuditContext`] is inserted by the auth middleware into request
//! extensions; handlers and middleware emit entries with `target: "audit"`
//! so operators can filter or route them (`RUST_LOG=audit=info`).

/// Identity and request context for audit logging.
#[derive(Clone, Debug)]
pub struct AuditContext {
    /// Authenticated username, or "anonymous".
    pub username: String,
    /// Client fingerprint if resolved.
    pub fingerprint: Option<String>,
    /// Client IP from `X-Forwarded-For` / `X-Real-IP` headers, or "-".
    pub client_ip: String,
}

impl AuditContext {
    pub fn anonymous(client_ip: String) -> Self {
        Self {
            username: "anonymous".to_string(),
            fingerprint: None,
            client_ip,
        }
    }
}

/// Extract client IP from request headers (X-Forwarded-For → X-Real-IP → "-").
pub fn extract_client_ip(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or("-").trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "-".to_string())
}

/// Emit a structured audit log entry.
pub fn audit_event(ctx: &AuditContext, action: &str, resource: &str, outcome: &str) {
    tracing::info!(
        target: "audit",
        actor = %ctx.username,
        fingerprint = ctx.fingerprint.as_deref().unwrap_or("-"),
        client_ip = %ctx.client_ip,
        action = %action,
        resource = %resource,
        outcome = %outcome,
        "audit"
    );
}
