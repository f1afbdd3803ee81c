//! Typed error taxonomy shared by every layer of the gateway.
//!
//! Leaf code raises a [`GateError`] with a kind; the service-method wrapper in
//! the server maps the kind to an HTTP status and a machine `type` code for the
//! error envelope. Messages may contain externally-derived strings and must be
//! passed through [`crate::sanitize::sanitize_error_message`] before leaving
//! the process.

use thiserror::Error;

/// Application-level error with a stable machine-readable kind.
#[derive(Debug, Error)]
pub enum GateError {
    /// Request shape, dimension mismatch, bad tenant code (400).
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Authentication(String),

    /// Authenticated but not permitted (403).
    #[error("{0}")]
    Authorization(String),

    /// Tenant mismatch or unknown tenant (400).
    #[error("{0}")]
    Tenant(String),

    /// Rate limit exceeded (429).
    #[error("{message}")]
    RateLimited {
        message: String,
        limit: u32,
        period_secs: u64,
        retry_after_secs: u64,
        /// `"ip"` or `"tenant"`.
        limit_type: &'static str,
        /// Tier name for tenant limits, absent for IP limits.
        tier: Option<String>,
    },

    /// Vector DB unreachable or handshake failed (503).
    #[error("{0}")]
    Connection(String),

    /// All pool entries busy and the pool is full (503).
    #[error("{0}")]
    PoolExhausted(String),

    /// The vector DB rejected an operation on a healthy connection (400).
    #[error("{0}")]
    Operation(String),

    /// Collection exists with an incompatible schema (409).
    #[error("{0}")]
    SchemaConflict(String),

    /// Resource not found (404).
    #[error("{0}")]
    NotFound(String),

    /// Resource already exists (409).
    #[error("{0}")]
    AlreadyExists(String),

    /// Invalid startup configuration (500).
    #[error("{0}")]
    Configuration(String),

    /// Secret encryption or decryption failed (500).
    #[error("{0}")]
    Encryption(String),

    /// Unexpected internal failure (500).
    #[error("{0}")]
    Internal(String),
}

impl GateError {
    /// Stable machine code used in error envelopes (spec'd taxonomy).
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Validation(_) => "validation_error",
            GateError::Authentication(_) => "authentication_error",
            GateError::Authorization(_) => "authorization_error",
            GateError::Tenant(_) => "tenant_error",
            GateError::RateLimited { .. } => "rate_limit_error",
            GateError::Connection(_) | GateError::PoolExhausted(_) => "connection_error",
            GateError::Operation(_) => "operation_error",
            GateError::SchemaConflict(_) | GateError::AlreadyExists(_) => "schema_conflict",
            GateError::NotFound(_) => "not_found",
            GateError::Configuration(_) => "configuration_error",
            GateError::Encryption(_) => "internal_error",
            GateError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code for the kind.
    pub fn status(&self) -> u16 {
        match self {
            GateError::Validation(_) | GateError::Tenant(_) | GateError::Operation(_) => 400,
            GateError::Authentication(_) => 401,
            GateError::Authorization(_) => 403,
            GateError::NotFound(_) => 404,
            GateError::SchemaConflict(_) | GateError::AlreadyExists(_) => 409,
            GateError::RateLimited { .. } => 429,
            GateError::Connection(_) | GateError::PoolExhausted(_) => 503,
            GateError::Configuration(_)
            | GateError::Encryption(_)
            | GateError::Internal(_) => 500,
        }
    }

    /// Human title used in the `error` field of the envelope.
    pub fn title(&self) -> &'static str {
        match self {
            GateError::Validation(_) => "Validation Error",
            GateError::Authentication(_) => "Authentication Failed",
            GateError::Authorization(_) => "Not Authorized",
            GateError::Tenant(_) => "Tenant Error",
            GateError::RateLimited { .. } => "Rate Limit Exceeded",
            GateError::Connection(_) => "Service Unavailable",
            GateError::PoolExhausted(_) => "Connection Pool Exhausted",
            GateError::Operation(_) => "Operation Failed",
            GateError::SchemaConflict(_) => "Schema Conflict",
            GateError::NotFound(_) => "Not Found",
            GateError::AlreadyExists(_) => "Already Exists",
            GateError::Configuration(_) => "Configuration Error",
            GateError::Encryption(_) => "Internal Server Error",
            GateError::Internal(_) => "Internal Server Error",
        }
    }
}

/// Convenience alias used across the workspace.
pub type GateResult<T> = Result<T, GateError>;
