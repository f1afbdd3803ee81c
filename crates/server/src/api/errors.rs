//! HTTP error responses: the sanitized error envelope.
//!
//! [`ApiError`] wraps a [`GateError`] and renders the canonical error body
//! `{error, message, type, details, retry_after?}` with the status from the
//! taxonomy. Rate-limit denials render the authoritative 429 shape with
//! `limit_info`. Details are always passed through the sanitizer; raw
//! engine messages never reach the wire.

use crate::api::rate_limit::RateDenial;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vectorgate_core::sanitize::sanitize_error_message;
use vectorgate_core::GateError;

#[derive(Debug)]
pub struct ApiError(pub GateError);

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        Self(err)
    }
}

fn message_for_kind(kind: &str) -> &'static str {
    match kind {
        "validation_error" => "Request validation failed",
        "authentication_error" => "Authentication failed",
        "authorization_error" => "Not authorized to perform this operation",
        "tenant_error" => "Tenant resolution failed",
        "connection_error" => "Vector database is unavailable",
        "operation_error" => "Vector database rejected the operation",
        "schema_conflict" => "Resource conflict",
        "not_found" => "Resource not found",
        "configuration_error" => "Server configuration error",
        _ => "An unexpected error occurred",
    }
}

/// Render the authoritative rate-limit denial body.
pub fn rate_limit_response(denial: &RateDenial) -> Response {
    let mut body = json!({
        "error": "Rate Limit Exceeded",
        "type": "rate_limit_error",
        "message": format!(
            "Too many requests. Limit: {} requests per {} seconds",
            denial.limit, denial.period_secs
        ),
        "limit_info": {
            "limit": denial.limit,
            "period": denial.period_secs,
            "retry_after": denial.retry_after_secs,
            "limit_type": denial.limit_type,
        },
    });
    if let Some(ref tier) = denial.tier {
        body["limit_info"]["tier"] = json!(tier);
        body["suggestion"] = json!("Consider upgrading your tier for higher limits");
    }
    (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if let GateError::RateLimited {
            limit,
            period_secs,
            retry_after_secs,
            limit_type,
            tier,
            ..
        } = &err
        {
            return rate_limit_response(&RateDenial {
                limit: *limit,
                period_secs: *period_secs,
                retry_after_secs: *retry_after_secs,
                limit_type: *limit_type,
                tier: tier.clone(),
            });
        }

        let kind = err.kind();
        let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = sanitize_error_message(&err.to_string());

        if status.is_server_error() || status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(kind, "{details}");
        } else {
            tracing::debug!(kind, "{details}");
        }

        let body = json!({
            "error": err.title(),
            "message": message_for_kind(kind),
            "type": kind,
            "details": details,
        });
        (status, axum::Json(body)).into_response()
    }
}
