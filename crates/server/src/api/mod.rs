//! HTTP surface: versioned routes and the ordered middleware pipeline.
//!
//! Request processing order (outermost to innermost): request id/span →
//! security headers → CORS → trusted host → tenant resolution + request
//! validation → auth → rate limits (IP, then tenant) → request logging →
//! metrics → handler. Policy lists (CORS origins, trusted hosts) resolve
//! per tenant through the config store and fall back to the global
//! defaults from settings.

/// Structured audit logging.
pub mod audit;
/// Sanitized error envelope and the 429 body.
pub mod errors;
/// Request handlers, application state, service-method wrapper.
pub mod handlers;
/// Prometheus metrics recording.
pub mod metrics;
/// Request/response DTOs.
pub mod models;
/// Fixed-window IP + tenant rate limiters.
pub mod rate_limit;

use crate::api::audit::AuditContext;
use crate::api::errors::{rate_limit_response, ApiError};
use crate::api::handlers::{AppState, AuthContext, TenantContext};
use crate::health;
use axum::body::{to_bytes, Body};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use vectorgate_core::config;
use vectorgate_core::policy::is_allowed;
use vectorgate_core::sanitize::sanitize_for_log;
use vectorgate_core::GateError;

/// Tenant codes are opaque identifiers: `[A-Za-z0-9_-]{1,256}`.
fn valid_tenant_code(tenant: &str) -> bool {
    !tenant.is_empty()
        && tenant.len() <= config::MAX_TENANT_CODE_LEN
        && tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

fn header_str<'a>(req_headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    req_headers.get(name).and_then(|v| v.to_str().ok())
}

/// Endpoints reachable without credentials.
fn is_public(path: &str) -> bool {
    matches!(path, "/" | "/health" | "/health/live" | "/health/ready")
}

/// Endpoints requiring the `admin` action.
fn requires_admin(path: &str) -> bool {
    path.starts_with("/api/v1/vector_store/set_vector_store")
        || path.starts_with("/api/v1/vector_store/generate_schema")
        || path.starts_with("/api/v1/vector_store_users/")
        || path.starts_with("/api/v1/config/")
        || path.starts_with("/api/v1/admin/")
        || path == "/api/v1/metrics"
        || path == "/health/connections"
}

fn hostname_of(value: &str) -> String {
    let no_scheme = value.split("://").last().unwrap_or(value);
    no_scheme
        .split('/')
        .next()
        .unwrap_or(no_scheme)
        .split(':')
        .next()
        .unwrap_or(no_scheme)
        .to_lowercase()
}

fn apply_cors_headers(response: &mut Response, origin: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// CORS with tenant-scoped origin lists. Preflights answer 204 when the
/// origin matches, 403 otherwise; matched-origin responses carry the CORS
/// headers.
async fn cors_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let tenant = header_str(req.headers(), "x-tenant-code")
        .unwrap_or_default()
        .to_string();
    let origin = header_str(req.headers(), "origin").map(str::to_string);

    let Some(origin) = origin else {
        return next.run(req).await;
    };

    let mut origins = state.config.get_list("cors_origins", &tenant);
    if origins.is_empty() {
        origins = state.settings.cors_origins.clone();
    }

    let allowed = is_allowed(&origin, &origins) || is_allowed(&hostname_of(&origin), &origins);
    if !allowed {
        tracing::warn!(
            origin = %sanitize_for_log(&origin),
            tenant = %sanitize_for_log(&tenant),
            "blocked cross-origin request"
        );
        return ApiError(GateError::Authorization(format!(
            "origin '{}' not allowed",
            sanitize_for_log(&origin)
        )))
        .into_response();
    }

    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(&mut response, &origin);
        return response;
    }

    let mut response = next.run(req).await;
    apply_cors_headers(&mut response, &origin);
    response
}

/// Reject requests whose Host is not in the tenant's trusted list.
async fn trusted_host_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let tenant = header_str(req.headers(), "x-tenant-code")
        .unwrap_or_default()
        .to_string();
    let host = hostname_of(header_str(req.headers(), "host").unwrap_or_default());

    let mut trusted = state.config.get_list("trusted_hosts", &tenant);
    if trusted.is_empty() {
        trusted = state.settings.trusted_hosts.clone();
    }
    let trusted: Vec<String> = trusted.iter().map(|h| h.to_lowercase()).collect();

    if !is_allowed(&host, &trusted) {
        tracing::warn!(
            host = %sanitize_for_log(&host),
            tenant = %sanitize_for_log(&tenant),
            "blocked request from untrusted host"
        );
        return ApiError(GateError::Validation(format!(
            "host '{}' is not trusted",
            sanitize_for_log(&host)
        )))
        .into_response();
    }
    next.run(req).await
}

/// Resolve the tenant (header wins over body field, then query string),
/// enforce the body size cap and the JSON content type, and re-materialize
/// the buffered body for downstream extractors.
async fn context_middleware(req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    let header_tenant = header_str(&parts.headers, "x-tenant-code")
        .unwrap_or_default()
        .to_string();
    let query_tenant = parts
        .uri
        .query()
        .and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("tenant_code="))
        })
        .unwrap_or_default()
        .to_string();

    let buffers_body = parts.method != Method::GET
        && parts.method != Method::HEAD
        && path.starts_with("/api/v1/");

    let mut body_tenant = String::new();
    let body = if buffers_body {
        let bytes = match to_bytes(body, config::MAX_REQUEST_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return ApiError(GateError::Validation(format!(
                    "request body exceeds {} bytes",
                    config::MAX_REQUEST_BODY_BYTES
                )))
                .into_response()
            }
        };
        if !bytes.is_empty() {
            let is_json = header_str(&parts.headers, "content-type")
                .map(|ct| ct.starts_with("application/json"))
                .unwrap_or(false);
            if !is_json {
                return ApiError(GateError::Validation(
                    "content type must be application/json".into(),
                ))
                .into_response();
            }
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                if let Some(tenant) = value.get("tenant_code").and_then(|v| v.as_str()) {
                    body_tenant = tenant.to_string();
                }
            }
        }
        Body::from(bytes)
    } else {
        body
    };

    let tenant = [header_tenant, body_tenant, query_tenant]
        .into_iter()
        .find(|t| !t.is_empty())
        .unwrap_or_default();
    if !tenant.is_empty() && !valid_tenant_code(&tenant) {
        return ApiError(GateError::Validation(
            "tenant code must match [A-Za-z0-9_-]{1,256}".into(),
        ))
        .into_response();
    }

    parts.extensions.insert(TenantContext(tenant));
    next.run(Request::from_parts(parts, body)).await
}

/// Parse `user:secret` (or `user|secret`) credentials from a header value.
fn split_credentials(raw: &str) -> Option<(String, String)> {
    let sep = raw.find(|c| c == ':' || c == '|')?;
    let (user, secret) = raw.split_at(sep);
    let secret = &secret[1..];
    if user.is_empty() || secret.is_empty() {
        return None;
    }
    Some((user.to_string(), secret.to_string()))
}

/// Bearer authentication with tenant binding, admin gating and DB-token
/// extraction.
async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let client_ip = audit::extract_client_ip(req.headers());

    let db_token = header_str(req.headers(), "flouds-vectordb-token")
        .and_then(split_credentials)
        .map(|(user, secret)| crate::milvus::vector_store::DbCredentials { user, secret });

    if state.settings.security_disabled || is_public(&path) {
        req.extensions_mut().insert(AuthContext {
            client: None,
            db_token,
        });
        req.extensions_mut()
            .insert(AuditContext::anonymous(client_ip));
        return next.run(req).await;
    }

    let tenant = req
        .extensions()
        .get::<TenantContext>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let bearer = header_str(req.headers(), "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .and_then(split_credentials);

    let Some((username, secret)) = bearer else {
        return ApiError(GateError::Authentication(
            "missing or malformed Authorization header".into(),
        ))
        .into_response();
    };

    let client = match state.keys.validate(&username, &secret, &tenant) {
        Ok(client) => client,
        Err(err) => return ApiError(err).into_response(),
    };

    if requires_admin(&path) && !client.is_admin() {
        tracing::warn!(
            client = %sanitize_for_log(&username),
            path = %path,
            "admin action denied"
        );
        return ApiError(GateError::Authorization(
            "this operation requires admin access".into(),
        ))
        .into_response();
    }

    req.extensions_mut().insert(AuditContext {
        username: client.username.clone(),
        fingerprint: Some(client.fingerprint.clone()),
        client_ip,
    });
    req.extensions_mut().insert(AuthContext {
        client: Some(client),
        db_token,
    });
    next.run(req).await
}

/// IP bucket first; when the tenant is resolvable, the tenant bucket with
/// its tier quota.
async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = audit::extract_client_ip(req.headers());
    if let Err(denial) = state.limiters.ip.check(&ip) {
        tracing::warn!(ip = %sanitize_for_log(&ip), "IP rate limit exceeded");
        metrics::record_rate_limit_denial("ip");
        return rate_limit_response(&denial);
    }

    let tenant = req
        .extensions()
        .get::<TenantContext>()
        .map(|t| t.0.clone())
        .unwrap_or_default();
    if !tenant.is_empty() {
        let tier = state.limiters.tenant.resolve_tier(&tenant, &state.config);
        if let Err(denial) = state.limiters.tenant.check(&tenant, &tier) {
            tracing::warn!(
                tenant = %sanitize_for_log(&tenant),
                tier = %tier,
                "tenant rate limit exceeded"
            );
            metrics::record_rate_limit_denial("tenant");
            return rate_limit_response(&denial);
        }
    }
    next.run(req).await
}

/// Emit one structured line per request on response.
async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let tenant = req
        .extensions()
        .get::<TenantContext>()
        .map(|t| t.0.clone())
        .unwrap_or_default();
    let start = Instant::now();
    let response = next.run(req).await;
    tracing::info!(
        method = %method,
        path = %path,
        tenant = %sanitize_for_log(&tenant),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

async fn metrics_middleware(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    metrics::record_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);
    async move {
        let mut response = next.run(req).await;
        response.headers_mut().insert(
            axum::http::HeaderName::from_static("x-request-id"),
            HeaderValue::from_str(&request_id)
                .expect("UUID v4 is always valid ASCII for header values"),
        );
        response
    }
    .instrument(span)
    .await
}

async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        axum::http::HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        axum::http::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        axum::http::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    response
}

/// Builds the Axum router with all routes and middleware layers.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/vector_store/set_vector_store",
            post(handlers::set_vector_store),
        )
        .route(
            "/api/v1/vector_store/generate_schema",
            post(handlers::generate_schema),
        )
        .route("/api/v1/vector_store/insert", post(handlers::insert))
        .route("/api/v1/vector_store/search", post(handlers::search))
        .route("/api/v1/vector_store/flush", post(handlers::flush))
        .route(
            "/api/v1/vector_store_users/set_user",
            post(handlers::set_user),
        )
        .route(
            "/api/v1/vector_store_users/reset_password",
            post(handlers::reset_password),
        )
        .route("/api/v1/config/add", post(handlers::config_add))
        .route("/api/v1/config/get", get(handlers::config_get))
        .route("/api/v1/config/update", put(handlers::config_update))
        .route("/api/v1/config/delete", delete(handlers::config_delete))
        .route("/api/v1/config/list", get(handlers::config_list))
        .route("/api/v1/admin/fingerprints", get(handlers::admin_fingerprints))
        .route("/api/v1/metrics", get(handlers::metrics_endpoint));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/health/connections", get(health::connections))
        .merge(api)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn(context_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trusted_host_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config::MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}
