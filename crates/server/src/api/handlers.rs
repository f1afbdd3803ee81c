//! HTTP request handlers, shared application state and the service-method
//! wrapper.
//!
//! Every data/control-plane handler runs through [`service_method`], which
//! records timing, classifies errors against the taxonomy and shapes the
//! canonical response envelope. Handlers stay thin: validate the DTO,
//! resolve tenant + DB credentials from request context, delegate to the
//! core.

use crate::api::audit::{audit_event, AuditContext};
use crate::api::errors::ApiError;
use crate::api::metrics;
use crate::api::models::*;
use crate::api::rate_limit::RateLimiters;
use crate::config_store::ConfigStore;
use crate::key_manager::KeyManager;
use crate::milvus::provisioning::ProvisioningCore;
use crate::milvus::vector_store::{
    DbCredentials, EmbeddedVector, SchemaRequest, SearchParams, VectorStoreCore,
};
use crate::pool::ConnectionPool;
use crate::settings::Settings;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use vectorgate_core::config;
use vectorgate_core::{GateError, GateResult};

/// Shared application state passed to every handler via Axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub config: Arc<ConfigStore>,
    pub keys: Arc<KeyManager>,
    pub pool: Arc<ConnectionPool>,
    pub vectors: Arc<VectorStoreCore>,
    pub provisioning: Arc<ProvisioningCore>,
    pub limiters: Arc<RateLimiters>,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
    pub startup_errors: Arc<Vec<String>>,
}

/// Tenant resolved for this request (header wins over body), empty = global.
#[derive(Debug, Clone)]
pub struct TenantContext(pub String);

/// Authenticated principal and per-request DB credentials.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub client: Option<crate::key_manager::Client>,
    pub db_token: Option<DbCredentials>,
}

/// Uniform adapter around every service operation: timing, error
/// classification, metrics and the canonical envelope.
pub async fn service_method<T, F>(
    operation: &'static str,
    tenant: &str,
    fut: F,
) -> Result<Json<Envelope>, ApiError>
where
    T: Serialize,
    F: Future<Output = GateResult<T>>,
{
    let start = Instant::now();
    match fut.await {
        Ok(value) => {
            let elapsed = start.elapsed();
            metrics::record_operation(operation, "success", elapsed);
            Ok(Json(Envelope {
                success: true,
                message: format!("{operation} completed successfully"),
                tenant_code: tenant.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                results: serde_json::to_value(value).ok(),
                time_taken_ms: elapsed.as_millis() as u64,
            }))
        }
        Err(err) => {
            let elapsed = start.elapsed();
            metrics::record_operation(operation, err.kind(), elapsed);
            Err(ApiError(err))
        }
    }
}

fn resolve_tenant(ctx: &TenantContext, body_tenant: Option<&str>) -> String {
    if !ctx.0.is_empty() {
        return ctx.0.clone();
    }
    body_tenant.unwrap_or_default().to_string()
}

fn require_tenant(tenant: &str) -> GateResult<()> {
    if tenant.is_empty() {
        return Err(GateError::Tenant(
            "tenant code required: set the X-Tenant-Code header or the tenant_code field".into(),
        ));
    }
    Ok(())
}

fn require_db_token(auth: &AuthContext) -> GateResult<DbCredentials> {
    auth.db_token.clone().ok_or_else(|| {
        GateError::Authentication("missing Flouds-VectorDB-Token header".into())
    })
}

/// Model names are lowercased and restricted to `[a-z0-9_.-]{1,100}`.
fn normalize_model(name: &str) -> GateResult<String> {
    let model = name.trim().to_lowercase();
    let valid = !model.is_empty()
        && model.len() <= 100
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(GateError::Validation(
            "model name must be 1-100 characters: alphanumeric, '_', '.', '-'".into(),
        ));
    }
    Ok(model)
}

/// `POST /api/v1/vector_store/set_vector_store`
pub async fn set_vector_store(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthContext>,
    audit_ctx: Option<Extension<AuditContext>>,
    Json(req): Json<TenantOnlyRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    let response = service_method("set_vector_store", &tenant, async {
        require_tenant(&tenant)?;
        let creds = require_db_token(&auth)?;
        state.provisioning.set_vector_store(&tenant, &creds).await
    })
    .await;
    if let Some(Extension(ref ctx)) = audit_ctx {
        let outcome = if response.is_ok() { "success" } else { "failure" };
        audit_event(ctx, "set_vector_store", &tenant, outcome);
    }
    response
}

/// `POST /api/v1/vector_store/generate_schema`
pub async fn generate_schema(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthContext>,
    audit_ctx: Option<Extension<AuditContext>>,
    Json(req): Json<GenerateSchemaRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    let response = service_method("generate_schema", &tenant, async {
        require_tenant(&tenant)?;
        let creds = require_db_token(&auth)?;
        let schema = SchemaRequest {
            model: normalize_model(&req.model_name)?,
            dimension: req.dimension,
            metric_type: req
                .metric_type
                .clone()
                .unwrap_or_else(|| state.settings.default_metric.clone()),
            index_type: req
                .index_type
                .clone()
                .unwrap_or_else(|| state.settings.default_index.clone()),
            nlist: req.nlist.unwrap_or(state.settings.nlist),
            metadata_length: req.metadata_length.unwrap_or(config::DEFAULT_METADATA_LENGTH),
            drop_ratio_build: req.drop_ratio_build.unwrap_or(config::DEFAULT_DROP_RATIO_BUILD),
        };
        state.vectors.generate_schema(&tenant, &creds, &schema).await
    })
    .await;
    if let Some(Extension(ref ctx)) = audit_ctx {
        let outcome = if response.is_ok() { "success" } else { "failure" };
        audit_event(ctx, "generate_schema", &tenant, outcome);
    }
    response
}

/// `POST /api/v1/vector_store/insert`
pub async fn insert(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<InsertRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    service_method("insert", &tenant, async {
        require_tenant(&tenant)?;
        let creds = require_db_token(&auth)?;
        let model = normalize_model(&req.model_name)?;
        let batch: Vec<EmbeddedVector> = req
            .data
            .into_iter()
            .map(|item| EmbeddedVector {
                key: item.key,
                chunk: item.chunk,
                metadata: if item.metadata.is_null() {
                    Value::Object(Default::default())
                } else {
                    item.metadata
                },
                vector: item.vector,
            })
            .collect();
        state
            .vectors
            .insert(&tenant, &creds, &model, batch, req.auto_flush)
            .await
    })
    .await
}

/// `POST /api/v1/vector_store/search`
pub async fn search(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    service_method("search", &tenant, async {
        require_tenant(&tenant)?;
        let creds = require_db_token(&auth)?;
        let params = SearchParams {
            model: normalize_model(&req.model)?,
            vector: req.vector.clone(),
            limit: req.limit,
            score_threshold: req.score_threshold,
            metric_type: req
                .metric_type
                .clone()
                .unwrap_or_else(|| state.settings.default_metric.clone()),
            hybrid: req.hybrid_search,
            text_filter: req.text_filter.clone(),
            minimum_words_match: req.minimum_words_match,
            include_stop_words: req.include_stop_words,
        };
        let start = Instant::now();
        let results = state.vectors.search(&tenant, &creds, &params).await?;
        Ok(SearchResults {
            total_count: results.len(),
            search_time_ms: start.elapsed().as_millis() as u64,
            results,
        })
    })
    .await
}

/// `POST /api/v1/vector_store/flush`
pub async fn flush(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<FlushRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    service_method("flush", &tenant, async {
        require_tenant(&tenant)?;
        let creds = require_db_token(&auth)?;
        let model = normalize_model(&req.model_name)?;
        state.vectors.flush(&tenant, &creds, &model).await?;
        Ok(serde_json::json!({ "flushed": true }))
    })
    .await
}

/// `POST /api/v1/vector_store_users/set_user`
pub async fn set_user(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthContext>,
    audit_ctx: Option<Extension<AuditContext>>,
    Json(req): Json<TenantOnlyRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    let response = service_method("set_user", &tenant, async {
        require_tenant(&tenant)?;
        let creds = require_db_token(&auth)?;
        let summary = state.provisioning.set_vector_store(&tenant, &creds).await?;
        let password = match summary.password {
            Some(password) => password,
            // Existing user: re-issue the stored secret.
            None => state.keys.reissue_secret(&summary.username)?,
        };
        Ok(UserSummary {
            username: summary.username,
            password,
            role: summary.role,
        })
    })
    .await;
    if let Some(Extension(ref ctx)) = audit_ctx {
        let outcome = if response.is_ok() { "success" } else { "failure" };
        audit_event(ctx, "set_user", &tenant, outcome);
    }
    response
}

/// `POST /api/v1/vector_store_users/reset_password`
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<TenantOnlyRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    service_method("reset_password", &tenant, async {
        require_tenant(&tenant)?;
        let creds = require_db_token(&auth)?;
        let summary = state.provisioning.reset_password(&tenant, &creds).await?;
        Ok(NewPassword {
            new_password: summary.new_password,
        })
    })
    .await
}

/// `POST /api/v1/config/add`
pub async fn config_add(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Json(req): Json<ConfigWriteRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    service_method("config_add", &tenant, async {
        state
            .config
            .add(&req.key, &tenant, &req.value, req.encrypted.unwrap_or(false))?;
        Ok(serde_json::json!({ "ok": true }))
    })
    .await
}

/// `GET /api/v1/config/get`
pub async fn config_get(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Query(query): Query<ConfigKeyQuery>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, query.tenant_code.as_deref());
    service_method("config_get", &tenant, async {
        state.config.get(&query.key, &tenant)
    })
    .await
}

/// `PUT /api/v1/config/update`
pub async fn config_update(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Json(req): Json<ConfigWriteRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, req.tenant_code.as_deref());
    service_method("config_update", &tenant, async {
        state
            .config
            .update(&req.key, &tenant, &req.value, req.encrypted)?;
        Ok(serde_json::json!({ "ok": true }))
    })
    .await
}

/// `DELETE /api/v1/config/delete`
pub async fn config_delete(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Query(query): Query<ConfigKeyQuery>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, query.tenant_code.as_deref());
    service_method("config_delete", &tenant, async {
        state.config.delete(&query.key, &tenant)?;
        Ok(serde_json::json!({ "ok": true }))
    })
    .await
}

/// `GET /api/v1/config/list`
pub async fn config_list(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
    Query(query): Query<ConfigListQuery>,
) -> Result<Json<Envelope>, ApiError> {
    let tenant = resolve_tenant(&tenant_ctx, query.tenant_code.as_deref());
    service_method("config_list", &tenant, async {
        state.config.list(&tenant)
    })
    .await
}

/// `GET /api/v1/admin/fingerprints`
pub async fn admin_fingerprints(
    State(state): State<AppState>,
    Extension(tenant_ctx): Extension<TenantContext>,
) -> Result<Json<Envelope>, ApiError> {
    service_method("fingerprints", &tenant_ctx.0, async {
        state.keys.list_fingerprints()
    })
    .await
}

/// `GET /api/v1/metrics`
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}
