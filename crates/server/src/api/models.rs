//! Request and response data transfer objects for the HTTP surface.
//!
//! All types derive `Serialize` and/or `Deserialize` for JSON marshalling
//! via Axum. `tenant_code` appears on every request body but the
//! `X-Tenant-Code` header takes precedence during tenant resolution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vectorgate_core::config;

/// Canonical success envelope returned by every service method.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    pub tenant_code: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    pub time_taken_ms: u64,
}

/// Body for `POST /api/v1/vector_store/set_vector_store` and
/// `POST /api/v1/vector_store_users/{set_user, reset_password}`.
#[derive(Debug, Deserialize)]
pub struct TenantOnlyRequest {
    #[serde(default)]
    pub tenant_code: Option<String>,
}

/// Body for `POST /api/v1/vector_store/generate_schema`.
#[derive(Debug, Deserialize)]
pub struct GenerateSchemaRequest {
    #[serde(default)]
    pub tenant_code: Option<String>,
    pub model_name: String,
    pub dimension: usize,
    pub metric_type: Option<String>,
    pub index_type: Option<String>,
    pub nlist: Option<usize>,
    pub metadata_length: Option<usize>,
    pub drop_ratio_build: Option<f32>,
}

/// One vector in an insert batch.
#[derive(Debug, Deserialize)]
pub struct EmbeddedVectorDto {
    pub key: String,
    pub chunk: String,
    #[serde(default)]
    pub metadata: Value,
    pub vector: Vec<f32>,
}

/// Body for `POST /api/v1/vector_store/insert`.
#[derive(Debug, Deserialize)]
pub struct InsertRequest {
    #[serde(default)]
    pub tenant_code: Option<String>,
    pub model_name: String,
    pub data: Vec<EmbeddedVectorDto>,
    pub auto_flush: Option<bool>,
}

/// Body for `POST /api/v1/vector_store/search`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub tenant_code: Option<String>,
    pub model: String,
    pub vector: Vec<f32>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub metric_type: Option<String>,
    #[serde(default)]
    pub hybrid_search: bool,
    pub text_filter: Option<String>,
    #[serde(default = "default_minimum_words_match")]
    pub minimum_words_match: usize,
    #[serde(default)]
    pub include_stop_words: bool,
}

fn default_limit() -> usize {
    config::DEFAULT_SEARCH_LIMIT
}

fn default_minimum_words_match() -> usize {
    1
}

/// Body for `POST /api/v1/vector_store/flush`.
#[derive(Debug, Deserialize)]
pub struct FlushRequest {
    #[serde(default)]
    pub tenant_code: Option<String>,
    pub model_name: String,
}

/// Body for `POST /api/v1/config/add` and `PUT /api/v1/config/update`.
#[derive(Debug, Deserialize)]
pub struct ConfigWriteRequest {
    #[serde(default)]
    pub tenant_code: Option<String>,
    pub key: String,
    pub value: String,
    pub encrypted: Option<bool>,
}

/// Query string for `GET /api/v1/config/get` and `DELETE /api/v1/config/delete`.
#[derive(Debug, Deserialize)]
pub struct ConfigKeyQuery {
    pub key: String,
    #[serde(default)]
    pub tenant_code: Option<String>,
}

/// Query string for `GET /api/v1/config/list`.
#[derive(Debug, Deserialize)]
pub struct ConfigListQuery {
    #[serde(default)]
    pub tenant_code: Option<String>,
}

/// Results block for `POST /api/v1/vector_store/search`.
#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub results: Vec<crate::milvus::vector_store::SearchResultItem>,
    pub total_count: usize,
    pub search_time_ms: u64,
}

/// Results block for `POST /api/v1/vector_store_users/set_user`.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub password: String,
    pub role: String,
}

/// Results block for `POST /api/v1/vector_store_users/reset_password`.
#[derive(Debug, Serialize)]
pub struct NewPassword {
    pub new_password: String,
}
