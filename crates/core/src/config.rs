//! Global configuration constants for vectorgate.
//!
//! Tuning parameters, input validation limits, and server defaults live here.
//! These are compile-time constants; runtime configuration is handled via CLI
//! arguments and environment variables in the server binary.

/// BM25 Okapi term frequency saturation parameter.
///
/// Controls how quickly term frequency saturates. Standard value is 1.2.
pub const BM25_K1: f32 = 1.2;

/// BM25 Okapi document length normalization parameter.
///
/// 0.0 = no normalization, 1.0 = full normalization. Standard value is 0.75.
pub const BM25_B: f32 = 0.75;

/// Reciprocal Rank Fusion (RRF) constant `k`.
///
/// Used in the formula `1 / (k + rank)` to combine ranked lists.
/// Standard value is 60.0 (from the original RRF paper).
pub const RRF_K: f32 = 60.0;

/// Maximum allowed dense vector dimension.
pub const MAX_DIMENSION: usize = 4096;

/// Default dense vector dimension when a request does not supply one.
pub const DEFAULT_DIMENSION: usize = 768;

/// Maximum number of results per search request.
pub const MAX_SEARCH_LIMIT: usize = 1_000;

/// Default number of results per search request.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Maximum length of a tenant code in characters.
pub const MAX_TENANT_CODE_LEN: usize = 256;

/// Maximum length of a primary key value in characters.
pub const MAX_KEY_LEN: usize = 512;

/// Maximum length of a chunk in bytes.
pub const MAX_CHUNK_LEN: usize = 60_535;

/// Maximum serialized metadata length stored per row, in characters.
pub const DEFAULT_METADATA_LENGTH: usize = 4_096;

/// Maximum number of vectors per insert request.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// Batch size at or above which an insert triggers an automatic flush.
pub const AUTO_FLUSH_MIN_BATCH: usize = 100;

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 19680;

/// Default vector database port.
pub const DEFAULT_VECTORDB_PORT: u16 = 19530;

/// Default ANN metric type.
pub const DEFAULT_METRIC_TYPE: &str = "COSINE";

/// Default dense index type.
pub const DEFAULT_INDEX_TYPE: &str = "IVF_FLAT";

/// Default number of inverted lists for IVF indexes.
pub const DEFAULT_NLIST: usize = 256;

/// Default BM25 drop ratio applied when building the sparse index.
pub const DEFAULT_DROP_RATIO_BUILD: f32 = 0.2;

/// Per-IP rate limit: requests per window.
pub const IP_RATE_LIMIT: u32 = 100;

/// Per-tenant rate limit for the default tier: requests per window.
pub const TENANT_RATE_LIMIT_DEFAULT: u32 = 200;

/// Per-tenant rate limit for the premium tier: requests per window.
pub const TENANT_RATE_LIMIT_PREMIUM: u32 = 1_000;

/// Rate limit window length in seconds (shared by both limiters).
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Tenant buckets idle longer than this are evicted, in seconds.
pub const TENANT_BUCKET_MAX_INACTIVE_SECS: u64 = 3_600;

/// How long a resolved tenant tier stays cached, in seconds.
pub const TIER_CACHE_TTL_SECS: u64 = 60;

/// Maximum number of pooled vector-DB clients.
pub const POOL_MAX_ENTRIES: usize = 64;

/// Pooled clients idle longer than this are closed, in seconds.
pub const POOL_MAX_IDLE_SECS: u64 = 300;

/// Interval between background sweeps (pool eviction + bucket cleanup), in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Default deadline for data-plane DB calls, in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Deadline for admin/provisioning DB calls, in seconds.
pub const ADMIN_TIMEOUT_SECS: u64 = 120;

/// Maximum HTTP request body size in bytes (10 MB).
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Graceful shutdown drain deadline in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Minimum length for a generated tenant user password.
pub const PASSWORD_MIN_LEN: usize = 12;

/// Collection name prefix; the full name is `{prefix}_for_{tenant}_{model}`.
pub const COLLECTION_SCHEMA_NAME: &str = "vector_store_schema";

/// Primary key field name in every tenant collection.
pub const PRIMARY_FIELD_NAME: &str = "flouds_vector_id";

/// Dense vector field name in every tenant collection.
pub const VECTOR_FIELD_NAME: &str = "flouds_vector";

/// Sparse (BM25) vector field name in every tenant collection.
pub const SPARSE_FIELD_NAME: &str = "sparse";

/// Suffix appended to the tenant code to form the logical database name.
pub const DB_NAME_SUFFIX: &str = "_vectorstore";

/// Privileges granted on a tenant collection to the tenant role.
pub const TENANT_COLLECTION_PRIVILEGES: [&str; 5] =
    ["Search", "Query", "Insert", "Upsert", "Delete"];

/// Sentinel returned by the config API instead of ciphertext.
pub const ENCRYPTED_SENTINEL: &str = "<encrypted>";

/// Returns the logical database name for a tenant.
pub fn db_name_for_tenant(tenant: &str) -> String {
    format!("{}{}", tenant.to_lowercase(), DB_NAME_SUFFIX)
}

/// Returns the role name for a tenant.
pub fn role_name_for_tenant(tenant: &str) -> String {
    format!("flouds_{}_role", tenant.to_lowercase())
}

/// Returns the user name for a tenant.
pub fn user_name_for_tenant(tenant: &str) -> String {
    format!("{}_user", tenant.to_lowercase())
}

/// Returns the collection name for a tenant + model pair.
pub fn collection_name(tenant: &str, model: &str) -> String {
    format!(
        "{}_for_{}_{}",
        COLLECTION_SCHEMA_NAME,
        tenant.to_lowercase(),
        model.to_lowercase()
    )
}
