//! Contract of the external Milvus-compatible vector engine.
//!
//! The gateway never embeds the engine; everything flows through this trait.
//! A connected backend is bound to `(uri, user, database)` — the pool hands
//! out one backend per key. [`super::client::MilvusRestClient`] implements it
//! over the REST API; [`super::memory::MemoryBackend`] is an embedded
//! stand-in for development and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vectorgate_core::GateResult;

/// One row of a tenant collection, as upserted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRow {
    pub id: String,
    pub vector: Vec<f32>,
    pub sparse: HashMap<u32, f32>,
    pub chunk: String,
    pub model: String,
    pub meta: serde_json::Value,
}

/// A search result returned by the engine.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub chunk: String,
    pub meta: serde_json::Value,
}

/// Collection layout request; the field set is fixed by the gateway.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metadata_length: usize,
}

/// Index creation request on one field of a collection.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub field: String,
    pub index_name: String,
    pub index_type: String,
    pub metric_type: String,
    /// `nlist` for IVF dense indexes, unused for sparse.
    pub nlist: Option<usize>,
    /// BM25 build-time pruning ratio for sparse indexes.
    pub drop_ratio_build: Option<f32>,
}

/// Dense ANN query against `flouds_vector`.
#[derive(Debug, Clone)]
pub struct DenseQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub metric_type: String,
}

/// Sparse BM25 query against `sparse`.
#[derive(Debug, Clone)]
pub struct SparseQuery {
    pub weights: HashMap<u32, f32>,
    pub limit: usize,
}

/// Operations the gateway requires from the vector engine.
///
/// Implementations are bound to a database at construction; collection
/// operations act within that database. Administrative operations
/// (databases, users, roles, grants) require a client whose credentials
/// carry the corresponding privileges — tenant isolation is enforced by the
/// engine, not the gateway.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Cheap reachability probe used by health checks and pool validation.
    async fn ping(&self) -> GateResult<()>;

    async fn list_databases(&self) -> GateResult<Vec<String>>;
    async fn create_database(&self, name: &str) -> GateResult<()>;
    async fn drop_database(&self, name: &str) -> GateResult<()>;

    async fn list_roles(&self) -> GateResult<Vec<String>>;
    async fn create_role(&self, name: &str) -> GateResult<()>;
    async fn drop_role(&self, name: &str) -> GateResult<()>;

    async fn list_users(&self) -> GateResult<Vec<String>>;
    async fn create_user(&self, name: &str, password: &str) -> GateResult<()>;
    async fn drop_user(&self, name: &str) -> GateResult<()>;
    async fn update_password(&self, name: &str, old: &str, new: &str) -> GateResult<()>;

    async fn grant_role(&self, user: &str, role: &str) -> GateResult<()>;
    async fn revoke_role(&self, user: &str, role: &str) -> GateResult<()>;
    async fn grant_privilege(
        &self,
        role: &str,
        object_name: &str,
        privilege: &str,
    ) -> GateResult<()>;
    async fn revoke_privilege(
        &self,
        role: &str,
        object_name: &str,
        privilege: &str,
    ) -> GateResult<()>;

    async fn has_collection(&self, name: &str) -> GateResult<bool>;
    /// Returns the dense dimension of an existing collection.
    async fn collection_dimension(&self, name: &str) -> GateResult<Option<usize>>;
    async fn create_collection(&self, spec: &CollectionSpec) -> GateResult<()>;
    async fn drop_collection(&self, name: &str) -> GateResult<()>;
    async fn list_indexes(&self, collection: &str) -> GateResult<Vec<String>>;
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> GateResult<()>;

    async fn upsert(&self, collection: &str, rows: &[VectorRow]) -> GateResult<()>;
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> GateResult<()>;
    async fn flush(&self, collection: &str) -> GateResult<()>;

    async fn search_dense(&self, collection: &str, query: &DenseQuery)
        -> GateResult<Vec<SearchHit>>;
    async fn search_sparse(
        &self,
        collection: &str,
        query: &SparseQuery,
    ) -> GateResult<Vec<SearchHit>>;
}

/// Constructs connected backends for the pool.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Connect and verify credentials against `(uri, user, database)`.
    async fn connect(
        &self,
        uri: &str,
        user: &str,
        secret: &str,
        database: &str,
    ) -> GateResult<std::sync::Arc<dyn VectorBackend>>;
}
