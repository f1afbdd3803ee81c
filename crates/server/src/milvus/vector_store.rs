//! Tenant vector store operations: schema generation, insert, search, flush.
//!
//! Every operation flows through a pooled client bound to the tenant's
//! database with the per-request DB credentials. Inserts compose upsert and
//! flush through the transaction manager; searches run dense-only or hybrid
//! (dense + BM25 sparse fused with RRF).

use crate::milvus::backend::{CollectionSpec, DenseQuery, IndexSpec, SearchHit, SparseQuery, VectorRow};
use crate::pool::{ConnectionPool, PooledClient};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use vectorgate_core::bm25::Bm25Encoder;
use vectorgate_core::config;
use vectorgate_core::sanitize::sanitize_for_log;
use vectorgate_core::search::{rrf_fuse, sparse_query_tokens};
use vectorgate_core::txn::{noop_rollback, op, Transaction};
use vectorgate_core::{GateError, GateResult};

/// Per-request DB credentials parsed from the `Flouds-VectorDB-Token` header.
#[derive(Debug, Clone)]
pub struct DbCredentials {
    pub user: String,
    pub secret: String,
}

/// One vector to ingest.
#[derive(Debug, Clone)]
pub struct EmbeddedVector {
    pub key: String,
    pub chunk: String,
    pub metadata: Value,
    pub vector: Vec<f32>,
}

/// Schema generation parameters after request validation.
#[derive(Debug, Clone)]
pub struct SchemaRequest {
    pub model: String,
    pub dimension: usize,
    pub metric_type: String,
    pub index_type: String,
    pub nlist: usize,
    pub metadata_length: usize,
    pub drop_ratio_build: f32,
}

#[derive(Debug, Serialize)]
pub struct SchemaSummary {
    pub collection_name: String,
    pub created: bool,
    pub index_created: bool,
    pub permissions_granted: bool,
}

#[derive(Debug, Serialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub flushed: bool,
}

/// Search parameters after request validation.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub model: String,
    pub vector: Vec<f32>,
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub metric_type: String,
    pub hybrid: bool,
    pub text_filter: Option<String>,
    pub minimum_words_match: usize,
    pub include_stop_words: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub score: f32,
    pub chunk: String,
    pub meta: Value,
}

pub struct VectorStoreCore {
    pool: Arc<ConnectionPool>,
    uri: String,
    auto_flush_min_batch: usize,
    /// BM25 corpus statistics per collection, fitted incrementally on insert.
    encoders: Mutex<HashMap<String, Bm25Encoder>>,
    /// Per-`(tenant, model)` generation locks so concurrent schema requests
    /// with differing dimensions fail fast instead of racing the engine.
    schema_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VectorStoreCore {
    pub fn new(pool: Arc<ConnectionPool>, uri: String, auto_flush_min_batch: usize) -> Self {
        Self {
            pool,
            uri,
            auto_flush_min_batch,
            encoders: Mutex::new(HashMap::new()),
            schema_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn tenant_client(
        &self,
        tenant: &str,
        creds: &DbCredentials,
    ) -> GateResult<Arc<PooledClient>> {
        let database = config::db_name_for_tenant(tenant);
        let client = self
            .pool
            .acquire(&self.uri, &creds.user, &creds.secret, &database)
            .await?;
        Ok(Arc::new(client))
    }

    async fn existing_dimension(
        &self,
        client: &PooledClient,
        collection: &str,
    ) -> GateResult<usize> {
        client
            .collection_dimension(collection)
            .await?
            .ok_or_else(|| {
                GateError::Operation(format!(
                    "collection '{collection}' does not exist; generate the schema first"
                ))
            })
    }

    /// Idempotent schema generation for `(tenant, model)`.
    pub async fn generate_schema(
        &self,
        tenant: &str,
        creds: &DbCredentials,
        request: &SchemaRequest,
    ) -> GateResult<SchemaSummary> {
        validate_dimension(request.dimension)?;
        let collection = config::collection_name(tenant, &request.model);
        let role = config::role_name_for_tenant(tenant);

        let lock = {
            let mut locks = self.schema_locks.lock();
            locks.entry(collection.clone()).or_default().clone()
        };
        let _guard = lock.lock().await;

        let client = self.tenant_client(tenant, creds).await?;

        let mut summary = SchemaSummary {
            collection_name: collection.clone(),
            created: false,
            index_created: false,
            permissions_granted: false,
        };

        if let Some(existing) = client.collection_dimension(&collection).await? {
            if existing != request.dimension {
                return Err(GateError::SchemaConflict(format!(
                    "collection '{collection}' exists with dimension {existing}, requested {}",
                    request.dimension
                )));
            }
            tracing::info!(
                collection = %sanitize_for_log(&collection),
                "collection already exists"
            );
        } else {
            client
                .create_collection(&CollectionSpec {
                    name: collection.clone(),
                    dimension: request.dimension,
                    metadata_length: request.metadata_length,
                })
                .await?;
            summary.created = true;
            tracing::info!(
                collection = %sanitize_for_log(&collection),
                dimension = request.dimension,
                "collection created"
            );
        }

        let existing_indexes = client.list_indexes(&collection).await?;
        let dense_index = format!("{}_index", config::VECTOR_FIELD_NAME);
        if !existing_indexes.contains(&dense_index) {
            client
                .create_index(
                    &collection,
                    &IndexSpec {
                        field: config::VECTOR_FIELD_NAME.to_string(),
                        index_name: dense_index,
                        index_type: request.index_type.clone(),
                        metric_type: request.metric_type.clone(),
                        nlist: Some(request.nlist),
                        drop_ratio_build: None,
                    },
                )
                .await?;
            summary.index_created = true;
        }
        let sparse_index = format!("{}_index", config::SPARSE_FIELD_NAME);
        if !existing_indexes.contains(&sparse_index) {
            client
                .create_index(
                    &collection,
                    &IndexSpec {
                        field: config::SPARSE_FIELD_NAME.to_string(),
                        index_name: sparse_index,
                        index_type: "SPARSE_INVERTED_INDEX".to_string(),
                        metric_type: "IP".to_string(),
                        nlist: None,
                        drop_ratio_build: Some(request.drop_ratio_build),
                    },
                )
                .await?;
            summary.index_created = true;
        }

        for privilege in config::TENANT_COLLECTION_PRIVILEGES {
            client.grant_privilege(&role, &collection, privilege).await?;
        }
        summary.permissions_granted = true;

        Ok(summary)
    }

    /// Upsert a batch. Duplicate keys within the batch collapse to the last
    /// occurrence. Upsert and flush are composed transactionally: the upsert
    /// rollback deletes the written keys, the flush is irreversible.
    pub async fn insert(
        &self,
        tenant: &str,
        creds: &DbCredentials,
        model: &str,
        batch: Vec<EmbeddedVector>,
        auto_flush: Option<bool>,
    ) -> GateResult<InsertSummary> {
        if batch.is_empty() {
            return Err(GateError::Validation("data must not be empty".into()));
        }
        if batch.len() > config::MAX_BATCH_SIZE {
            return Err(GateError::Validation(format!(
                "batch exceeds maximum of {} vectors",
                config::MAX_BATCH_SIZE
            )));
        }

        let collection = config::collection_name(tenant, model);
        let client = self.tenant_client(tenant, creds).await?;
        let dimension = self.existing_dimension(&client, &collection).await?;

        // Last write wins for duplicate keys within the batch.
        let mut dedup: Vec<EmbeddedVector> = Vec::with_capacity(batch.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(batch.len());
        for item in batch {
            validate_embedded(&item, dimension)?;
            match positions.get(&item.key) {
                Some(&i) => dedup[i] = item,
                None => {
                    positions.insert(item.key.clone(), dedup.len());
                    dedup.push(item);
                }
            }
        }

        let rows: Vec<VectorRow> = {
            let mut encoders = self.encoders.lock();
            let encoder = encoders.entry(collection.clone()).or_default();
            let chunks: Vec<&str> = dedup.iter().map(|v| v.chunk.as_str()).collect();
            encoder.fit(&chunks);
            dedup
                .iter()
                .map(|item| VectorRow {
                    id: item.key.clone(),
                    vector: item.vector.clone(),
                    sparse: encoder.encode_document(&item.chunk),
                    chunk: item.chunk.clone(),
                    model: model.to_string(),
                    meta: item.metadata.clone(),
                })
                .collect()
        };

        let inserted = rows.len();
        let should_flush = auto_flush.unwrap_or(inserted >= self.auto_flush_min_batch);
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        let mut txn = Transaction::begin(format!("insert:{collection}"));
        {
            let client = client.clone();
            let collection = collection.clone();
            let rollback_client = client.clone();
            let rollback_collection = collection.clone();
            txn.add(
                "upsert",
                move || {
                    op(async move {
                        client.upsert(&collection, &rows).await?;
                        Ok(json!({ "count": rows.len() }))
                    })
                },
                move |_| {
                    op(async move {
                        rollback_client
                            .delete_by_ids(&rollback_collection, &ids)
                            .await
                    })
                },
            );
        }
        if should_flush {
            let client = client.clone();
            let collection = collection.clone();
            txn.add(
                "flush",
                move || {
                    op(async move {
                        client.flush(&collection).await?;
                        Ok(Value::Null)
                    })
                },
                noop_rollback,
            );
        }
        txn.execute().await?;

        tracing::info!(
            collection = %sanitize_for_log(&collection),
            inserted,
            flushed = should_flush,
            "vectors upserted"
        );
        Ok(InsertSummary {
            inserted,
            flushed: should_flush,
        })
    }

    /// Dense-only or hybrid search. The returned score is the RRF score for
    /// hybrid requests and the raw dense score otherwise; `score_threshold`
    /// applies only to the dense-only path because RRF scores are not
    /// comparable to raw distances.
    pub async fn search(
        &self,
        tenant: &str,
        creds: &DbCredentials,
        params: &SearchParams,
    ) -> GateResult<Vec<SearchResultItem>> {
        if params.limit == 0 || params.limit > config::MAX_SEARCH_LIMIT {
            return Err(GateError::Validation(format!(
                "limit must be between 1 and {}",
                config::MAX_SEARCH_LIMIT
            )));
        }
        if params.vector.is_empty() {
            return Err(GateError::Validation("vector must not be empty".into()));
        }

        let collection = config::collection_name(tenant, &params.model);
        let client = self.tenant_client(tenant, creds).await?;
        let dimension = self.existing_dimension(&client, &collection).await?;
        if params.vector.len() != dimension {
            return Err(GateError::Validation(format!(
                "vector dimension {} does not match collection dimension {dimension}",
                params.vector.len()
            )));
        }

        let sparse_tokens = if params.hybrid {
            params.text_filter.as_deref().and_then(|filter| {
                sparse_query_tokens(
                    filter,
                    params.include_stop_words,
                    params.minimum_words_match,
                )
            })
        } else {
            None
        };

        let dense_hits = client
            .search_dense(
                &collection,
                &DenseQuery {
                    vector: params.vector.clone(),
                    limit: params.limit,
                    metric_type: params.metric_type.clone(),
                },
            )
            .await?;

        let Some(tokens) = sparse_tokens else {
            // Dense-only path (also the hybrid fallback).
            return Ok(dense_hits
                .into_iter()
                .filter(|hit| params.score_threshold.map_or(true, |t| hit.score >= t))
                .map(result_item)
                .collect());
        };

        let weights = {
            let mut encoders = self.encoders.lock();
            encoders
                .entry(collection.clone())
                .or_default()
                .encode_query(&tokens)
        };
        let sparse_hits = client
            .search_sparse(
                &collection,
                &SparseQuery {
                    weights,
                    limit: params.limit,
                },
            )
            .await?;

        let mut by_id: HashMap<String, SearchHit> = HashMap::new();
        for hit in dense_hits.iter().chain(sparse_hits.iter()) {
            by_id.entry(hit.id.clone()).or_insert_with(|| hit.clone());
        }
        let dense_ranked: Vec<(String, f32)> =
            dense_hits.iter().map(|h| (h.id.clone(), h.score)).collect();
        let sparse_ranked: Vec<(String, f32)> =
            sparse_hits.iter().map(|h| (h.id.clone(), h.score)).collect();

        let fused = rrf_fuse(&dense_ranked, &sparse_ranked, params.limit);
        Ok(fused
            .into_iter()
            .filter_map(|(id, rrf_score)| {
                by_id.remove(&id).map(|hit| SearchResultItem {
                    id,
                    score: rrf_score,
                    chunk: hit.chunk,
                    meta: hit.meta,
                })
            })
            .collect())
    }

    /// Explicit flush of the tenant + model collection.
    pub async fn flush(
        &self,
        tenant: &str,
        creds: &DbCredentials,
        model: &str,
    ) -> GateResult<()> {
        let collection = config::collection_name(tenant, model);
        let client = self.tenant_client(tenant, creds).await?;
        self.existing_dimension(&client, &collection).await?;
        client.flush(&collection).await
    }
}

fn result_item(hit: SearchHit) -> SearchResultItem {
    SearchResultItem {
        id: hit.id,
        score: hit.score,
        chunk: hit.chunk,
        meta: hit.meta,
    }
}

/// Dimension bounds shared by schema generation and startup validation.
pub fn validate_dimension(dimension: usize) -> GateResult<()> {
    if dimension == 0 || dimension > config::MAX_DIMENSION {
        return Err(GateError::Validation(format!(
            "dimension must be between 1 and {}",
            config::MAX_DIMENSION
        )));
    }
    Ok(())
}

fn validate_embedded(item: &EmbeddedVector, dimension: usize) -> GateResult<()> {
    if item.key.is_empty() || item.key.len() > config::MAX_KEY_LEN {
        return Err(GateError::Validation(format!(
            "key must be 1-{} characters",
            config::MAX_KEY_LEN
        )));
    }
    if item.chunk.is_empty() {
        return Err(GateError::Validation("chunk must not be empty".into()));
    }
    if item.chunk.len() > config::MAX_CHUNK_LEN {
        return Err(GateError::Validation(format!(
            "chunk exceeds maximum length of {} bytes",
            config::MAX_CHUNK_LEN
        )));
    }
    if item.vector.len() != dimension {
        return Err(GateError::Validation(format!(
            "vector dimension {} does not match collection dimension {dimension}",
            item.vector.len()
        )));
    }
    if item.vector.iter().any(|v| v.is_nan() || v.is_infinite()) {
        return Err(GateError::Validation("vector contains NaN or Inf".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milvus::memory::{MemoryBackendFactory, MemoryEngine};
    use std::time::Duration;

    const URI: &str = "memory";
    const TENANT: &str = "demo";

    fn creds() -> DbCredentials {
        DbCredentials {
            user: "root".to_string(),
            secret: "rootpw".to_string(),
        }
    }

    async fn core_with_engine() -> (Arc<MemoryEngine>, VectorStoreCore) {
        use crate::milvus::backend::BackendFactory;

        let engine = MemoryEngine::new("root", "rootpw");
        // The tenant database normally comes from provisioning.
        let factory = MemoryBackendFactory::new(engine.clone());
        let admin = factory
            .connect(URI, "root", "rootpw", "default")
            .await
            .unwrap();
        admin
            .create_database(&config::db_name_for_tenant(TENANT))
            .await
            .unwrap();

        let pool = ConnectionPool::new(
            Arc::new(MemoryBackendFactory::new(engine.clone())),
            8,
            Duration::from_secs(300),
            0,
        );
        (
            engine,
            VectorStoreCore::new(pool, URI.to_string(), config::AUTO_FLUSH_MIN_BATCH),
        )
    }

    fn schema_request(dimension: usize) -> SchemaRequest {
        SchemaRequest {
            model: "m1".to_string(),
            dimension,
            metric_type: "COSINE".to_string(),
            index_type: "IVF_FLAT".to_string(),
            nlist: 256,
            metadata_length: 4096,
            drop_ratio_build: 0.2,
        }
    }

    fn vec_item(key: &str, chunk: &str, vector: Vec<f32>) -> EmbeddedVector {
        EmbeddedVector {
            key: key.to_string(),
            chunk: chunk.to_string(),
            metadata: json!({"source": "test"}),
            vector,
        }
    }

    #[tokio::test]
    async fn test_generate_schema_idempotent() {
        let (_, core) = core_with_engine().await;
        let first = core
            .generate_schema(TENANT, &creds(), &schema_request(4))
            .await
            .unwrap();
        assert!(first.created);
        assert!(first.index_created);
        assert!(first.permissions_granted);

        let second = core
            .generate_schema(TENANT, &creds(), &schema_request(4))
            .await
            .unwrap();
        assert!(!second.created);
        assert!(!second.index_created);
        assert_eq!(second.collection_name, first.collection_name);
    }

    #[tokio::test]
    async fn test_generate_schema_dimension_conflict() {
        let (_, core) = core_with_engine().await;
        core.generate_schema(TENANT, &creds(), &schema_request(4))
            .await
            .unwrap();
        let err = core
            .generate_schema(TENANT, &creds(), &schema_request(8))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "schema_conflict");
    }

    #[tokio::test]
    async fn test_generate_schema_dimension_bounds() {
        let (_, core) = core_with_engine().await;
        assert!(core
            .generate_schema(TENANT, &creds(), &schema_request(0))
            .await
            .is_err());
        assert!(core
            .generate_schema(TENANT, &creds(), &schema_request(4097))
            .await
            .is_err());
        assert!(core
            .generate_schema(TENANT, &creds(), &schema_request(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_insert_requires_collection() {
        let (_, core) = core_with_engine().await;
        let err = core
            .insert(
                TENANT,
                &creds(),
                "m1",
                vec![vec_item("a", "hello", vec![1.0])],
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "operation_error");
    }

    #[tokio::test]
    async fn test_insert_validates_dimension() {
        let (_, core) = core_with_engine().await;
        core.generate_schema(TENANT, &creds(), &schema_request(4))
            .await
            .unwrap();
        let err = core
            .insert(
                TENANT,
                &creds(),
                "m1",
                vec![vec_item("a", "hello", vec![1.0, 0.0])],
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_insert_dedups_batch_last_write_wins() {
        let (_, core) = core_with_engine().await;
        core.generate_schema(TENANT, &creds(), &schema_request(2))
            .await
            .unwrap();
        let summary = core
            .insert(
                TENANT,
                &creds(),
                "m1",
                vec![
                    vec_item("a", "first", vec![1.0, 0.0]),
                    vec_item("a", "second", vec![0.0, 1.0]),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);

        let results = core
            .search(
                TENANT,
                &creds(),
                &SearchParams {
                    model: "m1".to_string(),
                    vector: vec![0.0, 1.0],
                    limit: 1,
                    score_threshold: None,
                    metric_type: "COSINE".to_string(),
                    hybrid: false,
                    text_filter: None,
                    minimum_words_match: 1,
                    include_stop_words: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(results[0].chunk, "second");
    }

    #[tokio::test]
    async fn test_small_insert_defers_flush_large_insert_flushes() {
        let (engine, core) = core_with_engine().await;
        core.generate_schema(TENANT, &creds(), &schema_request(1))
            .await
            .unwrap();
        let summary = core
            .insert(
                TENANT,
                &creds(),
                "m1",
                vec![vec_item("a", "hello", vec![1.0])],
                None,
            )
            .await
            .unwrap();
        assert!(!summary.flushed);
        assert_eq!(engine.flushes(), 0);

        let batch: Vec<EmbeddedVector> = (0..config::AUTO_FLUSH_MIN_BATCH)
            .map(|i| vec_item(&format!("k{i}"), "bulk chunk", vec![0.5]))
            .collect();
        let summary = core.insert(TENANT, &creds(), "m1", batch, None).await.unwrap();
        assert!(summary.flushed);
        assert_eq!(engine.flushes(), 1);
    }

    #[tokio::test]
    async fn test_explicit_auto_flush_override() {
        let (engine, core) = core_with_engine().await;
        core.generate_schema(TENANT, &creds(), &schema_request(1))
            .await
            .unwrap();
        let summary = core
            .insert(
                TENANT,
                &creds(),
                "m1",
                vec![vec_item("a", "hello", vec![1.0])],
                Some(true),
            )
            .await
            .unwrap();
        assert!(summary.flushed);
        assert_eq!(engine.flushes(), 1);
    }

    async fn seed_two_docs(core: &VectorStoreCore) {
        core.generate_schema(TENANT, &creds(), &schema_request(4))
            .await
            .unwrap();
        core.insert(
            TENANT,
            &creds(),
            "m1",
            vec![
                vec_item("a", "hello world", vec![1.0, 0.0, 0.0, 0.0]),
                vec_item("b", "goodbye", vec![0.0, 1.0, 0.0, 0.0]),
            ],
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_dense_search_orders_by_score() {
        let (_, core) = core_with_engine().await;
        seed_two_docs(&core).await;
        let results = core
            .search(
                TENANT,
                &creds(),
                &SearchParams {
                    model: "m1".to_string(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                    limit: 2,
                    score_threshold: None,
                    metric_type: "COSINE".to_string(),
                    hybrid: false,
                    text_filter: None,
                    minimum_words_match: 1,
                    include_stop_words: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(results[0].id, "a");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_hybrid_rrf_prefers_sparse_and_dense_agreement() {
        let (_, core) = core_with_engine().await;
        seed_two_docs(&core).await;
        // Dense order [a, b]; sparse matches only b ("goodbye"), so b takes
        // rank 1 in sparse and rank 2 in dense: 1/61 + 1/62 beats a's 1/61.
        let results = core
            .search(
                TENANT,
                &creds(),
                &SearchParams {
                    model: "m1".to_string(),
                    vector: vec![0.9, 0.1, 0.0, 0.0],
                    limit: 2,
                    score_threshold: None,
                    metric_type: "COSINE".to_string(),
                    hybrid: true,
                    text_filter: Some("goodbye".to_string()),
                    minimum_words_match: 1,
                    include_stop_words: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(results[0].id, "b");
        assert_eq!(results[1].id, "a");
        assert!((results[0].score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_hybrid_with_stop_word_filter_falls_back_to_dense() {
        let (_, core) = core_with_engine().await;
        seed_two_docs(&core).await;
        let results = core
            .search(
                TENANT,
                &creds(),
                &SearchParams {
                    model: "m1".to_string(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                    limit: 2,
                    score_threshold: None,
                    metric_type: "COSINE".to_string(),
                    hybrid: true,
                    text_filter: Some("the of and".to_string()),
                    minimum_words_match: 1,
                    include_stop_words: false,
                },
            )
            .await
            .unwrap();
        // Dense ordering, dense scores.
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_score_threshold_applies_to_dense_only() {
        let (_, core) = core_with_engine().await;
        seed_two_docs(&core).await;
        let results = core
            .search(
                TENANT,
                &creds(),
                &SearchParams {
                    model: "m1".to_string(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                    limit: 2,
                    score_threshold: Some(0.5),
                    metric_type: "COSINE".to_string(),
                    hybrid: false,
                    text_filter: None,
                    minimum_words_match: 1,
                    include_stop_words: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_search_limit_bounds() {
        let (_, core) = core_with_engine().await;
        seed_two_docs(&core).await;
        let base = SearchParams {
            model: "m1".to_string(),
            vector: vec![1.0, 0.0, 0.0, 0.0],
            limit: 0,
            score_threshold: None,
            metric_type: "COSINE".to_string(),
            hybrid: false,
            text_filter: None,
            minimum_words_match: 1,
            include_stop_words: false,
        };
        assert!(core.search(TENANT, &creds(), &base).await.is_err());
        let one = SearchParams { limit: 1, ..base };
        assert_eq!(core.search(TENANT, &creds(), &one).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_endpoint_flushes_existing_collection() {
        let (engine, core) = core_with_engine().await;
        seed_two_docs(&core).await;
        core.flush(TENANT, &creds(), "m1").await.unwrap();
        assert_eq!(engine.flushes(), 1);
        assert!(core.flush(TENANT, &creds(), "missing").await.is_err());
    }
}
