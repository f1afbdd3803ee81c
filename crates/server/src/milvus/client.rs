//! Milvus REST v2 client.
//!
//! Speaks the `/v2/vectordb` JSON API with per-request bearer credentials
//! (`user:password`) and the bound database name in each body. Transport
//! failures surface as `ConnectionError`; engine rejections surface as
//! `OperationError` with the engine message attached (sanitized at the
//! response boundary, not here).

use crate::milvus::backend::{
    BackendFactory, CollectionSpec, DenseQuery, IndexSpec, SearchHit, SparseQuery, VectorBackend,
    VectorRow,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use vectorgate_core::config;
use vectorgate_core::{GateError, GateResult};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MilvusRestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    database: String,
}

impl MilvusRestClient {
    pub fn new(uri: &str, user: &str, secret: &str, database: &str) -> GateResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GateError::Internal(format!("cannot build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: uri.trim_end_matches('/').to_string(),
            token: format!("{user}:{secret}"),
            database: database.to_string(),
        })
    }

    fn db_body(&self, mut body: Map<String, Value>) -> Value {
        if !self.database.is_empty() {
            body.insert("dbName".to_string(), json!(self.database));
        }
        Value::Object(body)
    }

    async fn post(&self, path: &str, body: Value) -> GateResult<Value> {
        self.post_with_timeout(path, body, None).await
    }

    async fn post_admin(&self, path: &str, body: Value) -> GateResult<Value> {
        self.post_with_timeout(
            path,
            body,
            Some(Duration::from_secs(config::ADMIN_TIMEOUT_SECS)),
        )
        .await
    }

    async fn post_with_timeout(
        &self,
        path: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> GateResult<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body);
        if let Some(t) = timeout {
            request = request.timeout(t);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GateError::Connection(format!("vector DB timed out on {path}"))
            } else {
                GateError::Connection(format!("vector DB unreachable: {e}"))
            }
        })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| GateError::Connection(format!("malformed vector DB response: {e}")))?;

        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if !status.is_success() || (code != 0 && code != 200) {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified engine error");
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(GateError::Authentication(format!(
                    "vector DB rejected credentials: {message}"
                )));
            }
            return Err(GateError::Operation(format!(
                "vector DB rejected {path}: {message}"
            )));
        }
        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }
}

fn string_list(data: &Value) -> Vec<String> {
    data.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .or_else(|| v.get("name").and_then(Value::as_str).map(str::to_string))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn sparse_to_json(weights: &HashMap<u32, f32>) -> Value {
    Value::Object(
        weights
            .iter()
            .map(|(idx, w)| (idx.to_string(), json!(w)))
            .collect(),
    )
}

fn parse_hits(data: &Value) -> Vec<SearchHit> {
    let rows: Vec<&Value> = match data {
        // Flat hit list, or one inner list per query vector.
        Value::Array(items) if items.first().map(Value::is_array).unwrap_or(false) => items
            .iter()
            .flat_map(|inner| inner.as_array().into_iter().flatten())
            .collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };

    rows.iter()
        .filter_map(|hit| {
            let id = hit
                .get(config::PRIMARY_FIELD_NAME)
                .or_else(|| hit.get("id"))
                .and_then(Value::as_str)?
                .to_string();
            let score = hit
                .get("distance")
                .or_else(|| hit.get("score"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32;
            let chunk = hit
                .get("chunk")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let meta = hit.get("meta").cloned().unwrap_or(Value::Null);
            Some(SearchHit {
                id,
                score,
                chunk,
                meta,
            })
        })
        .collect()
}

#[async_trait]
impl VectorBackend for MilvusRestClient {
    async fn ping(&self) -> GateResult<()> {
        self.post_with_timeout(
            "/v2/vectordb/collections/list",
            self.db_body(Map::new()),
            Some(PING_TIMEOUT),
        )
        .await
        .map(|_| ())
    }

    async fn list_databases(&self) -> GateResult<Vec<String>> {
        let data = self
            .post_admin("/v2/vectordb/databases/list", json!({}))
            .await?;
        Ok(string_list(&data))
    }

    async fn create_database(&self, name: &str) -> GateResult<()> {
        self.post_admin("/v2/vectordb/databases/create", json!({"dbName": name}))
            .await
            .map(|_| ())
    }

    async fn drop_database(&self, name: &str) -> GateResult<()> {
        self.post_admin("/v2/vectordb/databases/drop", json!({"dbName": name}))
            .await
            .map(|_| ())
    }

    async fn list_roles(&self) -> GateResult<Vec<String>> {
        let data = self.post_admin("/v2/vectordb/roles/list", json!({})).await?;
        Ok(string_list(&data))
    }

    async fn create_role(&self, name: &str) -> GateResult<()> {
        self.post_admin("/v2/vectordb/roles/create", json!({"roleName": name}))
            .await
            .map(|_| ())
    }

    async fn drop_role(&self, name: &str) -> GateResult<()> {
        self.post_admin("/v2/vectordb/roles/drop", json!({"roleName": name}))
            .await
            .map(|_| ())
    }

    async fn list_users(&self) -> GateResult<Vec<String>> {
        let data = self.post_admin("/v2/vectordb/users/list", json!({})).await?;
        Ok(string_list(&data))
    }

    async fn create_user(&self, name: &str, password: &str) -> GateResult<()> {
        self.post_admin(
            "/v2/vectordb/users/create",
            json!({"userName": name, "password": password}),
        )
        .await
        .map(|_| ())
    }

    async fn drop_user(&self, name: &str) -> GateResult<()> {
        self.post_admin("/v2/vectordb/users/drop", json!({"userName": name}))
            .await
            .map(|_| ())
    }

    async fn update_password(&self, name: &str, old: &str, new: &str) -> GateResult<()> {
        self.post_admin(
            "/v2/vectordb/users/update_password",
            json!({"userName": name, "password": old, "newPassword": new}),
        )
        .await
        .map(|_| ())
    }

    async fn grant_role(&self, user: &str, role: &str) -> GateResult<()> {
        self.post_admin(
            "/v2/vectordb/users/grant_role",
            json!({"userName": user, "roleName": role}),
        )
        .await
        .map(|_| ())
    }

    async fn revoke_role(&self, user: &str, role: &str) -> GateResult<()> {
        self.post_admin(
            "/v2/vectordb/users/revoke_role",
            json!({"userName": user, "roleName": role}),
        )
        .await
        .map(|_| ())
    }

    async fn grant_privilege(
        &self,
        role: &str,
        object_name: &str,
        privilege: &str,
    ) -> GateResult<()> {
        let mut body = Map::new();
        body.insert("roleName".to_string(), json!(role));
        body.insert("objectType".to_string(), json!("Collection"));
        body.insert("objectName".to_string(), json!(object_name));
        body.insert("privilege".to_string(), json!(privilege));
        self.post_admin("/v2/vectordb/roles/grant_privilege", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn revoke_privilege(
        &self,
        role: &str,
        object_name: &str,
        privilege: &str,
    ) -> GateResult<()> {
        let mut body = Map::new();
        body.insert("roleName".to_string(), json!(role));
        body.insert("objectType".to_string(), json!("Collection"));
        body.insert("objectName".to_string(), json!(object_name));
        body.insert("privilege".to_string(), json!(privilege));
        self.post_admin("/v2/vectordb/roles/revoke_privilege", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn has_collection(&self, name: &str) -> GateResult<bool> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(name));
        let data = self
            .post("/v2/vectordb/collections/has", self.db_body(body))
            .await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn collection_dimension(&self, name: &str) -> GateResult<Option<usize>> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(name));
        let data = match self
            .post("/v2/vectordb/collections/describe", self.db_body(body))
            .await
        {
            Ok(data) => data,
            Err(GateError::Operation(_)) => return Ok(None),
            Err(other) => return Err(other),
        };

        let fields = data.get("fields").and_then(Value::as_array);
        let Some(fields) = fields else {
            return Ok(None);
        };
        for field in fields {
            if field.get("name").and_then(Value::as_str) != Some(config::VECTOR_FIELD_NAME) {
                continue;
            }
            // `params` is either an object {"dim": N} or a [{key, value}] list.
            if let Some(params) = field.get("params") {
                if let Some(dim) = params.get("dim").and_then(Value::as_u64) {
                    return Ok(Some(dim as usize));
                }
                if let Some(entries) = params.as_array() {
                    for entry in entries {
                        if entry.get("key").and_then(Value::as_str) == Some("dim") {
                            let dim = entry
                                .get("value")
                                .and_then(|v| {
                                    v.as_u64()
                                        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                                });
                            return Ok(dim.map(|d| d as usize));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> GateResult<()> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(spec.name));
        body.insert(
            "schema".to_string(),
            json!({
                "enableDynamicField": true,
                "fields": [
                    {
                        "fieldName": config::PRIMARY_FIELD_NAME,
                        "dataType": "VarChar",
                        "isPrimary": true,
                        "elementTypeParams": {"max_length": config::MAX_KEY_LEN},
                    },
                    {
                        "fieldName": config::VECTOR_FIELD_NAME,
                        "dataType": "FloatVector",
                        "elementTypeParams": {"dim": spec.dimension},
                    },
                    {
                        "fieldName": config::SPARSE_FIELD_NAME,
                        "dataType": "SparseFloatVector",
                    },
                    {
                        "fieldName": "chunk",
                        "dataType": "VarChar",
                        "elementTypeParams": {"max_length": config::MAX_CHUNK_LEN},
                    },
                    {
                        "fieldName": "model",
                        "dataType": "VarChar",
                        "elementTypeParams": {"max_length": 256},
                    },
                    {
                        "fieldName": "meta",
                        "dataType": "JSON",
                        "elementTypeParams": {"max_length": spec.metadata_length},
                    },
                ],
            }),
        );
        self.post_admin("/v2/vectordb/collections/create", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn drop_collection(&self, name: &str) -> GateResult<()> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(name));
        self.post_admin("/v2/vectordb/collections/drop", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn list_indexes(&self, collection: &str) -> GateResult<Vec<String>> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(collection));
        let data = self
            .post("/v2/vectordb/indexes/list", self.db_body(body))
            .await?;
        Ok(string_list(&data))
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> GateResult<()> {
        let mut params = Map::new();
        if let Some(nlist) = spec.nlist {
            params.insert("nlist".to_string(), json!(nlist));
        }
        if let Some(ratio) = spec.drop_ratio_build {
            params.insert("drop_ratio_build".to_string(), json!(ratio));
        }
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(collection));
        body.insert(
            "indexParams".to_string(),
            json!([{
                "fieldName": spec.field,
                "indexName": spec.index_name,
                "indexType": spec.index_type,
                "metricType": spec.metric_type,
                "params": Value::Object(params),
            }]),
        );
        self.post_admin("/v2/vectordb/indexes/create", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn upsert(&self, collection: &str, rows: &[VectorRow]) -> GateResult<()> {
        let data: Vec<Value> = rows
            .iter()
            .map(|row| {
                json!({
                    config::PRIMARY_FIELD_NAME: row.id,
                    config::VECTOR_FIELD_NAME: row.vector,
                    config::SPARSE_FIELD_NAME: sparse_to_json(&row.sparse),
                    "chunk": row.chunk,
                    "model": row.model,
                    "meta": row.meta,
                })
            })
            .collect();
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(collection));
        body.insert("data".to_string(), json!(data));
        self.post("/v2/vectordb/entities/upsert", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> GateResult<()> {
        let quoted: Vec<String> = ids.iter().map(|id| format!("\"{id}\"")).collect();
        let filter = format!(
            "{} in [{}]",
            config::PRIMARY_FIELD_NAME,
            quoted.join(", ")
        );
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(collection));
        body.insert("filter".to_string(), json!(filter));
        self.post("/v2/vectordb/entities/delete", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn flush(&self, collection: &str) -> GateResult<()> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(collection));
        self.post("/v2/vectordb/collections/flush", self.db_body(body))
            .await
            .map(|_| ())
    }

    async fn search_dense(
        &self,
        collection: &str,
        query: &DenseQuery,
    ) -> GateResult<Vec<SearchHit>> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(collection));
        body.insert("data".to_string(), json!([query.vector]));
        body.insert("annsField".to_string(), json!(config::VECTOR_FIELD_NAME));
        body.insert("limit".to_string(), json!(query.limit));
        body.insert(
            "outputFields".to_string(),
            json!([config::PRIMARY_FIELD_NAME, "chunk", "meta"]),
        );
        body.insert(
            "searchParams".to_string(),
            json!({"metricType": query.metric_type, "params": {}}),
        );
        let data = self
            .post("/v2/vectordb/entities/search", self.db_body(body))
            .await?;
        Ok(parse_hits(&data))
    }

    async fn search_sparse(
        &self,
        collection: &str,
        query: &SparseQuery,
    ) -> GateResult<Vec<SearchHit>> {
        let mut body = Map::new();
        body.insert("collectionName".to_string(), json!(collection));
        body.insert("data".to_string(), json!([sparse_to_json(&query.weights)]));
        body.insert("annsField".to_string(), json!(config::SPARSE_FIELD_NAME));
        body.insert("limit".to_string(), json!(query.limit));
        body.insert(
            "outputFields".to_string(),
            json!([config::PRIMARY_FIELD_NAME, "chunk", "meta"]),
        );
        body.insert(
            "searchParams".to_string(),
            json!({"metricType": "IP", "params": {}}),
        );
        let data = self
            .post("/v2/vectordb/entities/search", self.db_body(body))
            .await?;
        Ok(parse_hits(&data))
    }
}

/// Factory producing REST clients; connection is verified with a ping so
/// bad credentials are reported as an acquisition failure and never cached.
pub struct MilvusRestFactory;

#[async_trait]
impl BackendFactory for MilvusRestFactory {
    async fn connect(
        &self,
        uri: &str,
        user: &str,
        secret: &str,
        database: &str,
    ) -> GateResult<Arc<dyn VectorBackend>> {
        let client = MilvusRestClient::new(uri, user, secret, database)?;
        client.ping().await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_to_json_keys_are_decimal_strings() {
        let mut weights = HashMap::new();
        weights.insert(42u32, 1.5f32);
        let value = sparse_to_json(&weights);
        assert!((value["42"].as_f64().unwrap() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse_hits_flat_list() {
        let data = json!([
            {"flouds_vector_id": "a", "distance": 0.9, "chunk": "hello", "meta": {"k": 1}},
            {"flouds_vector_id": "b", "distance": 0.5, "chunk": "bye", "meta": null},
        ]);
        let hits = parse_hits(&data);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_parse_hits_nested_per_query_lists() {
        let data = json!([[{"id": "x", "score": 1.25, "chunk": "c"}]]);
        let hits = parse_hits(&data);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "x");
    }

    #[test]
    fn test_parse_hits_skips_rows_without_id() {
        let data = json!([{"distance": 0.4, "chunk": "orphan"}]);
        assert!(parse_hits(&data).is_empty());
    }
}
