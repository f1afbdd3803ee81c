//! Embedded in-memory vector backend.
//!
//! A functional stand-in for the remote engine used by `--vectordb-endpoint
//! memory` (local development) and the integration tests. Implements the
//! full [`VectorBackend`] contract over process memory: databases, users,
//! roles, grants, collections with dense + sparse rows, brute-force search.

use crate::milvus::backend::{
    BackendFactory, CollectionSpec, DenseQuery, IndexSpec, SearchHit, SparseQuery, VectorBackend,
    VectorRow,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vectorgate_core::{GateError, GateResult};

#[derive(Default)]
struct Collection {
    dimension: usize,
    rows: BTreeMap<String, VectorRow>,
    indexes: Vec<String>,
}

#[derive(Default)]
struct Database {
    collections: HashMap<String, Collection>,
}

/// Shared engine state; every connected backend is a view onto one engine.
#[derive(Default)]
pub struct MemoryEngine {
    users: RwLock<HashMap<String, String>>,
    roles: RwLock<HashSet<String>>,
    user_roles: RwLock<HashMap<String, HashSet<String>>>,
    grants: RwLock<HashSet<(String, String, String)>>,
    databases: RwLock<HashMap<String, Database>>,
    flush_count: AtomicU64,
}

impl MemoryEngine {
    /// Engine seeded with an admin user and the default database.
    pub fn new(admin_user: &str, admin_password: &str) -> Arc<Self> {
        let engine = Self::default();
        engine
            .users
            .write()
            .insert(admin_user.to_string(), admin_password.to_string());
        engine
            .databases
            .write()
            .insert("default".to_string(), Database::default());
        Arc::new(engine)
    }

    /// Number of flushes issued across all collections (test hook).
    pub fn flushes(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }
}

/// One connected view bound to `(user, database)`.
pub struct MemoryBackend {
    engine: Arc<MemoryEngine>,
    database: String,
}

impl MemoryBackend {
    fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Collection) -> GateResult<T>,
    ) -> GateResult<T> {
        let databases = self.engine.databases.read();
        let db = databases
            .get(&self.database)
            .ok_or_else(|| GateError::Operation(format!("database '{}' not found", self.database)))?;
        let collection = db
            .collections
            .get(name)
            .ok_or_else(|| GateError::Operation(format!("collection '{name}' not found")))?;
        f(collection)
    }

    fn with_collection_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Collection) -> GateResult<T>,
    ) -> GateResult<T> {
        let mut databases = self.engine.databases.write();
        let db = databases
            .get_mut(&self.database)
            .ok_or_else(|| GateError::Operation(format!("database '{}' not found", self.database)))?;
        let collection = db
            .collections
            .get_mut(name)
            .ok_or_else(|| GateError::Operation(format!("collection '{name}' not found")))?;
        f(collection)
    }
}

fn dense_score(metric: &str, query: &[f32], row: &[f32]) -> f32 {
    let dot: f32 = query.iter().zip(row).map(|(a, b)| a * b).sum();
    match metric.to_uppercase().as_str() {
        "IP" => dot,
        // Negated so "higher is better" holds for every metric.
        "L2" => {
            let dist: f32 = query
                .iter()
                .zip(row)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            -dist
        }
        _ => {
            let qn: f32 = query.iter().map(|v| v * v).sum::<f32>().sqrt();
            let rn: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            if qn == 0.0 || rn == 0.0 {
                0.0
            } else {
                dot / (qn * rn)
            }
        }
    }
}

fn top_hits(mut scored: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(limit);
    scored
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn ping(&self) -> GateResult<()> {
        Ok(())
    }

    async fn list_databases(&self) -> GateResult<Vec<String>> {
        Ok(self.engine.databases.read().keys().cloned().collect())
    }

    async fn create_database(&self, name: &str) -> GateResult<()> {
        let mut databases = self.engine.databases.write();
        if databases.contains_key(name) {
            return Err(GateError::Operation(format!("database '{name}' exists")));
        }
        databases.insert(name.to_string(), Database::default());
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> GateResult<()> {
        self.engine.databases.write().remove(name);
        Ok(())
    }

    async fn list_roles(&self) -> GateResult<Vec<String>> {
        Ok(self.engine.roles.read().iter().cloned().collect())
    }

    async fn create_role(&self, name: &str) -> GateResult<()> {
        self.engine.roles.write().insert(name.to_string());
        Ok(())
    }

    async fn drop_role(&self, name: &str) -> GateResult<()> {
        self.engine.roles.write().remove(name);
        let mut grants = self.engine.grants.write();
        grants.retain(|(role, _, _)| role != name);
        Ok(())
    }

    async fn list_users(&self) -> GateResult<Vec<String>> {
        Ok(self.engine.users.read().keys().cloned().collect())
    }

    async fn create_user(&self, name: &str, password: &str) -> GateResult<()> {
        let mut users = self.engine.users.write();
        if users.contains_key(name) {
            return Err(GateError::Operation(format!("user '{name}' exists")));
        }
        users.insert(name.to_string(), password.to_string());
        Ok(())
    }

    async fn drop_user(&self, name: &str) -> GateResult<()> {
        self.engine.users.write().remove(name);
        self.engine.user_roles.write().remove(name);
        Ok(())
    }

    async fn update_password(&self, name: &str, old: &str, new: &str) -> GateResult<()> {
        let mut users = self.engine.users.write();
        match users.get(name) {
            Some(current) if current == old => {
                users.insert(name.to_string(), new.to_string());
                Ok(())
            }
            Some(_) => Err(GateError::Operation("old password does not match".into())),
            None => Err(GateError::Operation(format!("user '{name}' not found"))),
        }
    }

    async fn grant_role(&self, user: &str, role: &str) -> GateResult<()> {
        self.engine
            .user_roles
            .write()
            .entry(user.to_string())
            .or_default()
            .insert(role.to_string());
        Ok(())
    }

    async fn revoke_role(&self, user: &str, role: &str) -> GateResult<()> {
        if let Some(roles) = self.engine.user_roles.write().get_mut(user) {
            roles.remove(role);
        }
        Ok(())
    }

    async fn grant_privilege(
        &self,
        role: &str,
        object_name: &str,
        privilege: &str,
    ) -> GateResult<()> {
        self.engine.grants.write().insert((
            role.to_string(),
            object_name.to_string(),
            privilege.to_string(),
        ));
        Ok(())
    }

    async fn revoke_privilege(
        &self,
        role: &str,
        object_name: &str,
        privilege: &str,
    ) -> GateResult<()> {
        self.engine.grants.write().remove(&(
            role.to_string(),
            object_name.to_string(),
            privilege.to_string(),
        ));
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> GateResult<bool> {
        let databases = self.engine.databases.read();
        Ok(databases
            .get(&self.database)
            .map(|db| db.collections.contains_key(name))
            .unwrap_or(false))
    }

    async fn collection_dimension(&self, name: &str) -> GateResult<Option<usize>> {
        let databases = self.engine.databases.read();
        Ok(databases
            .get(&self.database)
            .and_then(|db| db.collections.get(name))
            .map(|c| c.dimension))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> GateResult<()> {
        let mut databases = self.engine.databases.write();
        let db = databases
            .get_mut(&self.database)
            .ok_or_else(|| GateError::Operation(format!("database '{}' not found", self.database)))?;
        if db.collections.contains_key(&spec.name) {
            return Err(GateError::Operation(format!(
                "collection '{}' exists",
                spec.name
            )));
        }
        db.collections.insert(
            spec.name.clone(),
            Collection {
                dimension: spec.dimension,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> GateResult<()> {
        let mut databases = self.engine.databases.write();
        if let Some(db) = databases.get_mut(&self.database) {
            db.collections.remove(name);
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> GateResult<Vec<String>> {
        self.with_collection(collection, |c| Ok(c.indexes.clone()))
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> GateResult<()> {
        self.with_collection_mut(collection, |c| {
            if !c.indexes.contains(&spec.index_name) {
                c.indexes.push(spec.index_name.clone());
            }
            Ok(())
        })
    }

    async fn upsert(&self, collection: &str, rows: &[VectorRow]) -> GateResult<()> {
        self.with_collection_mut(collection, |c| {
            for row in rows {
                if row.vector.len() != c.dimension {
                    return Err(GateError::Operation(format!(
                        "vector dimension {} does not match collection dimension {}",
                        row.vector.len(),
                        c.dimension
                    )));
                }
                c.rows.insert(row.id.clone(), row.clone());
            }
            Ok(())
        })
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> GateResult<()> {
        self.with_collection_mut(collection, |c| {
            for id in ids {
                c.rows.remove(id);
            }
            Ok(())
        })
    }

    async fn flush(&self, collection: &str) -> GateResult<()> {
        self.with_collection(collection, |_| Ok(()))?;
        self.engine.flush_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn search_dense(
        &self,
        collection: &str,
        query: &DenseQuery,
    ) -> GateResult<Vec<SearchHit>> {
        self.with_collection(collection, |c| {
            if query.vector.len() != c.dimension {
                return Err(GateError::Operation(format!(
                    "query dimension {} does not match collection dimension {}",
                    query.vector.len(),
                    c.dimension
                )));
            }
            let scored = c
                .rows
                .values()
                .map(|row| SearchHit {
                    id: row.id.clone(),
                    score: dense_score(&query.metric_type, &query.vector, &row.vector),
                    chunk: row.chunk.clone(),
                    meta: row.meta.clone(),
                })
                .collect();
            Ok(top_hits(scored, query.limit))
        })
    }

    async fn search_sparse(
        &self,
        collection: &str,
        query: &SparseQuery,
    ) -> GateResult<Vec<SearchHit>> {
        self.with_collection(collection, |c| {
            let scored = c
                .rows
                .values()
                .filter_map(|row| {
                    let score: f32 = query
                        .weights
                        .iter()
                        .filter_map(|(idx, qw)| row.sparse.get(idx).map(|dw| qw * dw))
                        .sum();
                    (score > 0.0).then(|| SearchHit {
                        id: row.id.clone(),
                        score,
                        chunk: row.chunk.clone(),
                        meta: row.meta.clone(),
                    })
                })
                .collect();
            Ok(top_hits(scored, query.limit))
        })
    }
}

/// Factory over one shared engine. Credentials are checked at connect time
/// so the pool sees bad tenant passwords exactly like a remote auth failure.
pub struct MemoryBackendFactory {
    engine: Arc<MemoryEngine>,
}

impl MemoryBackendFactory {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> Arc<MemoryEngine> {
        self.engine.clone()
    }
}

#[async_trait]
impl BackendFactory for MemoryBackendFactory {
    async fn connect(
        &self,
        _uri: &str,
        user: &str,
        secret: &str,
        database: &str,
    ) -> GateResult<Arc<dyn VectorBackend>> {
        let authorized = self
            .engine
            .users
            .read()
            .get(user)
            .map(|pw| pw == secret)
            .unwrap_or(false);
        if !authorized {
            return Err(GateError::Connection(format!(
                "authentication failed for user '{user}'"
            )));
        }
        Ok(Arc::new(MemoryBackend {
            engine: self.engine.clone(),
            database: if database.is_empty() {
                "default".to_string()
            } else {
                database.to_string()
            },
        }))
    }
}
