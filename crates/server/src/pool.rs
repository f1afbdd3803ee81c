//! Keyed, reference-counted, idle-evicted pool of vector-DB clients.
//!
//! Entries are keyed by `(uri, user, database)`; secrets participate in
//! client construction on first miss but are not part of the key. Client
//! construction runs under a per-key creation lock so a cold key under
//! concurrent load produces exactly one handshake. The background sweeper
//! closes entries that are idle past `max_idle` with no requests in flight,
//! never shrinking below the soft floor. A hard ceiling of `max_entries`
//! is enforced by rejecting acquisition with `PoolExhausted` when every
//! entry is busy.

use crate::milvus::backend::{BackendFactory, VectorBackend};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vectorgate_core::sanitize::sanitize_for_log;
use vectorgate_core::{GateError, GateResult};

/// Pool key. Secrets deliberately excluded: subsequent acquires assume the
/// credentials bound at construction remain valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub uri: String,
    pub user: String,
    pub database: String,
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{}", self.user, self.uri, self.database)
    }
}

struct Entry {
    client: Arc<dyn VectorBackend>,
    created_at: Instant,
    last_used: Instant,
    in_flight: u32,
}

/// Point-in-time pool statistics for the health surface.
#[derive(Debug, Serialize)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub max_entries: usize,
    pub entries: Vec<EntryStats>,
}

#[derive(Debug, Serialize)]
pub struct EntryStats {
    pub key: String,
    pub age_seconds: u64,
    pub idle_seconds: u64,
    pub in_flight: u32,
}

pub struct ConnectionPool {
    factory: Arc<dyn BackendFactory>,
    entries: Mutex<HashMap<PoolKey, Entry>>,
    creation_locks: Mutex<HashMap<PoolKey, Arc<tokio::sync::Mutex<()>>>>,
    max_entries: usize,
    max_idle: Duration,
    soft_floor: usize,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        max_entries: usize,
        max_idle: Duration,
        soft_floor: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            entries: Mutex::new(HashMap::new()),
            creation_locks: Mutex::new(HashMap::new()),
            max_entries,
            max_idle,
            soft_floor,
            closed: AtomicBool::new(false),
        })
    }

    /// Acquire a client for `(uri, user, database)`, constructing one on
    /// first use. Returns an RAII handle that releases on drop.
    pub async fn acquire(
        self: &Arc<Self>,
        uri: &str,
        user: &str,
        secret: &str,
        database: &str,
    ) -> GateResult<PooledClient> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GateError::Connection("connection pool is closed".into()));
        }
        let key = PoolKey {
            uri: uri.to_string(),
            user: user.to_string(),
            database: database.to_string(),
        };

        if let Some(client) = self.checkout(&key) {
            return Ok(PooledClient {
                pool: self.clone(),
                key,
                client,
            });
        }

        // Miss: serialize construction per key so concurrent cold acquires
        // share one handshake.
        let creation_lock = {
            let mut locks = self.creation_locks.lock();
            locks.entry(key.clone()).or_default().clone()
        };
        let _guard = creation_lock.lock().await;

        // Another task may have finished constructing while we waited.
        if let Some(client) = self.checkout(&key) {
            return Ok(PooledClient {
                pool: self.clone(),
                key,
                client,
            });
        }

        self.reserve_capacity(&key)?;

        let connected = self
            .factory
            .connect(uri, user, secret, database)
            .await
            .map_err(|e| {
                // Acquisition failures are connection errors; nothing is cached.
                GateError::Connection(format!("failed to connect to vector DB: {e}"))
            });
        let client = match connected {
            Ok(client) => client,
            Err(e) => {
                self.creation_locks.lock().remove(&key);
                return Err(e);
            }
        };

        let now = Instant::now();
        self.entries.lock().insert(
            key.clone(),
            Entry {
                client: client.clone(),
                created_at: now,
                last_used: now,
                in_flight: 1,
            },
        );
        self.creation_locks.lock().remove(&key);
        tracing::debug!("pooled new vector DB client: {}", sanitize_for_log(&key.to_string()));

        Ok(PooledClient {
            pool: self.clone(),
            key,
            client,
        })
    }

    fn checkout(&self, key: &PoolKey) -> Option<Arc<dyn VectorBackend>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key)?;
        entry.in_flight += 1;
        entry.last_used = Instant::now();
        Some(entry.client.clone())
    }

    /// Make room for one more entry, evicting the stalest idle entry when at
    /// the ceiling; fails with `PoolExhausted` when every entry is busy.
    fn reserve_capacity(&self, key: &PoolKey) -> GateResult<()> {
        let mut entries = self.entries.lock();
        if entries.len() < self.max_entries {
            return Ok(());
        }
        let evictable = entries
            .iter()
            .filter(|(_, e)| e.in_flight == 0)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());
        match evictable {
            Some(stale) => {
                entries.remove(&stale);
                tracing::debug!(
                    "evicted idle pool entry {} to admit {}",
                    sanitize_for_log(&stale.to_string()),
                    sanitize_for_log(&key.to_string())
                );
                Ok(())
            }
            None => Err(GateError::PoolExhausted(format!(
                "connection pool exhausted ({} busy entries)",
                entries.len()
            ))),
        }
    }

    fn release(&self, key: &PoolKey) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            entry.last_used = Instant::now();
        }
    }

    /// Close idle-expired entries. Holds the map lock only for the mutation.
    pub fn sweep(&self) {
        let mut entries = self.entries.lock();
        if entries.len() <= self.soft_floor {
            return;
        }
        let now = Instant::now();
        let mut expired: Vec<PoolKey> = entries
            .iter()
            .filter(|(_, e)| e.in_flight == 0 && now.duration_since(e.last_used) > self.max_idle)
            .map(|(k, _)| k.clone())
            .collect();
        // Oldest first, and never shrink below the floor.
        expired.sort_by_key(|k| entries[k].last_used);
        let removable = entries.len().saturating_sub(self.soft_floor);
        for key in expired.into_iter().take(removable) {
            entries.remove(&key);
            tracing::debug!("closed idle pool entry: {}", sanitize_for_log(&key.to_string()));
        }
    }

    pub fn stats(&self) -> PoolStats {
        let entries = self.entries.lock();
        let now = Instant::now();
        let active = entries.values().filter(|e| e.in_flight > 0).count();
        PoolStats {
            active,
            idle: entries.len() - active,
            max_entries: self.max_entries,
            entries: entries
                .iter()
                .map(|(key, e)| EntryStats {
                    key: sanitize_for_log(&key.to_string()),
                    age_seconds: now.duration_since(e.created_at).as_secs(),
                    idle_seconds: now.duration_since(e.last_used).as_secs(),
                    in_flight: e.in_flight,
                })
                .collect(),
        }
    }

    /// Drain and close every client. Waits up to `grace` for in-flight
    /// operations, then force-closes. Further `acquire` calls fail.
    pub async fn close(&self, grace: Duration) {
        self.closed.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + grace;
        loop {
            let busy = self.entries.lock().values().any(|e| e.in_flight > 0);
            if !busy || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let drained = {
            let mut entries = self.entries.lock();
            let count = entries.len();
            entries.clear();
            count
        };
        tracing::info!("connection pool closed, {drained} client(s) dropped");
    }
}

/// RAII handle around a pooled client. Dropping it releases the entry.
pub struct PooledClient {
    pool: Arc<ConnectionPool>,
    key: PoolKey,
    client: Arc<dyn VectorBackend>,
}

impl std::fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledClient").field("key", &self.key).finish()
    }
}

impl PooledClient {
    pub fn key(&self) -> &PoolKey {
        &self.key
    }
}

impl std::ops::Deref for PooledClient {
    type Target = dyn VectorBackend;

    fn deref(&self) -> &Self::Target {
        &*self.client
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        self.pool.release(&self.key);
    }
}
