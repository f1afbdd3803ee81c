//! Tenant-scoped configuration store with a write-invalidated cache.
//!
//! Rows are keyed `(key, tenant_code)` with empty tenant meaning global.
//! Values may be encrypted at rest; the read API never returns ciphertext —
//! callers get the `"<encrypted>"` sentinel and internal consumers use
//! [`ConfigStore::get_decrypted`]. Hot keys (`cors_origins`,
//! `trusted_hosts`) are served from a per-process cache that every mutation
//! invalidates for the exact `(key, tenant)` pair before returning, so
//! policy changes take effect immediately. Multi-process deployments must
//! assume per-process freshness.

use crate::store::StateDb;
use parking_lot::RwLock;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use vectorgate_core::config::ENCRYPTED_SENTINEL;
use vectorgate_core::crypto::MasterKey;
use vectorgate_core::{GateError, GateResult};

/// One configuration row as exposed by the API.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub tenant_code: String,
    pub value: String,
    pub encrypted: bool,
}

pub struct ConfigStore {
    db: StateDb,
    master_key: Arc<MasterKey>,
    cache: RwLock<HashMap<(String, String), Vec<String>>>,
}

impl ConfigStore {
    pub fn new(db: StateDb, master_key: Arc<MasterKey>) -> Self {
        Self {
            db,
            master_key,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new entry. Fails with `AlreadyExists` when the composite
    /// primary key is taken.
    pub fn add(&self, key: &str, tenant: &str, value: &str, encrypted: bool) -> GateResult<()> {
        let stored = if encrypted {
            self.master_key.encrypt_str(value)
        } else {
            value.to_string()
        };
        self.db
            .with(|conn| {
                conn.execute(
                    "INSERT INTO config_kv(key, tenant_code, value, encrypted) VALUES(?1, ?2, ?3, ?4)",
                    params![key, tenant, stored, encrypted as i64],
                )
            })
            .map_err(|e| match e {
                GateError::AlreadyExists(_) => GateError::AlreadyExists(format!(
                    "config key '{key}' already exists for tenant '{tenant}'"
                )),
                other => other,
            })?;
        self.invalidate(key, tenant);
        Ok(())
    }

    /// Fetch an entry. Encrypted values come back as the sentinel.
    pub fn get(&self, key: &str, tenant: &str) -> GateResult<ConfigEntry> {
        let row = self.read_row(key, tenant)?;
        let Some((value, encrypted)) = row else {
            return Err(GateError::NotFound(format!(
                "config key '{key}' not found for tenant '{tenant}'"
            )));
        };
        Ok(ConfigEntry {
            key: key.to_string(),
            tenant_code: tenant.to_string(),
            value: if encrypted {
                ENCRYPTED_SENTINEL.to_string()
            } else {
                value
            },
            encrypted,
        })
    }

    /// Fetch and decrypt an entry. Internal callers only; never exposed on
    /// the HTTP surface.
    pub fn get_decrypted(&self, key: &str, tenant: &str) -> GateResult<Option<String>> {
        let Some((value, encrypted)) = self.read_row(key, tenant)? else {
            return Ok(None);
        };
        if !encrypted {
            return Ok(Some(value));
        }
        self.master_key
            .decrypt_str(&value)
            .map(Some)
            .map_err(|e| GateError::Encryption(format!("cannot decrypt config value: {e}")))
    }

    /// Partial update of an existing entry. When `encrypted` is `None` the
    /// stored flag is preserved and the value re-sealed accordingly.
    pub fn update(
        &self,
        key: &str,
        tenant: &str,
        value: &str,
        encrypted: Option<bool>,
    ) -> GateResult<()> {
        let existing = self.read_row(key, tenant)?;
        let Some((_, was_encrypted)) = existing else {
            return Err(GateError::NotFound(format!(
                "config key '{key}' not found for tenant '{tenant}'"
            )));
        };
        let encrypted = encrypted.unwrap_or(was_encrypted);
        let stored = if encrypted {
            self.master_key.encrypt_str(value)
        } else {
            value.to_string()
        };
        self.db.with(|conn| {
            conn.execute(
                "UPDATE config_kv SET value = ?3, encrypted = ?4 WHERE key = ?1 AND tenant_code = ?2",
                params![key, tenant, stored, encrypted as i64],
            )
        })?;
        self.invalidate(key, tenant);
        Ok(())
    }

    /// Delete an entry; missing rows are reported as `NotFound`.
    pub fn delete(&self, key: &str, tenant: &str) -> GateResult<()> {
        let affected = self.db.with(|conn| {
            conn.execute(
                "DELETE FROM config_kv WHERE key = ?1 AND tenant_code = ?2",
                params![key, tenant],
            )
        })?;
        self.invalidate(key, tenant);
        if affected == 0 {
            return Err(GateError::NotFound(format!(
                "config key '{key}' not found for tenant '{tenant}'"
            )));
        }
        Ok(())
    }

    /// Enumerate entries for one tenant scope.
    pub fn list(&self, tenant: &str) -> GateResult<Vec<ConfigEntry>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, tenant_code, value, encrypted FROM config_kv
                 WHERE tenant_code = ?1 ORDER BY key",
            )?;
            let rows = stmt.query_map(params![tenant], |row| {
                let encrypted: i64 = row.get(3)?;
                let encrypted = encrypted != 0;
                Ok(ConfigEntry {
                    key: row.get(0)?,
                    tenant_code: row.get(1)?,
                    value: if encrypted {
                        ENCRYPTED_SENTINEL.to_string()
                    } else {
                        row.get(2)?
                    },
                    encrypted,
                })
            })?;
            rows.collect()
        })
    }

    /// Resolve a JSON string-list value (`cors_origins`, `trusted_hosts`,
    /// ...) through the cache. Returns an empty list when the entry is
    /// absent or malformed; callers apply their global fallback.
    pub fn get_list(&self, key: &str, tenant: &str) -> Vec<String> {
        let cache_key = (key.to_string(), tenant.to_string());
        if let Some(cached) = self.cache.read().get(&cache_key) {
            return cached.clone();
        }

        let value = match self.get_decrypted(key, tenant) {
            Ok(Some(raw)) => parse_string_list(key, &raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("failed to read config list '{key}': {e}");
                Vec::new()
            }
        };

        self.cache.write().insert(cache_key, value.clone());
        value
    }

    fn read_row(&self, key: &str, tenant: &str) -> GateResult<Option<(String, bool)>> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT value, encrypted FROM config_kv WHERE key = ?1 AND tenant_code = ?2",
                params![key, tenant],
                |row| {
                    let value: String = row.get(0)?;
                    let encrypted: i64 = row.get(1)?;
                    Ok((value, encrypted != 0))
                },
            )
            .optional()
        })
    }

    /// Drop the cache entry for the exact `(key, tenant)` pair. Runs before
    /// any mutating call returns success.
    fn invalidate(&self, key: &str, tenant: &str) {
        self.cache
            .write()
            .remove(&(key.to_string(), tenant.to_string()));
    }
}

fn parse_string_list(key: &str, raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!("config key '{key}' is not a JSON string list: {e}");
            Vec::new()
        }
    }
}
