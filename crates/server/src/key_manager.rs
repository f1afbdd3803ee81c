//! Client identity records: creation, verification, fingerprints.
//!
//! A client is a principal with a salted SHA-256 secret hash, an AES-GCM
//! encrypted copy of the secret (re-issuance only — verification is
//! hashed-only), a stable fingerprint for audit, an optional tenant binding
//! and a set of allowed actions. A client bound to the empty tenant is a
//! global admin and passes any tenant check.

use crate::store::StateDb;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use vectorgate_core::crypto::MasterKey;
use vectorgate_core::sanitize::sanitize_for_log;
use vectorgate_core::{GateError, GateResult};

/// Action granting full control-plane access.
pub const ACTION_ADMIN: &str = "admin";
/// Action granting data-plane access (insert/search/flush).
pub const ACTION_DATA: &str = "data";

const SALT_LEN: usize = 16;
const FINGERPRINT_LEN: usize = 16;
const BOOTSTRAP_ADMIN_USERNAME: &str = "admin";
const BOOTSTRAP_SECRET_LEN: usize = 40;

/// A validated client principal, as attached to request context.
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub username: String,
    pub tenant_code: String,
    pub actions: Vec<String>,
    pub fingerprint: String,
}

impl Client {
    pub fn is_admin(&self) -> bool {
        self.actions.iter().any(|a| a == ACTION_ADMIN)
    }

    /// Global clients have no tenant binding.
    pub fn is_global(&self) -> bool {
        self.tenant_code.is_empty()
    }
}

/// Previous credential columns captured before a secret rotation.
#[derive(Debug, Clone)]
pub struct SecretSnapshot {
    pub hashed_secret: String,
    pub encrypted_secret: String,
}

/// Fingerprint record for the audit endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintEntry {
    pub username: String,
    pub fingerprint: String,
    pub tenant_code: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

pub struct KeyManager {
    db: StateDb,
    master_key: Arc<MasterKey>,
}

impl KeyManager {
    pub fn new(db: StateDb, master_key: Arc<MasterKey>) -> Self {
        Self { db, master_key }
    }

    /// Create a client. The secret is stored salted-hashed plus encrypted at
    /// rest; the plaintext never touches the database.
    pub fn create_client(
        &self,
        username: &str,
        secret: &str,
        tenant: &str,
        actions: &[&str],
    ) -> GateResult<Client> {
        if username.is_empty() || secret.is_empty() {
            return Err(GateError::Validation(
                "username and secret must be non-empty".to_string(),
            ));
        }

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt_hex = hex(&salt);
        let hashed = hash_secret(secret, &salt_hex);
        let stored_hash = format!("{salt_hex}${hashed}");
        let fingerprint = fingerprint_of(username, &stored_hash);
        let encrypted_secret = self.master_key.encrypt_str(secret);
        let actions_json = serde_json::to_string(actions)
            .map_err(|e| GateError::Internal(format!("cannot serialize actions: {e}")))?;

        self.db
            .with(|conn| {
                conn.execute(
                    "INSERT INTO clients(username, hashed_secret, encrypted_secret, fingerprint, tenant_code, actions)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                    params![username, stored_hash, encrypted_secret, fingerprint, tenant, actions_json],
                )
            })
            .map_err(|e| match e {
                GateError::AlreadyExists(_) => {
                    GateError::AlreadyExists(format!("client '{username}' already exists"))
                }
                other => other,
            })?;

        tracing::info!(
            client = %sanitize_for_log(username),
            tenant = %sanitize_for_log(tenant),
            "client created"
        );
        Ok(Client {
            username: username.to_string(),
            tenant_code: tenant.to_string(),
            actions: actions.iter().map(|s| s.to_string()).collect(),
            fingerprint,
        })
    }

    /// Validate presented credentials and an optional expected tenant.
    ///
    /// Unknown users and wrong secrets are indistinguishable to the caller.
    /// When `expected_tenant` is non-empty it must equal the client's bound
    /// tenant, unless the client is global.
    pub fn validate(
        &self,
        username: &str,
        presented_secret: &str,
        expected_tenant: &str,
    ) -> GateResult<Client> {
        let row = self.db.with(|conn| {
            conn.query_row(
                "SELECT hashed_secret, tenant_code, actions, fingerprint FROM clients WHERE username = ?1",
                params![username],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
        })?;

        let Some((stored_hash, tenant_code, actions_json, fingerprint)) = row else {
            return Err(GateError::Authentication("invalid credentials".to_string()));
        };

        if !verify_secret(presented_secret, &stored_hash) {
            tracing::warn!(
                client = %sanitize_for_log(username),
                "authentication failed: secret mismatch"
            );
            return Err(GateError::Authentication("invalid credentials".to_string()));
        }

        if !expected_tenant.is_empty()
            && !tenant_code.is_empty()
            && tenant_code != expected_tenant
        {
            return Err(GateError::Tenant(format!(
                "client is not bound to tenant '{}'",
                sanitize_for_log(expected_tenant)
            )));
        }

        self.touch(username);

        let actions: Vec<String> = serde_json::from_str(&actions_json).unwrap_or_default();
        Ok(Client {
            username: username.to_string(),
            tenant_code,
            actions,
            fingerprint,
        })
    }

    /// Decrypt a client's stored secret for re-issuance. Never used on the
    /// authentication path.
    pub fn reissue_secret(&self, username: &str) -> GateResult<String> {
        let encrypted: Option<String> = self.db.with(|conn| {
            conn.query_row(
                "SELECT encrypted_secret FROM clients WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()
        })?;
        let Some(encrypted) = encrypted else {
            return Err(GateError::NotFound(format!("client '{username}' not found")));
        };
        self.master_key
            .decrypt_str(&encrypted)
            .map_err(|e| GateError::Encryption(format!("cannot decrypt client secret: {e}")))
    }

    /// Fingerprints for the audit endpoint; secrets never leave the store.
    pub fn list_fingerprints(&self) -> GateResult<Vec<FingerprintEntry>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, fingerprint, tenant_code, created_at, last_used_at
                 FROM clients ORDER BY username",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(FingerprintEntry {
                    username: row.get(0)?,
                    fingerprint: row.get(1)?,
                    tenant_code: row.get(2)?,
                    created_at: row.get(3)?,
                    last_used_at: row.get(4)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Record (or replace) the identity of a provisioned vector-DB user so
    /// its password can be re-issued and reset later.
    pub fn store_db_user(&self, username: &str, secret: &str, tenant: &str) -> GateResult<()> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt_hex = hex(&salt);
        let stored_hash = format!("{salt_hex}${}", hash_secret(secret, &salt_hex));
        let fingerprint = fingerprint_of(username, &stored_hash);
        let encrypted_secret = self.master_key.encrypt_str(secret);
        self.db.with(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO clients(username, hashed_secret, encrypted_secret, fingerprint, tenant_code, actions)
                 VALUES(?1, ?2, ?3, ?4, ?5, '[\"vectordb\"]')",
                params![username, stored_hash, encrypted_secret, fingerprint, tenant],
            )
        })?;
        Ok(())
    }

    /// Remove a client record. Missing rows are ignored (rollback path).
    pub fn delete_client(&self, username: &str) -> GateResult<()> {
        self.db.with(|conn| {
            conn.execute("DELETE FROM clients WHERE username = ?1", params![username])
        })?;
        Ok(())
    }

    /// Replace a client's secret, returning the previous credential columns
    /// so the caller can restore them on rollback.
    pub fn update_secret(&self, username: &str, secret: &str) -> GateResult<SecretSnapshot> {
        let previous = self.db.with(|conn| {
            conn.query_row(
                "SELECT hashed_secret, encrypted_secret FROM clients WHERE username = ?1",
                params![username],
                |row| {
                    Ok(SecretSnapshot {
                        hashed_secret: row.get(0)?,
                        encrypted_secret: row.get(1)?,
                    })
                },
            )
            .optional()
        })?;
        let Some(previous) = previous else {
            return Err(GateError::NotFound(format!("client '{username}' not found")));
        };

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt_hex = hex(&salt);
        let stored_hash = format!("{salt_hex}${}", hash_secret(secret, &salt_hex));
        let fingerprint = fingerprint_of(username, &stored_hash);
        let encrypted_secret = self.master_key.encrypt_str(secret);
        self.db.with(|conn| {
            conn.execute(
                "UPDATE clients SET hashed_secret = ?2, encrypted_secret = ?3, fingerprint = ?4 WHERE username = ?1",
                params![username, stored_hash, encrypted_secret, fingerprint],
            )
        })?;
        Ok(previous)
    }

    /// Restore the credential columns captured by [`Self::update_secret`].
    pub fn restore_secret(&self, username: &str, snapshot: &SecretSnapshot) -> GateResult<()> {
        let fingerprint = fingerprint_of(username, &snapshot.hashed_secret);
        self.db.with(|conn| {
            conn.execute(
                "UPDATE clients SET hashed_secret = ?2, encrypted_secret = ?3, fingerprint = ?4 WHERE username = ?1",
                params![username, snapshot.hashed_secret, snapshot.encrypted_secret, fingerprint],
            )
        })?;
        Ok(())
    }

    fn touch(&self, username: &str) {
        let result = self.db.with(|conn| {
            conn.execute(
                "UPDATE clients SET last_used_at = datetime('now') WHERE username = ?1",
                params![username],
            )
        });
        if let Err(e) = result {
            tracing::warn!("failed to update last_used_at: {e}");
        }
    }

    fn has_admin(&self) -> GateResult<bool> {
        let count: i64 = self.db.with(|conn| {
            conn.query_row(
                "SELECT count(*) FROM clients WHERE actions LIKE '%\"admin\"%'",
                [],
                |row| row.get(0),
            )
        })?;
        Ok(count > 0)
    }

    /// Ensure a bootstrap admin exists. When one is created, its credentials
    /// are written exactly once to `admin_credentials.txt` in the secrets
    /// directory.
    pub fn ensure_admin(&self, secrets_dir: &Path) -> GateResult<()> {
        if self.has_admin()? {
            return Ok(());
        }

        // The secret must survive `user:secret` and `user|secret` headers.
        let secret: String = loop {
            let candidate: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(BOOTSTRAP_SECRET_LEN)
                .map(char::from)
                .collect();
            if !candidate.contains(':') && !candidate.contains('|') {
                break candidate;
            }
        };

        self.create_client(
            BOOTSTRAP_ADMIN_USERNAME,
            &secret,
            "",
            &[ACTION_ADMIN, ACTION_DATA],
        )?;

        std::fs::create_dir_all(secrets_dir).map_err(|e| {
            GateError::Configuration(format!(
                "cannot create secrets dir {}: {e}",
                secrets_dir.display()
            ))
        })?;
        let creds_path = secrets_dir.join("admin_credentials.txt");
        let contents = format!(
            "vectorgate admin credentials\n\nusername: {BOOTSTRAP_ADMIN_USERNAME}\nsecret: {secret}\n\nAuthorization: Bearer {BOOTSTRAP_ADMIN_USERNAME}:{secret}\n"
        );
        std::fs::write(&creds_path, contents).map_err(|e| {
            GateError::Configuration(format!(
                "cannot write admin credentials to {}: {e}",
                creds_path.display()
            ))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&creds_path, std::fs::Permissions::from_mode(0o600));
        }
        tracing::warn!(
            "bootstrap admin created; credentials written to {}",
            creds_path.display()
        );
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hash_secret(secret: &str, salt_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(salt_hex.as_bytes());
    hex(&hasher.finalize())
}

/// Constant-time verification against a `salt$digest` stored hash.
fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    let Some((salt_hex, digest)) = stored_hash.split_once('$') else {
        return false;
    };
    let computed = hash_secret(presented, salt_hex);
    computed.as_bytes().ct_eq(digest.as_bytes()).into()
}

/// Stable audit fingerprint derived from `(username, hashed_secret)`.
fn fingerprint_of(username: &str, stored_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(stored_hash.as_bytes());
    hex(&hasher.finalize())[..FINGERPRINT_LEN].to_string()
}
