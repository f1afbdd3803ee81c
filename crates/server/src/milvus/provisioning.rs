//! Tenant lifecycle: database, role, user and grants.
//!
//! `set_vector_store` walks the provisioning state machine (database → role
//! → user → grant) idempotently, with every creating step registered in a
//! transaction so a later failure unwinds the tenant to its prior state.
//! Generated passwords conform to the password policy and are returned
//! exactly once; an encrypted copy is kept in the key manager so the
//! password can be rotated later without engine cooperation.

use crate::key_manager::KeyManager;
use crate::milvus::vector_store::DbCredentials;
use crate::pool::{ConnectionPool, PooledClient};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use vectorgate_core::config;
use vectorgate_core::sanitize::sanitize_for_log;
use vectorgate_core::txn::{noop_rollback, op, Transaction};
use vectorgate_core::{GateError, GateResult};

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+.?";

#[derive(Debug, Serialize)]
pub struct ProvisionSummary {
    pub database_created: bool,
    pub user_created: bool,
    pub permissions_granted: bool,
    pub username: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordSummary {
    pub username: String,
    pub new_password: String,
}

pub struct ProvisioningCore {
    pool: Arc<ConnectionPool>,
    uri: String,
    keys: Arc<KeyManager>,
}

impl ProvisioningCore {
    pub fn new(pool: Arc<ConnectionPool>, uri: String, keys: Arc<KeyManager>) -> Self {
        Self { pool, uri, keys }
    }

    async fn admin_client(&self, creds: &DbCredentials) -> GateResult<Arc<PooledClient>> {
        let client = self
            .pool
            .acquire(&self.uri, &creds.user, &creds.secret, "default")
            .await?;
        Ok(Arc::new(client))
    }

    /// Ensure database, role, user and role grant exist for the tenant.
    /// Safe to call repeatedly: the second call reports nothing created and
    /// preserves the username.
    pub async fn set_vector_store(
        &self,
        tenant: &str,
        creds: &DbCredentials,
    ) -> GateResult<ProvisionSummary> {
        let db_name = config::db_name_for_tenant(tenant);
        let role = config::role_name_for_tenant(tenant);
        let username = config::user_name_for_tenant(tenant);
        let client = self.admin_client(creds).await?;

        let db_exists = client.list_databases().await?.contains(&db_name);
        let role_exists = client.list_roles().await?.contains(&role);
        let user_exists = client.list_users().await?.contains(&username);

        let password = if user_exists {
            None
        } else {
            Some(generate_password())
        };

        let mut txn = Transaction::begin(format!("set_vector_store:{tenant}"));

        if !db_exists {
            let create_client = client.clone();
            let rollback_client = client.clone();
            let name = db_name.clone();
            let rollback_name = db_name.clone();
            txn.add(
                "create_database",
                move || {
                    op(async move {
                        create_client.create_database(&name).await?;
                        Ok(Value::Null)
                    })
                },
                move |_| op(async move { rollback_client.drop_database(&rollback_name).await }),
            );
        }

        if !role_exists {
            let create_client = client.clone();
            let rollback_client = client.clone();
            let name = role.clone();
            let rollback_name = role.clone();
            txn.add(
                "create_role",
                move || {
                    op(async move {
                        create_client.create_role(&name).await?;
                        Ok(Value::Null)
                    })
                },
                move |_| op(async move { rollback_client.drop_role(&rollback_name).await }),
            );
        }

        if let Some(ref password) = password {
            let create_client = client.clone();
            let rollback_client = client.clone();
            let name = username.clone();
            let rollback_name = username.clone();
            let password = password.clone();
            let keys = self.keys.clone();
            let rollback_keys = self.keys.clone();
            let tenant_owned = tenant.to_string();
            txn.add(
                "create_user",
                move || {
                    op(async move {
                        create_client.create_user(&name, &password).await?;
                        keys.store_db_user(&name, &password, &tenant_owned)?;
                        Ok(json!({ "username": name }))
                    })
                },
                move |_| {
                    op(async move {
                        rollback_client.drop_user(&rollback_name).await?;
                        rollback_keys.delete_client(&rollback_name)
                    })
                },
            );
        }

        {
            // Grants are idempotent and carry revoke rollbacks.
            let grant_client = client.clone();
            let revoke_client = client.clone();
            let user = username.clone();
            let revoke_user = username.clone();
            let grant_role = role.clone();
            let revoke_role = role.clone();
            txn.add(
                "grant_role",
                move || {
                    op(async move {
                        grant_client.grant_role(&user, &grant_role).await?;
                        Ok(Value::Null)
                    })
                },
                move |_| {
                    op(async move { revoke_client.revoke_role(&revoke_user, &revoke_role).await })
                },
            );
        }

        txn.execute().await?;

        tracing::info!(
            tenant = %sanitize_for_log(tenant),
            database_created = !db_exists,
            user_created = password.is_some(),
            "tenant vector store provisioned"
        );
        Ok(ProvisionSummary {
            database_created: !db_exists,
            user_created: password.is_some(),
            permissions_granted: true,
            username,
            role,
            password,
        })
    }

    /// Rotate the tenant user's password. The previous credential snapshot
    /// taken at entry is restored if the engine-side update fails later, and
    /// the new password is returned exactly once.
    pub async fn reset_password(
        &self,
        tenant: &str,
        creds: &DbCredentials,
    ) -> GateResult<ResetPasswordSummary> {
        let username = config::user_name_for_tenant(tenant);
        let old_password = self.keys.reissue_secret(&username).map_err(|e| match e {
            GateError::NotFound(_) => GateError::Tenant(format!(
                "no provisioned user for tenant '{}'",
                sanitize_for_log(tenant)
            )),
            other => other,
        })?;

        let new_password = generate_password();
        if let Some(violation) = password_policy_violations(&new_password).first() {
            // Generator always satisfies the policy; a violation here is a bug.
            return Err(GateError::Internal(format!(
                "generated password violates policy: {violation}"
            )));
        }

        let client = self.admin_client(creds).await?;
        let mut txn = Transaction::begin(format!("reset_password:{tenant}"));

        {
            let update_client = client.clone();
            let rollback_client = client.clone();
            let user = username.clone();
            let rollback_user = username.clone();
            let old = old_password.clone();
            let rollback_old = old_password.clone();
            let new = new_password.clone();
            let rollback_new = new_password.clone();
            txn.add(
                "engine_update_password",
                move || {
                    op(async move {
                        update_client.update_password(&user, &old, &new).await?;
                        Ok(Value::Null)
                    })
                },
                move |_| {
                    op(async move {
                        rollback_client
                            .update_password(&rollback_user, &rollback_new, &rollback_old)
                            .await
                    })
                },
            );
        }
        {
            let keys = self.keys.clone();
            let rollback_keys = self.keys.clone();
            let user = username.clone();
            let rollback_user = username.clone();
            let new = new_password.clone();
            txn.add(
                "record_new_secret",
                move || {
                    op(async move {
                        let snapshot = keys.update_secret(&user, &new)?;
                        Ok(json!({
                            "hashed_secret": snapshot.hashed_secret,
                            "encrypted_secret": snapshot.encrypted_secret,
                        }))
                    })
                },
                move |snapshot| {
                    op(async move {
                        let restored = crate::key_manager::SecretSnapshot {
                            hashed_secret: snapshot["hashed_secret"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                            encrypted_secret: snapshot["encrypted_secret"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                        };
                        rollback_keys.restore_secret(&rollback_user, &restored)
                    })
                },
            );
        }
        // Final audit marker keeps the rotation visible even with debug logs off.
        {
            let tenant_owned = tenant.to_string();
            txn.add(
                "audit",
                move || {
                    op(async move {
                        tracing::info!(
                            target: "audit",
                            tenant = %sanitize_for_log(&tenant_owned),
                            action = "reset_password",
                            outcome = "success",
                            "audit"
                        );
                        Ok(Value::Null)
                    })
                },
                noop_rollback,
            );
        }

        txn.execute().await?;
        Ok(ResetPasswordSummary {
            username,
            new_password,
        })
    }
}

/// Generate a password satisfying the policy: at least 12 characters with
/// upper case, lower case, digit and symbol.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let mut chars: Vec<u8> = vec![
        *UPPER.choose(&mut rng).expect("non-empty charset"),
        *LOWER.choose(&mut rng).expect("non-empty charset"),
        *DIGITS.choose(&mut rng).expect("non-empty charset"),
        *SYMBOLS.choose(&mut rng).expect("non-empty charset"),
    ];
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();
    while chars.len() < config::PASSWORD_MIN_LEN + 4 {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);
    String::from_utf8(chars).expect("ascii charsets")
}

/// Returns the unmet password policy requirements, empty when compliant.
pub fn password_policy_violations(password: &str) -> Vec<&'static str> {
    let mut violations = Vec::new();
    if password.len() < config::PASSWORD_MIN_LEN {
        violations.push("at least 12 characters");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        violations.push("one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        violations.push("one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("one digit");
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        violations.push("one symbol");
    }
    violations
}
