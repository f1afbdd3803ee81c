//! Compound transaction manager for multi-step provisioning and ingestion.
//!
//! A [`Transaction`] is a request-scoped ordered log of operations, each with
//! a forward closure and a rollback closure. `execute` runs forwards strictly
//! in order; on the first failure it runs the rollbacks of every previously
//! successful operation in reverse order, swallowing (but logging) rollback
//! errors, and returns the original cause. A transaction dropped without
//! `execute` is treated as cancelled and does nothing.
//!
//! Rollback closures receive the forward's captured result, so a
//! `create_user` forward can hand its generated username to the paired
//! `drop_user` rollback. Irreversible operations (flush) register a no-op
//! rollback; the manager does not pretend to undo them.

use crate::error::{GateError, GateResult};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Boxed future used by forward and rollback closures.
pub type OpFuture<T> = Pin<Box<dyn Future<Output = GateResult<T>> + Send>>;

type ForwardFn = Box<dyn FnOnce() -> OpFuture<Value> + Send>;
type RollbackFn = Box<dyn FnOnce(Value) -> OpFuture<()> + Send>;

struct Op {
    label: &'static str,
    forward: ForwardFn,
    rollback: Option<RollbackFn>,
}

/// Ordered operation log with reverse rollback on failure.
pub struct Transaction {
    name: String,
    ops: Vec<Op>,
}

impl Transaction {
    /// Begin a new, empty transaction. `name` is used only for logging.
    pub fn begin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    /// Queue an operation with a rollback.
    pub fn add<F, R>(&mut self, label: &'static str, forward: F, rollback: R)
    where
        F: FnOnce() -> OpFuture<Value> + Send + 'static,
        R: FnOnce(Value) -> OpFuture<()> + Send + 'static,
    {
        self.ops.push(Op {
            label,
            forward: Box::new(forward),
            rollback: Some(Box::new(rollback)),
        });
    }

    /// Queue an operation whose effect cannot be undone (e.g. flush).
    pub fn add_irreversible<F>(&mut self, label: &'static str, forward: F)
    where
        F: FnOnce() -> OpFuture<Value> + Send + 'static,
    {
        self.ops.push(Op {
            label,
            forward: Box::new(forward),
            rollback: None,
        });
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if no operations are queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run all forwards in order. On failure, roll back executed operations
    /// in reverse and return the original error.
    ///
    /// The rollback chain runs to completion inside this call; a caller that
    /// cancels mid-transaction cancels before the failing await resolves, at
    /// which point nothing after it has executed.
    pub async fn execute(self) -> GateResult<Vec<Value>> {
        let total = self.ops.len();
        let mut executed: Vec<(&'static str, RollbackFn, Value)> = Vec::with_capacity(total);
        let mut results = Vec::with_capacity(total);

        for (i, op) in self.ops.into_iter().enumerate() {
            tracing::debug!(
                txn = %self.name,
                step = i + 1,
                total,
                op = op.label,
                "executing transaction operation"
            );
            match (op.forward)().await {
                Ok(value) => {
                    results.push(value.clone());
                    if let Some(rollback) = op.rollback {
                        executed.push((op.label, rollback, value));
                    }
                }
                Err(cause) => {
                    tracing::error!(
                        txn = %self.name,
                        step = i + 1,
                        op = op.label,
                        "transaction failed, rolling back {} operation(s)",
                        executed.len()
                    );
                    Self::rollback_chain(&self.name, executed).await;
                    return Err(cause);
                }
            }
        }

        tracing::debug!(txn = %self.name, total, "transaction completed");
        Ok(results)
    }

    async fn rollback_chain(name: &str, executed: Vec<(&'static str, RollbackFn, Value)>) {
        for (label, rollback, value) in executed.into_iter().rev() {
            if let Err(e) = rollback(value).await {
                tracing::error!(txn = %name, op = label, "rollback failed: {e}");
            } else {
                tracing::debug!(txn = %name, op = label, "rolled back");
            }
        }
    }
}

/// Box an async block into an [`OpFuture`].
///
/// Shorthand for the `Box::pin(async move { ... })` dance at call sites.
pub fn op<T, F>(fut: F) -> OpFuture<T>
where
    F: Future<Output = GateResult<T>> + Send + 'static,
{
    Box::pin(fut)
}

/// A rollback that does nothing, for irreversible forwards paired via `add`.
pub fn noop_rollback(_: Value) -> OpFuture<()> {
    Box::pin(async { Ok(()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_execute_runs_ops_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut txn = Transaction::begin("ordered");
        for i in 0..3 {
            let log = log.clone();
            txn.add(
                "step",
                move || {
                    op(async move {
                        log.lock().unwrap().push(i);
                        Ok(json!(i))
                    })
                },
                noop_rollback,
            );
        }
        let results = txn.execute().await.unwrap();
        assert_eq!(results, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_in_reverse_order() {
        let rollbacks = Arc::new(Mutex::new(Vec::new()));
        let mut txn = Transaction::begin("rollback");

        for name in ["create_user", "create_role"] {
            let rollbacks = rollbacks.clone();
            txn.add(
                name,
                move || op(async move { Ok(json!(name)) }),
                move |value| {
                    op(async move {
                        rollbacks.lock().unwrap().push(value.as_str().unwrap().to_string());
                        Ok(())
                    })
                },
            );
        }
        txn.add(
            "grant_role",
            || op(async { Err(GateError::Operation("grant refused".into())) }),
            noop_rollback,
        );

        let err = txn.execute().await.unwrap_err();
        assert_eq!(err.kind(), "operation_error");
        assert_eq!(
            *rollbacks.lock().unwrap(),
            vec!["create_role".to_string(), "create_user".to_string()]
        );
    }

    #[tokio::test]
    async fn test_ops_after_failure_never_execute() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut txn = Transaction::begin("short_circuit");
        txn.add(
            "fails",
            || op(async { Err(GateError::Connection("down".into())) }),
            noop_rollback,
        );
        let ran2 = ran.clone();
        txn.add(
            "never",
            move || {
                op(async move {
                    ran2.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                })
            },
            noop_rollback,
        );
        assert!(txn.execute().await.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rollback_errors_are_swallowed() {
        let mut txn = Transaction::begin("bad_rollback");
        txn.add(
            "ok_step",
            || op(async { Ok(Value::Null) }),
            |_| op(async { Err(GateError::Internal("rollback broke".into())) }),
        );
        txn.add(
            "boom",
            || op(async { Err(GateError::Operation("boom".into())) }),
            noop_rollback,
        );
        // The original cause must survive, not the rollback failure.
        let err = txn.execute().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_rollback_receives_forward_result() {
        let captured = Arc::new(Mutex::new(Value::Null));
        let mut txn = Transaction::begin("capture");
        let captured2 = captured.clone();
        txn.add(
            "make_user",
            || op(async { Ok(json!({"username": "demo_user"})) }),
            move |value| {
                op(async move {
                    *captured2.lock().unwrap() = value;
                    Ok(())
                })
            },
        );
        txn.add(
            "fail",
            || op(async { Err(GateError::Operation("nope".into())) }),
            noop_rollback,
        );
        txn.execute().await.unwrap_err();
        assert_eq!(captured.lock().unwrap()["username"], "demo_user");
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_a_noop() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let mut txn = Transaction::begin("cancelled");
        txn.add(
            "queued",
            move || {
                op(async move {
                    ran2.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                })
            },
            noop_rollback,
        );
        drop(txn);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
