//! vectorgate-server — multi-tenant HTTP gateway in front of a
//! Milvus-compatible vector database.
//!
//! Provisions per-tenant databases, users and roles; generates per-model
//! collection schemas; ingests dense + sparse embeddings transactionally;
//! serves dense, BM25 and hybrid (RRF) search with tenant-isolated
//! credentials and policies. Domain logic lives in `vectorgate-core`.

/// HTTP surface: routes, middleware, handlers, DTOs, rate limiting.
pub mod api;
/// Tenant-scoped config KV with write-invalidated cache.
pub mod config_store;
/// Health and readiness endpoints.
pub mod health;
/// Client identity records and secret verification.
pub mod key_manager;
/// Vector engine contract, REST client, in-memory backend, tenant cores.
pub mod milvus;
/// Keyed, reference-counted vector-DB client pool.
pub mod pool;
/// Runtime settings from CLI arguments and environment.
pub mod settings;
/// Startup configuration validation.
pub mod startup;
/// Embedded SQLite state (clients + config KV).
pub mod store;
