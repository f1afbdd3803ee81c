use clap::Parser;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vectorgate_core::crypto::MasterKey;
use vectorgate_server::api::create_router;
use vectorgate_server::api::handlers::AppState;
use vectorgate_server::api::rate_limit::RateLimiters;
use vectorgate_server::config_store::ConfigStore;
use vectorgate_server::key_manager::KeyManager;
use vectorgate_server::milvus::memory::{MemoryBackendFactory, MemoryEngine};
use vectorgate_server::milvus::provisioning::ProvisioningCore;
use vectorgate_server::milvus::vector_store::VectorStoreCore;
use vectorgate_server::pool::ConnectionPool;
use vectorgate_server::settings::{Args, Settings};
use vectorgate_server::startup::validate_settings;

const ADMIN_TOKEN: &str = "admin:admin-secret-123";
const USER_TOKEN: &str = "demo-user:user-secret-456";
const ROOT_DB_TOKEN: &str = "root:rootpw";
const MASTER_KEY_HEX: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

struct TestApp {
    base_url: String,
    engine: Arc<MemoryEngine>,
}

async fn spawn_app() -> TestApp {
    spawn_app_with(&[]).await
}

async fn spawn_app_with(extra_args: &[&str]) -> TestApp {
    let mut argv = vec![
        "vectorgate",
        "--vectordb-endpoint",
        "memory",
        "--vectordb-username",
        "root",
        "--vectordb-password",
        "rootpw",
    ];
    argv.extend_from_slice(extra_args);
    let settings = Arc::new(Settings::from_args(Args::parse_from(argv)).expect("valid settings"));

    let master_key = Arc::new(MasterKey::from_hex(MASTER_KEY_HEX).unwrap());
    let db = vectorgate_server::store::StateDb::open_in_memory().unwrap();
    let config = Arc::new(ConfigStore::new(db.clone(), master_key.clone()));
    let keys = Arc::new(KeyManager::new(db, master_key));
    keys.create_client("admin", "admin-secret-123", "", &["admin", "data"])
        .unwrap();
    keys.create_client("demo-user", "user-secret-456", "demo", &["data"])
        .unwrap();

    let engine = MemoryEngine::new("root", "rootpw");
    let pool = ConnectionPool::new(
        Arc::new(MemoryBackendFactory::new(engine.clone())),
        settings.pool_max_entries,
        Duration::from_secs(settings.pool_max_idle_secs),
        0,
    );
    let vectors = Arc::new(VectorStoreCore::new(
        pool.clone(),
        settings.vectordb_uri.clone(),
        settings.auto_flush_min_batch,
    ));
    let provisioning = Arc::new(ProvisioningCore::new(
        pool.clone(),
        settings.vectordb_uri.clone(),
        keys.clone(),
    ));
    let limiters = Arc::new(RateLimiters::new(
        settings.ip_rate_limit,
        settings.tenant_rate_limit,
        settings.premium_rate_limit,
    ));

    let prometheus_handle =
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(_) => metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        };

    let startup_errors = validate_settings(&settings);
    let state = AppState {
        settings,
        config,
        keys,
        pool,
        vectors,
        provisioning,
        limiters,
        prometheus_handle,
        start_time: Instant::now(),
        startup_errors: Arc::new(startup_errors),
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", addr),
        engine,
    }
}

fn client() -> Client {
    Client::new()
}

async fn provision_tenant(app: &TestApp, tenant: &str) -> (String, String) {
    let resp = client()
        .post(format!("{}/api/v1/vector_store/set_vector_store", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Tenant-Code", tenant)
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let text = resp.text().await.unwrap();
    assert_eq!(status, 200, "{text}");
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    let results = &body["results"];
    (
        results["username"].as_str().unwrap().to_string(),
        results["password"].as_str().unwrap().to_string(),
    )
}

async fn generate_schema(app: &TestApp, tenant: &str, model: &str, dimension: usize) -> reqwest::Response {
    client()
        .post(format!("{}/api/v1/vector_store/generate_schema", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Tenant-Code", tenant)
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({
            "model_name": model,
            "dimension": dimension,
            "metric_type": "COSINE",
        }))
        .send()
        .await
        .unwrap()
}

async fn insert_vectors(
    app: &TestApp,
    tenant: &str,
    db_token: &str,
    data: serde_json::Value,
) -> reqwest::Response {
    client()
        .post(format!("{}/api/v1/vector_store/insert", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", tenant)
        .header("Flouds-VectorDB-Token", db_token)
        .json(&serde_json::json!({
            "model_name": "m1",
            "data": data,
        }))
        .send()
        .await
        .unwrap()
}

// ========== Health ==========

#[tokio::test]
async fn health_live_and_ready() {
    let app = spawn_app().await;

    let resp = client()
        .get(format!("{}/health/live", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client()
        .get(format!("{}/health/ready", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client()
        .get(format!("{}/health", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["milvus"]["connected"], true);
    assert_eq!(body["configuration"]["valid"], true);
}

#[tokio::test]
async fn health_connections_requires_admin() {
    let app = spawn_app().await;

    let resp = client()
        .get(format!("{}/health/connections", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client()
        .get(format!("{}/health/connections", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["max_entries"].as_u64().unwrap() > 0);
}

// ========== Auth ==========

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = spawn_app().await;
    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .json(&serde_json::json!({"model": "m1", "vector": [0.1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "authentication_error");
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
    let app = spawn_app().await;
    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth("admin:not-the-secret")
        .json(&serde_json::json!({"model": "m1", "vector": [0.1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn non_admin_cannot_reach_admin_routes() {
    let app = spawn_app().await;
    let resp = client()
        .post(format!("{}/api/v1/vector_store/set_vector_store", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "authorization_error");
}

#[tokio::test]
async fn tenant_mismatch_is_rejected() {
    let app = spawn_app().await;
    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "other-tenant")
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({"model": "m1", "vector": [0.1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "tenant_error");
}

#[tokio::test]
async fn invalid_tenant_code_is_rejected() {
    let app = spawn_app().await;
    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Tenant-Code", "bad tenant!")
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({"model": "m1", "vector": [0.1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "validation_error");
}

// ========== Provision → insert → search ==========

#[tokio::test]
async fn provision_insert_search_end_to_end() {
    let app = spawn_app().await;

    let (username, password) = provision_tenant(&app, "demo").await;
    assert_eq!(username, "demo_user");
    let db_token = format!("{username}:{password}");

    let resp = generate_schema(&app, "demo", "m1", 4).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["created"], true);
    assert_eq!(
        body["results"]["collection_name"],
        "vector_store_schema_for_demo_m1"
    );

    let resp = insert_vectors(
        &app,
        "demo",
        &db_token,
        serde_json::json!([
            {"key": "a", "chunk": "hello world", "vector": [1.0, 0.0, 0.0, 0.0]},
            {"key": "b", "chunk": "goodbye", "vector": [0.0, 1.0, 0.0, 0.0]},
        ]),
    )
    .await;
    let status = resp.status();
    let text = resp.text().await.unwrap();
    assert_eq!(status, 200, "{text}");
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["results"]["inserted"], 2);
    assert_eq!(body["results"]["flushed"], false);
    assert_eq!(app.engine.flushes(), 0);

    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", &db_token)
        .json(&serde_json::json!({
            "model": "m1",
            "vector": [1.0, 0.0, 0.0, 0.0],
            "limit": 2,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let results = body["results"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], "a");
    assert!(results[0]["score"].as_f64().unwrap() >= results[1]["score"].as_f64().unwrap());
    assert_eq!(body["results"]["total_count"], 2);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn set_vector_store_is_idempotent() {
    let app = spawn_app().await;
    let (first_username, _) = provision_tenant(&app, "demo").await;

    let resp = client()
        .post(format!("{}/api/v1/vector_store/set_vector_store", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["database_created"], false);
    assert_eq!(body["results"]["user_created"], false);
    assert_eq!(body["results"]["username"], first_username.as_str());
    assert!(body["results"]["password"].is_null());
}

#[tokio::test]
async fn generate_schema_twice_is_a_noop() {
    let app = spawn_app().await;
    provision_tenant(&app, "demo").await;

    let resp = generate_schema(&app, "demo", "m1", 4).await;
    assert_eq!(resp.status(), 200);
    let resp = generate_schema(&app, "demo", "m1", 4).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["created"], false);
    assert_eq!(body["results"]["index_created"], false);
}

#[tokio::test]
async fn generate_schema_dimension_conflict_is_409() {
    let app = spawn_app().await;
    provision_tenant(&app, "demo").await;

    assert_eq!(generate_schema(&app, "demo", "m1", 4).await.status(), 200);
    let resp = generate_schema(&app, "demo", "m1", 8).await;
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "schema_conflict");
}

#[tokio::test]
async fn dimension_bounds_are_enforced() {
    let app = spawn_app().await;
    provision_tenant(&app, "demo").await;

    for bad in [0usize, 4097] {
        let resp = generate_schema(&app, "demo", "m-bad", bad).await;
        assert_eq!(resp.status(), 400, "dimension {bad}");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["type"], "validation_error");
    }
    assert_eq!(generate_schema(&app, "demo", "m-one", 1).await.status(), 200);
    assert_eq!(
        generate_schema(&app, "demo", "m-max", 4096).await.status(),
        200
    );
}

#[tokio::test]
async fn upsert_same_key_returns_latest_chunk() {
    let app = spawn_app().await;
    let (username, password) = provision_tenant(&app, "demo").await;
    let db_token = format!("{username}:{password}");
    generate_schema(&app, "demo", "m1", 2).await;

    for chunk in ["first version", "second version"] {
        let resp = insert_vectors(
            &app,
            "demo",
            &db_token,
            serde_json::json!([{"key": "doc", "chunk": chunk, "vector": [1.0, 0.0]}]),
        )
        .await;
        assert_eq!(resp.status(), 200);
    }

    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", &db_token)
        .json(&serde_json::json!({"model": "m1", "vector": [1.0, 0.0], "limit": 1}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["results"][0]["chunk"], "second version");
}

// ========== Hybrid search ==========

#[tokio::test]
async fn hybrid_rrf_ranks_sparse_match_first() {
    let app = spawn_app().await;
    let (username, password) = provision_tenant(&app, "demo").await;
    let db_token = format!("{username}:{password}");
    generate_schema(&app, "demo", "m1", 4).await;
    insert_vectors(
        &app,
        "demo",
        &db_token,
        serde_json::json!([
            {"key": "a", "chunk": "hello world", "vector": [1.0, 0.0, 0.0, 0.0]},
            {"key": "b", "chunk": "goodbye", "vector": [0.0, 1.0, 0.0, 0.0]},
        ]),
    )
    .await;

    // Dense order is [a, b]; "goodbye" matches only b, so RRF puts b first:
    // b = 1/61 + 1/62 ≈ 0.0325 beats a = 1/61 ≈ 0.0164.
    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", &db_token)
        .json(&serde_json::json!({
            "model": "m1",
            "vector": [0.9, 0.1, 0.0, 0.0],
            "limit": 2,
            "hybrid_search": true,
            "text_filter": "goodbye",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let results = body["results"]["results"].as_array().unwrap();
    assert_eq!(results[0]["id"], "b");
    assert_eq!(results[1]["id"], "a");
    let b_score = results[0]["score"].as_f64().unwrap();
    assert!((b_score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
}

#[tokio::test]
async fn hybrid_with_only_stop_words_falls_back_to_dense() {
    let app = spawn_app().await;
    let (username, password) = provision_tenant(&app, "demo").await;
    let db_token = format!("{username}:{password}");
    generate_schema(&app, "demo", "m1", 4).await;
    insert_vectors(
        &app,
        "demo",
        &db_token,
        serde_json::json!([
            {"key": "a", "chunk": "hello world", "vector": [1.0, 0.0, 0.0, 0.0]},
            {"key": "b", "chunk": "goodbye", "vector": [0.0, 1.0, 0.0, 0.0]},
        ]),
    )
    .await;

    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", &db_token)
        .json(&serde_json::json!({
            "model": "m1",
            "vector": [1.0, 0.0, 0.0, 0.0],
            "limit": 2,
            "hybrid_search": true,
            "text_filter": "the of and",
            "minimum_words_match": 1,
        }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    let results = body["results"]["results"].as_array().unwrap();
    // Dense ordering with raw dense scores.
    assert_eq!(results[0]["id"], "a");
    assert!(results[0]["score"].as_f64().unwrap() > 0.9);
}

// ========== Users ==========

#[tokio::test]
async fn reset_password_returns_fresh_credential() {
    let app = spawn_app().await;
    let (username, old_password) = provision_tenant(&app, "demo").await;

    let resp = client()
        .post(format!(
            "{}/api/v1/vector_store_users/reset_password",
            app.base_url
        ))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let new_password = body["results"]["new_password"].as_str().unwrap();
    assert_ne!(new_password, old_password);

    // The old credential no longer opens a pooled client; the new one does.
    let db_token = format!("{username}:{new_password}");
    generate_schema(&app, "demo", "m1", 2).await;
    let resp = insert_vectors(
        &app,
        "demo",
        &db_token,
        serde_json::json!([{"key": "k", "chunk": "fresh secret works", "vector": [1.0, 0.0]}]),
    )
    .await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn set_user_returns_existing_username_with_reissued_password() {
    let app = spawn_app().await;
    let (username, password) = provision_tenant(&app, "demo").await;

    let resp = client()
        .post(format!("{}/api/v1/vector_store_users/set_user", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", ROOT_DB_TOKEN)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["username"], username.as_str());
    assert_eq!(body["results"]["password"], password.as_str());
    assert_eq!(body["results"]["role"], "flouds_demo_role");
}

// ========== Config ==========

#[tokio::test]
async fn config_crud_and_encrypted_sentinel() {
    let app = spawn_app().await;

    let resp = client()
        .post(format!("{}/api/v1/config/add", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({
            "key": "webhook_secret",
            "value": "super-secret-value",
            "encrypted": true,
            "tenant_code": "t1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Conflict on duplicate add.
    let resp = client()
        .post(format!("{}/api/v1/config/add", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({
            "key": "webhook_secret",
            "value": "other",
            "tenant_code": "t1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Ciphertext never leaves the API.
    let resp = client()
        .get(format!(
            "{}/api/v1/config/get?key=webhook_secret&tenant_code=t1",
            app.base_url
        ))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["value"], "<encrypted>");
    assert_eq!(body["results"]["encrypted"], true);

    let resp = client()
        .delete(format!(
            "{}/api/v1/config/delete?key=webhook_secret&tenant_code=t1",
            app.base_url
        ))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client()
        .get(format!(
            "{}/api/v1/config/get?key=webhook_secret&tenant_code=t1",
            app.base_url
        ))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn cors_policy_updates_take_effect_immediately() {
    let app = spawn_app_with(&["--cors-origins", "https://allowed.example"]).await;

    // Not yet allowed for tenant t1.
    let resp = client()
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/api/v1/vector_store/search", app.base_url),
        )
        .header("Origin", "https://newly-allowed.example")
        .header("X-Tenant-Code", "t1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Write the tenant policy; the very next preflight must pass (the cache
    // is invalidated synchronously on write).
    let resp = client()
        .post(format!("{}/api/v1/config/add", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({
            "key": "cors_origins",
            "value": "[\"https://newly-allowed.example\"]",
            "tenant_code": "t1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "{}", resp.text().await.unwrap());

    let resp = client()
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/api/v1/vector_store/search", app.base_url),
        )
        .header("Origin", "https://newly-allowed.example")
        .header("X-Tenant-Code", "t1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "https://newly-allowed.example"
    );
}

#[tokio::test]
async fn untrusted_host_is_rejected() {
    let app = spawn_app_with(&["--trusted-hosts", "gateway.internal.example"]).await;
    let resp = client()
        .get(format!("{}/health/live", app.base_url))
        .send()
        .await
        .unwrap();
    // reqwest sends Host: 127.0.0.1, which is not in the trusted list.
    assert_eq!(resp.status(), 400);
}

// ========== Rate limiting ==========

#[tokio::test]
async fn ip_rate_limit_denial_shape() {
    let app = spawn_app_with(&["--ip-rate-limit", "5"]).await;

    for _ in 0..5 {
        let resp = client()
            .get(format!("{}/health/live", app.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let resp = client()
        .get(format!("{}/health/live", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "rate_limit_error");
    assert_eq!(body["limit_info"]["limit"], 5);
    assert_eq!(body["limit_info"]["limit_type"], "ip");
    let retry_after = body["limit_info"]["retry_after"].as_u64().unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn tenant_rate_limit_uses_configured_tier() {
    let app = spawn_app_with(&["--tenant-rate-limit", "3", "--premium-rate-limit", "6"]).await;
    provision_tenant(&app, "demo").await;

    // 1 provisioning call already consumed one slot for "demo".
    for _ in 0..2 {
        let resp = client()
            .get(format!("{}/health/live", app.base_url))
            .header("X-Tenant-Code", "demo")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let resp = client()
        .get(format!("{}/health/live", app.base_url))
        .header("X-Tenant-Code", "demo")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["limit_info"]["limit_type"], "tenant");
    assert_eq!(body["limit_info"]["tier"], "default");
    assert!(body["suggestion"].as_str().unwrap().contains("tier"));
}

// ========== Errors & sanitization ==========

#[tokio::test]
async fn insert_without_schema_is_an_operation_error() {
    let app = spawn_app().await;
    provision_tenant(&app, "demo").await;
    let resp = insert_vectors(
        &app,
        "demo",
        ROOT_DB_TOKEN,
        serde_json::json!([{"key": "a", "chunk": "x", "vector": [0.1]}]),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "operation_error");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("generate the schema first"));
}

#[tokio::test]
async fn bad_db_token_is_a_connection_error() {
    let app = spawn_app().await;
    provision_tenant(&app, "demo").await;
    let resp = insert_vectors(
        &app,
        "demo",
        "root:wrong-password",
        serde_json::json!([{"key": "a", "chunk": "x", "vector": [0.1]}]),
    )
    .await;
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "connection_error");
    assert!(!body["details"].as_str().unwrap().contains("wrong-password"));
}

#[tokio::test]
async fn missing_db_token_is_unauthorized() {
    let app = spawn_app().await;
    provision_tenant(&app, "demo").await;
    let resp = client()
        .post(format!("{}/api/v1/vector_store/insert", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .json(&serde_json::json!({
            "model_name": "m1",
            "data": [{"key": "a", "chunk": "x", "vector": [0.1]}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

// ========== Admin surface ==========

#[tokio::test]
async fn fingerprints_list_clients_without_secrets() {
    let app = spawn_app().await;
    let resp = client()
        .get(format!("{}/api/v1/admin/fingerprints", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let entries = body["results"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let text = body.to_string();
    assert!(!text.contains("admin-secret-123"));
    assert!(!text.contains("user-secret-456"));
}

#[tokio::test]
async fn prometheus_metrics_rendered_for_admin() {
    let app = spawn_app().await;
    client()
        .get(format!("{}/health/live", app.base_url))
        .send()
        .await
        .unwrap();

    let resp = client()
        .get(format!("{}/api/v1/metrics", app.base_url))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client()
        .get(format!("{}/api/v1/metrics", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn search_envelope_reports_timing_and_tenant() {
    let app = spawn_app().await;
    let (username, password) = provision_tenant(&app, "demo").await;
    let db_token = format!("{username}:{password}");
    generate_schema(&app, "demo", "m1", 2).await;
    insert_vectors(
        &app,
        "demo",
        &db_token,
        serde_json::json!([{"key": "a", "chunk": "hello", "vector": [1.0, 0.0]}]),
    )
    .await;

    let resp = client()
        .post(format!("{}/api/v1/vector_store/search", app.base_url))
        .bearer_auth(USER_TOKEN)
        .header("X-Tenant-Code", "demo")
        .header("Flouds-VectorDB-Token", &db_token)
        .json(&serde_json::json!({"model": "m1", "vector": [1.0, 0.0]}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["tenant_code"], "demo");
    assert!(body["timestamp"].as_str().unwrap().contains('T'));
    assert!(body["time_taken_ms"].as_u64().is_some());
}
