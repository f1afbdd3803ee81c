use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use vectorgate_core::config;
use vectorgate_core::crypto::MasterKey;
use vectorgate_server::api::create_router;
use vectorgate_server::api::handlers::AppState;
use vectorgate_server::api::metrics;
use vectorgate_server::api::rate_limit::RateLimiters;
use vectorgate_server::config_store::ConfigStore;
use vectorgate_server::key_manager::KeyManager;
use vectorgate_server::milvus::backend::BackendFactory;
use vectorgate_server::milvus::client::MilvusRestFactory;
use vectorgate_server::milvus::memory::{MemoryBackendFactory, MemoryEngine};
use vectorgate_server::milvus::provisioning::ProvisioningCore;
use vectorgate_server::milvus::vector_store::VectorStoreCore;
use vectorgate_server::pool::ConnectionPool;
use vectorgate_server::settings::{Args, Settings};
use vectorgate_server::startup::validate_settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "vectorgate_server=info"
                    .parse()
                    .expect("valid directive literal"),
            ),
        )
        .init();

    let args = Args::parse();
    let settings = match Settings::from_args(args) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let startup_errors = validate_settings(&settings);
    for error in &startup_errors {
        tracing::error!("configuration: {error}");
    }

    // Build order matters: ConfigStore → KeyManager → ConnectionPool; later
    // layers hold immutable handles.
    let master_key = Arc::new(MasterKey::load_or_generate(&settings.master_key_path())?);
    let db = vectorgate_server::store::StateDb::open(&settings.clients_db_path)?;
    let config_store = Arc::new(ConfigStore::new(db.clone(), master_key.clone()));
    let keys = Arc::new(KeyManager::new(db, master_key));
    keys.ensure_admin(&settings.secrets_dir)?;

    let factory: Arc<dyn BackendFactory> = if settings.memory_backend {
        tracing::warn!("running with the embedded in-memory vector backend");
        Arc::new(MemoryBackendFactory::new(MemoryEngine::new(
            &settings.vectordb_username,
            &settings.vectordb_password,
        )))
    } else {
        Arc::new(MilvusRestFactory)
    };
    let pool = ConnectionPool::new(
        factory,
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
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // Probe the engine so operators see connectivity at startup.
    match pool
        .acquire(
            &settings.vectordb_uri,
            &settings.vectordb_username,
            &settings.vectordb_password,
            "default",
        )
        .await
    {
        Ok(_) => tracing::info!("vector DB reachable at {}", settings.vectordb_uri),
        Err(e) => tracing::warn!("vector DB not reachable at startup: {e}"),
    }

    let state = AppState {
        settings: settings.clone(),
        config: config_store,
        keys,
        pool: pool.clone(),
        vectors,
        provisioning,
        limiters: limiters.clone(),
        prometheus_handle,
        start_time: Instant::now(),
        startup_errors: Arc::new(startup_errors),
    };

    let app = create_router(state);
    let addr = format!("{}:{}", settings.host, settings.port);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        vectordb = %settings.vectordb_uri,
        pool_max_entries = settings.pool_max_entries,
        security_disabled = settings.security_disabled,
        "vectorgate ready"
    );

    // Single background worker: pool idle eviction, tenant bucket cleanup,
    // pool gauges.
    let sweep_pool = pool.clone();
    let sweep_limiters = limiters.clone();
    let sweep_interval = settings.sweep_interval_secs;
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            sweep_pool.sweep();
            let evicted = sweep_limiters.tenant.cleanup_inactive(Duration::from_secs(
                config::TENANT_BUCKET_MAX_INACTIVE_SECS,
            ));
            if evicted > 0 {
                tracing::debug!("evicted {evicted} inactive tenant bucket(s)");
            }
            sweep_limiters.ip.cleanup();
            metrics::update_pool_metrics(&sweep_pool);
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    sweeper.abort();
    pool.close(Duration::from_secs(settings.shutdown_timeout)).await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down gracefully, draining in-flight requests...");
}
