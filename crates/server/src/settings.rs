//! Runtime settings resolved from CLI arguments and environment variables.

use clap::Parser;
use std::path::PathBuf;
use vectorgate_core::config;

/// Command-line arguments. Every option can also be supplied through the
/// `VECTORGATE_*` / `VECTORDB_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "vectorgate", about = "Multi-tenant gateway for a Milvus-compatible vector database")]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "VECTORGATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "VECTORGATE_PORT", default_value_t = config::DEFAULT_PORT)]
    pub port: u16,

    /// Vector DB endpoint (hostname or URL); "memory" runs the embedded in-memory backend
    #[arg(long, env = "VECTORDB_ENDPOINT", default_value = "localhost")]
    pub vectordb_endpoint: String,

    /// Vector DB port
    #[arg(long, env = "VECTORDB_PORT", default_value_t = config::DEFAULT_VECTORDB_PORT)]
    pub vectordb_port: u16,

    /// Vector DB admin username
    #[arg(long, env = "VECTORDB_USERNAME", default_value = "root")]
    pub vectordb_username: String,

    /// Vector DB admin password (prefer --vectordb-password-file)
    #[arg(long, env = "VECTORDB_PASSWORD")]
    pub vectordb_password: Option<String>,

    /// File containing the vector DB admin password
    #[arg(long, env = "VECTORDB_PASSWORD_FILE")]
    pub vectordb_password_file: Option<PathBuf>,

    /// Path to the embedded clients/config SQLite database
    #[arg(long, env = "VECTORGATE_CLIENTS_DB", default_value = "./data/clients.db")]
    pub clients_db_path: PathBuf,

    /// Directory holding the master key and generated credentials
    #[arg(long, env = "VECTORGATE_SECRETS_DIR", default_value = "./secrets")]
    pub secrets_dir: PathBuf,

    /// Disable authentication and tenant security (development only)
    #[arg(long, env = "VECTORGATE_SECURITY_DISABLED", default_value_t = false)]
    pub security_disabled: bool,

    /// Global default CORS origins (comma-separated patterns)
    #[arg(long, env = "VECTORGATE_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Global default trusted hosts (comma-separated patterns)
    #[arg(long, env = "VECTORGATE_TRUSTED_HOSTS", value_delimiter = ',', default_value = "*")]
    pub trusted_hosts: Vec<String>,

    /// Default dense vector dimension (1-4096)
    #[arg(long, env = "VECTORGATE_DEFAULT_DIMENSION", default_value_t = config::DEFAULT_DIMENSION)]
    pub default_dimension: usize,

    /// Default ANN metric type
    #[arg(long, env = "VECTORGATE_DEFAULT_METRIC", default_value = config::DEFAULT_METRIC_TYPE)]
    pub default_metric: String,

    /// Default dense index type
    #[arg(long, env = "VECTORGATE_DEFAULT_INDEX", default_value = config::DEFAULT_INDEX_TYPE)]
    pub default_index: String,

    /// Default nlist for IVF indexes
    #[arg(long, env = "VECTORGATE_NLIST", default_value_t = config::DEFAULT_NLIST)]
    pub nlist: usize,

    /// Batch size at or above which inserts flush automatically
    #[arg(long, env = "VECTORGATE_AUTO_FLUSH_MIN_BATCH", default_value_t = config::AUTO_FLUSH_MIN_BATCH)]
    pub auto_flush_min_batch: usize,

    /// Per-IP rate limit (requests per window)
    #[arg(long, env = "VECTORGATE_IP_RATE_LIMIT", default_value_t = config::IP_RATE_LIMIT)]
    pub ip_rate_limit: u32,

    /// Per-tenant rate limit for the default tier
    #[arg(long, env = "VECTORGATE_TENANT_RATE_LIMIT", default_value_t = config::TENANT_RATE_LIMIT_DEFAULT)]
    pub tenant_rate_limit: u32,

    /// Per-tenant rate limit for the premium tier
    #[arg(long, env = "VECTORGATE_PREMIUM_RATE_LIMIT", default_value_t = config::TENANT_RATE_LIMIT_PREMIUM)]
    pub premium_rate_limit: u32,

    /// Maximum number of pooled vector-DB clients
    #[arg(long, env = "VECTORGATE_POOL_MAX_ENTRIES", default_value_t = config::POOL_MAX_ENTRIES)]
    pub pool_max_entries: usize,

    /// Seconds a pooled client may sit idle before eviction
    #[arg(long, env = "VECTORGATE_POOL_MAX_IDLE", default_value_t = config::POOL_MAX_IDLE_SECS)]
    pub pool_max_idle_secs: u64,

    /// Seconds between background sweeps
    #[arg(long, env = "VECTORGATE_SWEEP_INTERVAL", default_value_t = config::SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,

    /// Graceful shutdown drain deadline in seconds
    #[arg(long, default_value_t = config::DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    pub shutdown_timeout: u64,
}

/// Resolved runtime settings shared across the process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub vectordb_uri: String,
    pub vectordb_username: String,
    pub vectordb_password: String,
    pub memory_backend: bool,
    pub clients_db_path: PathBuf,
    pub secrets_dir: PathBuf,
    pub security_disabled: bool,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub default_dimension: usize,
    pub default_metric: String,
    pub default_index: String,
    pub nlist: usize,
    pub auto_flush_min_batch: usize,
    pub ip_rate_limit: u32,
    pub tenant_rate_limit: u32,
    pub premium_rate_limit: u32,
    pub pool_max_entries: usize,
    pub pool_max_idle_secs: u64,
    pub sweep_interval_secs: u64,
    pub shutdown_timeout: u64,
}

impl Settings {
    /// Resolve settings from parsed arguments. The admin password comes from
    /// the password file when configured, falling back to the inline value.
    pub fn from_args(args: Args) -> Result<Self, String> {
        let memory_backend = args.vectordb_endpoint == "memory";

        let password = if let Some(ref file) = args.vectordb_password_file {
            match std::fs::read_to_string(file) {
                Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
                Ok(_) => {
                    tracing::warn!("password file {} is empty", file.display());
                    args.vectordb_password.clone().unwrap_or_default()
                }
                Err(e) => {
                    tracing::warn!("failed to read password file {}: {e}", file.display());
                    args.vectordb_password.clone().unwrap_or_default()
                }
            }
        } else {
            args.vectordb_password.clone().unwrap_or_default()
        };

        if !memory_backend && password.is_empty() {
            return Err(
                "vector DB password is missing: set VECTORDB_PASSWORD or provide a password file"
                    .to_string(),
            );
        }

        let mut endpoint = args.vectordb_endpoint.trim_end_matches('/').to_string();
        if !memory_backend && !endpoint.starts_with("http://") && !endpoint.starts_with("https://")
        {
            endpoint = format!("http://{endpoint}");
        }
        let vectordb_uri = if memory_backend || endpoint.contains(&format!(":{}", args.vectordb_port))
        {
            endpoint
        } else {
            format!("{endpoint}:{}", args.vectordb_port)
        };

        Ok(Self {
            host: args.host,
            port: args.port,
            vectordb_uri,
            vectordb_username: args.vectordb_username,
            vectordb_password: password,
            memory_backend,
            clients_db_path: args.clients_db_path,
            secrets_dir: args.secrets_dir,
            security_disabled: args.security_disabled,
            cors_origins: args.cors_origins,
            trusted_hosts: args.trusted_hosts,
            default_dimension: args.default_dimension,
            default_metric: args.default_metric,
            default_index: args.default_index,
            nlist: args.nlist,
            auto_flush_min_batch: args.auto_flush_min_batch,
            ip_rate_limit: args.ip_rate_limit,
            tenant_rate_limit: args.tenant_rate_limit,
            premium_rate_limit: args.premium_rate_limit,
            pool_max_entries: args.pool_max_entries,
            pool_max_idle_secs: args.pool_max_idle_secs,
            sweep_interval_secs: args.sweep_interval_secs,
            shutdown_timeout: args.shutdown_timeout,
        })
    }

    /// Path of the master key file inside the secrets directory.
    pub fn master_key_path(&self) -> PathBuf {
        self.secrets_dir.join(".master_key")
    }
}
