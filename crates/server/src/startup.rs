//! Startup configuration validation.
//!
//! Violations do not abort the process; they are collected and surfaced in
//! `/health.configuration.errors` so a misconfigured deployment is visible
//! instead of silently half-working.

use crate::settings::Settings;
use vectorgate_core::config;

const KNOWN_METRICS: [&str; 3] = ["COSINE", "L2", "IP"];

/// Validate resolved settings, returning every violation found.
pub fn validate_settings(settings: &Settings) -> Vec<String> {
    let mut errors = Vec::new();

    if settings.default_dimension == 0 || settings.default_dimension > config::MAX_DIMENSION {
        errors.push(format!(
            "default_dimension must be between 1 and {}, got {}",
            config::MAX_DIMENSION,
            settings.default_dimension
        ));
    }
    if !KNOWN_METRICS.contains(&settings.default_metric.to_uppercase().as_str()) {
        errors.push(format!(
            "default_metric must be one of {KNOWN_METRICS:?}, got '{}'",
            settings.default_metric
        ));
    }
    if settings.default_index.is_empty() {
        errors.push("default_index must not be empty".to_string());
    }
    if settings.nlist == 0 {
        errors.push("nlist must be positive".to_string());
    }
    if settings.ip_rate_limit == 0 || settings.tenant_rate_limit == 0 {
        errors.push("rate limits must be positive".to_string());
    }
    if settings.premium_rate_limit < settings.tenant_rate_limit {
        errors.push(format!(
            "premium rate limit {} is below the default tier limit {}",
            settings.premium_rate_limit, settings.tenant_rate_limit
        ));
    }
    if settings.pool_max_entries == 0 {
        errors.push("pool_max_entries must be positive".to_string());
    }
    if settings.sweep_interval_secs == 0 {
        errors.push("sweep_interval_secs must be positive".to_string());
    }
    if settings.auto_flush_min_batch == 0 {
        errors.push("auto_flush_min_batch must be positive".to_string());
    }

    errors
}
