//! Prometheus metrics recording.

use crate::pool::ConnectionPool;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Records HTTP request metrics.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Records a service-method invocation and its outcome kind.
pub fn record_operation(operation: &str, outcome: &str, duration: Duration) {
    let labels = [
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("vectorgate_operations_total", &labels).increment(1);
    histogram!("vectorgate_operation_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Records a rate-limit denial.
pub fn record_rate_limit_denial(limit_type: &str) {
    counter!(
        "vectorgate_rate_limited_total",
        "limit_type" => limit_type.to_string()
    )
    .increment(1);
}

/// Updates connection pool gauges; called from the background sweeper.
pub fn update_pool_metrics(pool: &ConnectionPool) {
    let stats = pool.stats();
    gauge!("vectorgate_pool_entries").set((stats.active + stats.idle) as f64);
    gauge!("vectorgate_pool_active").set(stats.active as f64);
    gauge!("vectorgate_pool_idle").set(stats.idle as f64);
}
