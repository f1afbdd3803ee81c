//! Two-tier fixed-window rate limiting.
//!
//! The IP limiter and the tenant limiter share one algorithm: a window
//! starts on the first request and resets after `period`; requests beyond
//! the limit inside a window are denied with a `retry_after` bounded by the
//! period. Tenant limits are tier-aware (`default` / `premium`), with the
//! tier resolved from the config store through a short-lived cache. Tenant
//! buckets idle past `max_inactive` are evicted by the background sweeper.

use crate::config_store::ConfigStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use vectorgate_core::config;

/// Config key holding a tenant's rate tier.
pub const TIER_CONFIG_KEY: &str = "rate_limit_tier";

/// Outcome of a passed rate check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub remaining: u32,
}

/// Outcome of a denied rate check; carries the authoritative 429 body data.
#[derive(Debug, Clone)]
pub struct RateDenial {
    pub limit: u32,
    pub period_secs: u64,
    pub retry_after_secs: u64,
    pub limit_type: &'static str,
    pub tier: Option<String>,
}

struct Window {
    start: Instant,
    count: u32,
}

fn check_window(
    window: &mut Window,
    now: Instant,
    limit: u32,
    period: Duration,
) -> Result<RateDecision, u64> {
    if now.duration_since(window.start) >= period {
        window.start = now;
        window.count = 0;
    }
    window.count += 1;
    if window.count > limit {
        let elapsed = now.duration_since(window.start);
        let retry_after = (period.saturating_sub(elapsed)).as_secs_f64().ceil() as u64;
        return Err(retry_after.clamp(1, period.as_secs().max(1)));
    }
    Ok(RateDecision {
        remaining: limit - window.count,
    })
}

/// Per-IP fixed-window limiter.
pub struct IpRateLimiter {
    buckets: Mutex<HashMap<String, Window>>,
    limit: u32,
    period: Duration,
}

impl IpRateLimiter {
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            limit,
            period,
        }
    }

    pub fn check(&self, ip: &str) -> Result<RateDecision, RateDenial> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let window = buckets.entry(ip.to_string()).or_insert(Window {
            start: now,
            count: 0,
        });
        check_window(window, now, self.limit, self.period).map_err(|retry_after| RateDenial {
            limit: self.limit,
            period_secs: self.period.as_secs(),
            retry_after_secs: retry_after,
            limit_type: "ip",
            tier: None,
        })
    }

    /// Drop windows that ended more than one period ago.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let period = self.period;
        self.buckets
            .lock()
            .retain(|_, w| now.duration_since(w.start) < period * 2);
    }
}

struct TenantBucket {
    window: Window,
    last_seen: Instant,
}

/// Per-tenant fixed-window limiter with tier quotas and aging eviction.
pub struct TenantRateLimiter {
    buckets: Mutex<HashMap<String, TenantBucket>>,
    tier_cache: Mutex<HashMap<String, (String, Instant)>>,
    default_limit: u32,
    premium_limit: u32,
    period: Duration,
}

impl TenantRateLimiter {
    pub fn new(default_limit: u32, premium_limit: u32, period: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            tier_cache: Mutex::new(HashMap::new()),
            default_limit,
            premium_limit,
            period,
        }
    }

    fn limit_for(&self, tier: &str) -> u32 {
        match tier {
            "premium" => self.premium_limit,
            _ => self.default_limit,
        }
    }

    /// Resolve the tenant's tier via the config store, cached briefly so the
    /// hot path stays off SQLite.
    pub fn resolve_tier(&self, tenant: &str, store: &ConfigStore) -> String {
        let ttl = Duration::from_secs(config::TIER_CACHE_TTL_SECS);
        let now = Instant::now();
        {
            let cache = self.tier_cache.lock();
            if let Some((tier, cached_at)) = cache.get(tenant) {
                if now.duration_since(*cached_at) < ttl {
                    return tier.clone();
                }
            }
        }
        let tier = store
            .get_decrypted(TIER_CONFIG_KEY, tenant)
            .ok()
            .flatten()
            .filter(|t| t == "premium" || t == "default")
            .unwrap_or_else(|| "default".to_string());
        self.tier_cache
            .lock()
            .insert(tenant.to_string(), (tier.clone(), now));
        tier
    }

    pub fn check(&self, tenant: &str, tier: &str) -> Result<RateDecision, RateDenial> {
        let limit = self.limit_for(tier);
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(tenant.to_string()).or_insert(TenantBucket {
            window: Window {
                start: now,
                count: 0,
            },
            last_seen: now,
        });
        bucket.last_seen = now;
        check_window(&mut bucket.window, now, limit, self.period).map_err(|retry_after| {
            RateDenial {
                limit,
                period_secs: self.period.as_secs(),
                retry_after_secs: retry_after,
                limit_type: "tenant",
                tier: Some(tier.to_string()),
            }
        })
    }

    /// Evict buckets not seen within `max_inactive`. Returns the eviction
    /// count for the sweeper's log line.
    pub fn cleanup_inactive(&self, max_inactive: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, b| now.duration_since(b.last_seen) <= max_inactive);
        before - buckets.len()
    }

    /// Number of live buckets (health surface).
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// The two limiters, shared via `AppState`.
pub struct RateLimiters {
    pub ip: IpRateLimiter,
    pub tenant: TenantRateLimiter,
}

impl RateLimiters {
    pub fn new(ip_limit: u32, tenant_default: u32, tenant_premium: u32) -> Self {
        let period = Duration::from_secs(config::RATE_LIMIT_PERIOD_SECS);
        Self {
            ip: IpRateLimiter::new(ip_limit, period),
            tenant: TenantRateLimiter::new(tenant_default, tenant_premium, period),
        }
    }
}
