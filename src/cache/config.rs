//! Cache configuration.
//!
//! Entry lifetimes per key family and the sweep cadence, loaded from the
//! `[cache]` section of the settings.

use std::time::Duration;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_DASHBOARD_STATS_TTL_SECS: u64 = 300;
const DEFAULT_ANALYTICS_TTL_SECS: u64 = 900;
const DEFAULT_CALL_SEARCH_TTL_SECS: u64 = 60;
const DEFAULT_USER_AGENTS_TTL_SECS: u64 = 600;

/// Lifetime of each cached key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub dashboard_stats: Duration,
    pub analytics: Duration,
    pub call_search: Duration,
    pub user_agents: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            dashboard_stats: Duration::from_secs(DEFAULT_DASHBOARD_STATS_TTL_SECS),
            analytics: Duration::from_secs(DEFAULT_ANALYTICS_TTL_SECS),
            call_search: Duration::from_secs(DEFAULT_CALL_SEARCH_TTL_SECS),
            user_agents: Duration::from_secs(DEFAULT_USER_AGENTS_TTL_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false, reads bypass the store and writes skip invalidation.
    pub enabled: bool,
    /// Cadence of the background expiry sweep.
    pub sweep_interval: Duration,
    pub ttls: CacheTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            ttls: CacheTtls::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            sweep_interval: Duration::from_secs(settings.sweep_interval_seconds.get()),
            ttls: CacheTtls {
                dashboard_stats: Duration::from_secs(settings.dashboard_stats_ttl_seconds.get()),
                analytics: Duration::from_secs(settings.analytics_ttl_seconds.get()),
                call_search: Duration::from_secs(settings.call_search_ttl_seconds.get()),
                user_agents: Duration::from_secs(settings.user_agents_ttl_seconds.get()),
            },
        }
    }
}
