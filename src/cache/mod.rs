//! Short-lived response cache for dashboard reads.
//!
//! - [`CacheStore`]: process-local key/value entries with a per-entry TTL and
//!   regex-pattern bulk invalidation.
//! - [`InvalidationBridge`]: turns a data mutation into cache purges followed
//!   by a realtime push on the affected channel.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! sweep_interval_seconds = 60
//! dashboard_stats_ttl_seconds = 300
//! # ... see config.rs for all options
//! ```

mod bridge;
mod config;
mod events;
pub mod keys;
mod lock;
mod planner;
mod store;
mod sweeper;

pub use bridge::{ChannelPublisher, InvalidationBridge, METRIC_BRIDGE_APPLY_MS, PushReport};
pub use config::{CacheConfig, CacheTtls};
pub use events::{MutationEvent, MutationKind};
pub use planner::InvalidationPlan;
pub use store::{
    CacheStore, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS, METRIC_CACHE_SWEPT,
};
pub use sweeper::spawn_sweeper;

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
