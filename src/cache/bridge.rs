//! Invalidation bridge.
//!
//! Applies a mutation in two steps: purge the identity's affected cache
//! families, then announce the change to that identity's subscribed
//! connections. The purge always finishes first, so a client that refetches
//! on the push never reads the pre-mutation entry.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use tracing::{debug, info, warn};
use voxline_api_types::{NotificationPayload, ServerMessage};

use super::config::CacheConfig;
use super::events::{MutationEvent, MutationKind};
use super::planner::InvalidationPlan;
use super::store::CacheStore;

pub const METRIC_BRIDGE_APPLY_MS: &str = "voxline_bridge_apply_ms";

/// Outcome of one push fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivery target for pushes; implemented by the connection hub.
pub trait ChannelPublisher: Send + Sync {
    /// Send `message` to every connection of `identity` subscribed to
    /// `channel`. Per-connection failures are counted, never raised.
    fn publish(&self, identity: &str, channel: &str, message: &ServerMessage) -> PushReport;
}

pub struct InvalidationBridge {
    config: CacheConfig,
    store: Arc<CacheStore>,
    publisher: Arc<dyn ChannelPublisher>,
}

impl InvalidationBridge {
    pub fn new(
        config: CacheConfig,
        store: Arc<CacheStore>,
        publisher: Arc<dyn ChannelPublisher>,
    ) -> Self {
        Self {
            config,
            store,
            publisher,
        }
    }

    /// Purge, then push. Returns the push outcome.
    pub fn apply(&self, event: MutationEvent) -> PushReport {
        let started_at = Instant::now();
        let plan = InvalidationPlan::for_event(&event);

        let mut invalidated = 0;
        if self.config.enabled && !plan.patterns.is_empty() {
            self.store.advance_generation(&event.identity);
            for pattern in &plan.patterns {
                invalidated += self.store.invalidate_pattern(pattern);
            }
        } else if !self.config.enabled {
            debug!(
                target = "voxline::cache::bridge",
                kind = event.kind.as_str(),
                "Cache invalidation skipped: cache disabled"
            );
        }

        let report = match push_message(&event) {
            Some(message) => self.publisher.publish(&event.identity, plan.channel, &message),
            None => PushReport::default(),
        };

        info!(
            target = "voxline::cache::bridge",
            event_id = %event.id,
            identity = %event.identity,
            kind = event.kind.as_str(),
            channel = plan.channel,
            invalidated,
            delivered = report.delivered,
            failed = report.failed,
            "Mutation applied"
        );
        histogram!(METRIC_BRIDGE_APPLY_MS, "kind" => event.kind.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }

    pub fn calls_changed(&self, identity: &str, payload: serde_json::Value) -> PushReport {
        self.apply(MutationEvent::new(identity, MutationKind::Calls, payload))
    }

    pub fn agents_changed(&self, identity: &str, payload: serde_json::Value) -> PushReport {
        self.apply(MutationEvent::new(identity, MutationKind::Agents, payload))
    }

    pub fn stats_changed(&self, identity: &str, payload: serde_json::Value) -> PushReport {
        self.apply(MutationEvent::new(identity, MutationKind::Stats, payload))
    }

    pub fn notify(&self, identity: &str, notification: &NotificationPayload) -> PushReport {
        match serde_json::to_value(notification) {
            Ok(payload) => self.apply(MutationEvent::new(identity, MutationKind::Notify, payload)),
            Err(err) => {
                warn!(
                    target = "voxline::cache::bridge",
                    error = %err,
                    "Dropping unserializable notification"
                );
                PushReport::default()
            }
        }
    }
}

fn push_message(event: &MutationEvent) -> Option<ServerMessage> {
    let data = event.payload.clone();
    let identity = Some(event.identity.clone());
    match event.kind {
        MutationKind::Calls => Some(ServerMessage::CallUpdate { data, identity }),
        MutationKind::Agents => Some(ServerMessage::AgentUpdate { data, identity }),
        MutationKind::Stats => Some(ServerMessage::DashboardUpdate { data, identity }),
        MutationKind::Notify => match serde_json::from_value::<NotificationPayload>(data) {
            Ok(payload) => Some(ServerMessage::Notification(payload)),
            Err(err) => {
                warn!(
                    target = "voxline::cache::bridge",
                    event_id = %event.id,
                    error = %err,
                    "Notification payload has an unexpected shape"
                );
                None
            }
        },
    }
}
