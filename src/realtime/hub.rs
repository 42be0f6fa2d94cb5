//! Connection membership table.
//!
//! Layout is identity → connection → subscribed channels. Every connection
//! owns an unbounded sender drained by its socket writer task, so a publish
//! never waits on a slow socket.

use std::collections::BTreeSet;
use std::fmt;

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;
use voxline_api_types::ServerMessage;

use crate::cache::{ChannelPublisher, PushReport};

pub const METRIC_WS_CONNECTIONS: &str = "voxline_ws_connections";
pub const METRIC_PUSH_DELIVERED: &str = "voxline_push_delivered_total";
pub const METRIC_PUSH_FAILED: &str = "voxline_push_failed_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Member {
    channels: BTreeSet<String>,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Default)]
pub struct ConnectionHub {
    identities: DashMap<String, DashMap<ConnectionId, Member>>,
    owners: DashMap<ConnectionId, String>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        identity: &str,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> ConnectionId {
        let id = ConnectionId::new();
        self.identities
            .entry(identity.to_owned())
            .or_default()
            .insert(
                id,
                Member {
                    channels: BTreeSet::new(),
                    tx,
                },
            );
        self.owners.insert(id, identity.to_owned());
        self.record_connections();
        debug!(
            target = "voxline::realtime::hub",
            connection_id = %id,
            identity,
            "Connection registered"
        );
        id
    }

    /// Drop the connection and all its memberships. Returns `false` when it
    /// was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let Some((_, identity)) = self.owners.remove(&id) else {
            return false;
        };
        if let Some(members) = self.identities.get(&identity) {
            members.remove(&id);
        }
        self.identities
            .remove_if(&identity, |_, members| members.is_empty());
        self.record_connections();
        debug!(
            target = "voxline::realtime::hub",
            connection_id = %id,
            identity = %identity,
            "Connection unregistered"
        );
        true
    }

    /// Returns `true` when the channel was newly added.
    pub fn subscribe(&self, identity: &str, id: ConnectionId, channel: &str) -> bool {
        self.with_member(identity, id, |member| {
            member.channels.insert(channel.to_owned())
        })
        .unwrap_or(false)
    }

    /// Returns `true` when the channel was subscribed.
    pub fn unsubscribe(&self, identity: &str, id: ConnectionId, channel: &str) -> bool {
        self.with_member(identity, id, |member| member.channels.remove(channel))
            .unwrap_or(false)
    }

    /// Sorted channel set; empty for unknown connections.
    pub fn channels(&self, identity: &str, id: ConnectionId) -> Vec<String> {
        self.with_member(identity, id, |member| {
            member.channels.iter().cloned().collect()
        })
        .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.owners.len()
    }

    /// Connections of `identity` currently subscribed to `channel`.
    pub fn subscriber_count(&self, identity: &str, channel: &str) -> usize {
        self.identities.get(identity).map_or(0, |members| {
            members
                .iter()
                .filter(|member| member.channels.contains(channel))
                .count()
        })
    }

    /// Send to every connection of `identity` subscribed to `channel`.
    /// Connections whose writer has gone away are pruned.
    pub fn publish(&self, identity: &str, channel: &str, message: &ServerMessage) -> PushReport {
        let mut report = PushReport::default();
        let mut dead = Vec::new();

        if let Some(members) = self.identities.get(identity) {
            for entry in members.iter() {
                if !entry.channels.contains(channel) {
                    continue;
                }
                match entry.tx.send(message.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(_) => {
                        report.failed += 1;
                        dead.push(*entry.key());
                    }
                }
            }
        }

        for id in dead {
            debug!(
                target = "voxline::realtime::hub",
                connection_id = %id,
                "Pruning closed connection"
            );
            self.unregister(id);
        }

        if report.delivered > 0 {
            counter!(METRIC_PUSH_DELIVERED, "channel" => channel.to_owned())
                .increment(report.delivered as u64);
        }
        if report.failed > 0 {
            counter!(METRIC_PUSH_FAILED, "channel" => channel.to_owned())
                .increment(report.failed as u64);
        }
        report
    }

    fn with_member<R>(
        &self,
        identity: &str,
        id: ConnectionId,
        f: impl FnOnce(&mut Member) -> R,
    ) -> Option<R> {
        let members = self.identities.get(identity)?;
        let mut member = members.get_mut(&id)?;
        Some(f(member.value_mut()))
    }

    fn record_connections(&self) {
        gauge!(METRIC_WS_CONNECTIONS).set(self.owners.len() as f64);
    }
}

impl ChannelPublisher for ConnectionHub {
    fn publish(&self, identity: &str, channel: &str, message: &ServerMessage) -> PushReport {
        ConnectionHub::publish(self, identity, channel, message)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn update() -> ServerMessage {
        ServerMessage::CallUpdate {
            data: json!({"id": "c1"}),
            identity: Some("u1".into()),
        }
    }

    #[test]
    fn publish_reaches_only_subscribed_connections_of_identity() {
        let hub = ConnectionHub::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        let a = hub.register("u1", tx_a);
        let _b = hub.register("u1", tx_b);
        let other = hub.register("u2", tx_other);

        assert!(hub.subscribe("u1", a, "calls"));
        assert!(!hub.subscribe("u1", a, "calls"));
        assert!(hub.subscribe("u2", other, "calls"));

        let report = hub.publish("u1", "calls", &update());
        assert_eq!(
            report,
            PushReport {
                delivered: 1,
                failed: 0
            }
        );
        assert_eq!(rx_a.try_recv().ok(), Some(update()));
        assert!(rx_b.try_recv().is_err());
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn subscriptions_are_per_connection_and_identity_scoped() {
        let hub = ConnectionHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub.register("u1", tx);

        hub.subscribe("u1", id, "calls");
        hub.subscribe("u1", id, "agents");
        assert!(!hub.subscribe("u2", id, "dashboard"), "wrong identity");
        assert!(hub.unsubscribe("u1", id, "agents"));
        assert!(!hub.unsubscribe("u1", id, "agents"));
        assert_eq!(hub.channels("u1", id), vec!["calls"]);
        assert!(hub.channels("u2", id).is_empty());
        assert_eq!(hub.subscriber_count("u1", "calls"), 1);
        assert_eq!(hub.subscriber_count("u1", "agents"), 0);
        assert_eq!(hub.subscriber_count("u2", "calls"), 0);
    }

    #[test]
    fn dead_connections_are_pruned_on_publish() {
        let hub = ConnectionHub::new();
        let (tx_live, _rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let live = hub.register("u1", tx_live);
        let dead = hub.register("u1", tx_dead);
        hub.subscribe("u1", live, "calls");
        hub.subscribe("u1", dead, "calls");
        drop(rx_dead);

        let report = hub.publish("u1", "calls", &update());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.channels("u1", dead).is_empty());
    }

    #[test]
    fn unregister_drops_membership() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register("u1", tx);
        hub.subscribe("u1", id, "calls");

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.publish("u1", "calls", &update()), PushReport::default());
        assert!(rx.try_recv().is_err());
    }
}
