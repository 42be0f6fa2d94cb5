//! Per-connection protocol handling.
//!
//! Each inbound text frame yields exactly one reply. Protocol mistakes are
//! answered with an `error` message and never end the connection.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use voxline_api_types::{ClientMessage, ConnectedInfo, ServerMessage, channels};

use super::hub::{ConnectionHub, ConnectionId};
use crate::domain::types::Identity;

pub const DEFAULT_MAX_CHANNELS_PER_CONNECTION: usize = 16;

/// Which channels clients may join and how many at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPolicy {
    allowed: BTreeSet<String>,
    max_per_connection: usize,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self::new(channels::ALL, DEFAULT_MAX_CHANNELS_PER_CONNECTION)
    }
}

impl ChannelPolicy {
    pub fn new<I, S>(allowed: I, max_per_connection: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            max_per_connection: max_per_connection.max(1),
        }
    }

    pub fn allows(&self, channel: &str) -> bool {
        self.allowed.contains(channel)
    }

    pub fn max_per_connection(&self) -> usize {
        self.max_per_connection
    }
}

/// One authenticated socket's membership. Dropping it removes the connection
/// from the hub.
pub struct Session {
    hub: Arc<ConnectionHub>,
    policy: Arc<ChannelPolicy>,
    identity: Identity,
    id: ConnectionId,
}

impl Session {
    pub fn open(
        hub: Arc<ConnectionHub>,
        policy: Arc<ChannelPolicy>,
        identity: Identity,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let id = hub.register(identity.as_str(), tx);
        Self {
            hub,
            policy,
            identity,
            id,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// First message on every connection.
    pub fn greeting(&self) -> ServerMessage {
        ServerMessage::Connected(ConnectedInfo {
            connection_id: self.id.to_string(),
            identity: self.identity.to_string(),
        })
    }

    pub fn handle_text(&self, text: &str) -> ServerMessage {
        match ClientMessage::decode(text) {
            Ok(message) => self.handle(message),
            Err(err) => {
                warn!(
                    target = "voxline::realtime::session",
                    connection_id = %self.id,
                    error = %err,
                    "Rejecting malformed client message"
                );
                ServerMessage::error(format!("invalid message: {err}"))
            }
        }
    }

    pub fn handle(&self, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Ping => ServerMessage::Pong,
            ClientMessage::Subscribe { channel } => self.subscribe(channel),
            ClientMessage::Unsubscribe { channel } => {
                self.hub.unsubscribe(self.identity.as_str(), self.id, &channel);
                ServerMessage::Unsubscribed { channel }
            }
            ClientMessage::Unknown { kind } => {
                debug!(
                    target = "voxline::realtime::session",
                    connection_id = %self.id,
                    kind = %kind,
                    "Unsupported client message type"
                );
                ServerMessage::error(format!("unsupported message type `{kind}`"))
            }
        }
    }

    fn subscribe(&self, channel: String) -> ServerMessage {
        if !self.policy.allows(&channel) {
            return ServerMessage::error(format!("unknown channel `{channel}`"));
        }
        let current = self.hub.channels(self.identity.as_str(), self.id);
        if !current.contains(&channel) && current.len() >= self.policy.max_per_connection() {
            return ServerMessage::error(format!(
                "subscription limit of {} channels reached",
                self.policy.max_per_connection()
            ));
        }
        self.hub.subscribe(self.identity.as_str(), self.id, &channel);
        debug!(
            target = "voxline::realtime::session",
            connection_id = %self.id,
            channel = %channel,
            "Channel subscribed"
        );
        ServerMessage::Subscribed { channel }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
