//! The client core: connection lifecycle, desired channels and inbound routing
//! combined behind a single ordered event queue.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;
use voxline_api_types::{ClientMessage, NotificationPayload};

use crate::backoff::Backoff;
use crate::connection::{
    ConnectionManager, ConnectionSnapshot, ConnectionState, Effect, TransportEvent, TransportId,
};
use crate::endpoint::Endpoint;
use crate::registry::SubscriptionRegistry;
use crate::router::{
    DEFAULT_NOTIFICATION_CAPACITY, MessageRouter, ReadCache, RouterDiagnostics, Scope,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub heartbeat: Duration,
    pub backoff: Backoff,
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            backoff: Backoff::default(),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

/// Everything that can happen to a client, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Open { credential: String },
    Subscribe(String),
    Unsubscribe(String),
    Dismiss(String),
    Teardown,
    HeartbeatTick,
    ReconnectDue,
    Transport { id: TransportId, event: TransportEvent },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub connection: ConnectionSnapshot,
    pub desired_channels: Vec<String>,
    pub router: RouterDiagnostics,
}

pub struct SyncClient {
    connection: ConnectionManager,
    registry: SubscriptionRegistry,
    router: MessageRouter,
}

impl SyncClient {
    pub fn new(endpoint: Endpoint, config: ClientConfig, cache: Arc<dyn ReadCache>) -> Self {
        Self {
            connection: ConnectionManager::new(endpoint, config.backoff),
            registry: SubscriptionRegistry::new(),
            router: MessageRouter::new(cache, config.notification_capacity),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.state() == ConnectionState::Closed
    }

    pub fn timers_pending(&self) -> bool {
        self.connection.timers_pending()
    }

    pub fn notifications(&self) -> Vec<NotificationPayload> {
        self.router.notifications().to_vec()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            connection: self.connection.snapshot(),
            desired_channels: self.registry.channels().map(str::to_owned).collect(),
            router: self.router.diagnostics().clone(),
        }
    }

    pub fn handle(&mut self, event: ClientEvent, now: OffsetDateTime) -> Vec<Effect> {
        match event {
            ClientEvent::Open { credential } => {
                self.router.reset_connection();
                self.connection.open(&credential)
            }
            ClientEvent::Subscribe(channel) => {
                if !self.registry.insert(&channel) {
                    return Vec::new();
                }
                self.connection
                    .send(ClientMessage::subscribe(channel))
                    .into_iter()
                    .collect()
            }
            ClientEvent::Unsubscribe(channel) => {
                if !self.registry.remove(&channel) {
                    return Vec::new();
                }
                self.connection
                    .send(ClientMessage::unsubscribe(channel))
                    .into_iter()
                    .collect()
            }
            ClientEvent::Dismiss(id) => {
                self.router.dismiss(&id);
                Vec::new()
            }
            ClientEvent::Teardown => {
                self.router.reset_connection();
                self.connection.teardown()
            }
            ClientEvent::HeartbeatTick => self.connection.heartbeat().into_iter().collect(),
            ClientEvent::ReconnectDue => self.connection.reconnect_due(),
            ClientEvent::Transport { id, event } => self.on_transport(id, event, now),
        }
    }

    fn on_transport(
        &mut self,
        id: TransportId,
        event: TransportEvent,
        now: OffsetDateTime,
    ) -> Vec<Effect> {
        if self.connection.current() != Some(id) {
            return self.connection.on_transport(id, &event, now);
        }

        match event {
            TransportEvent::Text(text) => {
                self.router.route(&text, now);
                Vec::new()
            }
            TransportEvent::Opened => {
                let mut effects = self.connection.on_transport(id, &event, now);
                if !self.connection.is_open() {
                    return effects;
                }
                effects.extend(
                    self.registry
                        .replay()
                        .into_iter()
                        .filter_map(|message| self.connection.send(message)),
                );
                if self.connection.successful_opens() > 1 {
                    self.resynchronize();
                }
                effects
            }
            TransportEvent::Closed { .. } | TransportEvent::Error(_) => {
                self.router.reset_connection();
                self.connection.on_transport(id, &event, now)
            }
        }
    }

    /// Pushes sent while the transport was down are lost, so every scope fed
    /// by a desired channel is refetched after a reconnect.
    fn resynchronize(&self) {
        for channel in self.registry.channels() {
            if let Some(scope) = Scope::for_channel(channel) {
                debug!(
                    target = "voxline_client::sync",
                    channel,
                    "marking scope stale after reconnect"
                );
                self.router.mark_stale(scope);
            }
        }
    }
}
