//! Inbound message dispatch.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};
use voxline_api_types::{NotificationPayload, ServerMessage, channels};

/// Read-side data groups that a push can make stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Dashboard,
    Calls,
    Agents,
}

impl Scope {
    /// Scope fed by a channel; `notifications` feeds none.
    pub fn for_channel(channel: &str) -> Option<Self> {
        match channel {
            channels::DASHBOARD => Some(Self::Dashboard),
            channels::CALLS => Some(Self::Calls),
            channels::AGENTS => Some(Self::Agents),
            _ => None,
        }
    }
}

/// The data-fetching layer the router invalidates.
pub trait ReadCache: Send + Sync {
    fn mark_stale(&self, scope: Scope);
}

/// Counts how many times each scope was marked stale.
#[derive(Debug, Default)]
pub struct StaleTracker {
    marks: Mutex<HashMap<Scope, u64>>,
}

impl StaleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, scope: Scope) -> u64 {
        let marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.get(&scope).copied().unwrap_or(0)
    }
}

impl ReadCache for StaleTracker {
    fn mark_stale(&self, scope: Scope) {
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        *marks.entry(scope).or_default() += 1;
    }
}

pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 50;

/// Bounded notification list; the oldest entry goes first when full.
#[derive(Debug, Clone)]
pub struct NotificationList {
    capacity: usize,
    items: VecDeque<NotificationPayload>,
}

impl Default for NotificationList {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl NotificationList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, notification: NotificationPayload) {
        if self.items.iter().any(|item| item.id == notification.id) {
            return;
        }
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(notification);
    }

    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<NotificationPayload> {
        self.items.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterDiagnostics {
    pub server_connection_id: Option<String>,
    pub acknowledged_channels: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_pong_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub errors: u64,
    pub ignored: u64,
    pub malformed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Applied,
    Ignored,
    Malformed,
}

pub struct MessageRouter {
    cache: Arc<dyn ReadCache>,
    notifications: NotificationList,
    diagnostics: RouterDiagnostics,
}

impl MessageRouter {
    pub fn new(cache: Arc<dyn ReadCache>, notification_capacity: usize) -> Self {
        Self {
            cache,
            notifications: NotificationList::with_capacity(notification_capacity),
            diagnostics: RouterDiagnostics::default(),
        }
    }

    pub fn notifications(&self) -> &NotificationList {
        &self.notifications
    }

    pub fn dismiss(&mut self, id: &str) -> bool {
        self.notifications.dismiss(id)
    }

    pub fn diagnostics(&self) -> &RouterDiagnostics {
        &self.diagnostics
    }

    pub fn mark_stale(&self, scope: Scope) {
        self.cache.mark_stale(scope);
    }

    /// Forget per-connection acknowledgements; called when a transport ends.
    pub fn reset_connection(&mut self) {
        self.diagnostics.server_connection_id = None;
        self.diagnostics.acknowledged_channels.clear();
    }

    pub fn route(&mut self, text: &str, now: OffsetDateTime) -> RouteOutcome {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                self.diagnostics.malformed += 1;
                warn!(
                    target = "voxline_client::router",
                    error = %err,
                    "discarding malformed message"
                );
                return RouteOutcome::Malformed;
            }
        };

        match message {
            ServerMessage::DashboardUpdate { .. } => self.cache.mark_stale(Scope::Dashboard),
            ServerMessage::CallUpdate { .. } => self.cache.mark_stale(Scope::Calls),
            ServerMessage::AgentUpdate { .. } => self.cache.mark_stale(Scope::Agents),
            ServerMessage::Notification(payload) => self.notifications.push(payload),
            ServerMessage::Connected(info) => {
                debug!(
                    target = "voxline_client::router",
                    connection_id = %info.connection_id,
                    identity = %info.identity,
                    "server acknowledged connection"
                );
                self.diagnostics.server_connection_id = Some(info.connection_id);
            }
            ServerMessage::Subscribed { channel } => {
                self.diagnostics.acknowledged_channels.insert(channel);
            }
            ServerMessage::Unsubscribed { channel } => {
                self.diagnostics.acknowledged_channels.remove(&channel);
            }
            ServerMessage::Pong => self.diagnostics.last_pong_at = Some(now),
            ServerMessage::Error { message } => {
                warn!(
                    target = "voxline_client::router",
                    error = %message,
                    "server reported an error"
                );
                self.diagnostics.errors += 1;
                self.diagnostics.last_error = Some(message);
            }
            ServerMessage::Unknown { kind } => {
                debug!(
                    target = "voxline_client::router",
                    kind = %kind,
                    "ignoring unknown message type"
                );
                self.diagnostics.ignored += 1;
                return RouteOutcome::Ignored;
            }
        }
        RouteOutcome::Applied
    }
}
