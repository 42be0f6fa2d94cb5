//! Shared wire types for the Voxline realtime channel.
//!
//! Every frame on the socket is a JSON [`Envelope`]. Both sides decode the raw
//! envelope first and then lift it into a closed message type
//! ([`ServerMessage`] or [`ClientMessage`]); tags that neither side knows land
//! in an `Unknown` variant instead of failing the decode.

mod envelope;
mod messages;

pub use envelope::{DecodeError, Envelope, now_millis};
pub use messages::{ClientMessage, ConnectedInfo, NotificationPayload, ServerMessage, Severity};

/// Channel names a client can subscribe to.
pub mod channels {
    pub const DASHBOARD: &str = "dashboard";
    pub const CALLS: &str = "calls";
    pub const AGENTS: &str = "agents";
    pub const NOTIFICATIONS: &str = "notifications";

    /// Every channel the server publishes on.
    pub const ALL: [&str; 4] = [DASHBOARD, CALLS, AGENTS, NOTIFICATIONS];
}

/// Envelope `type` tags.
pub mod kinds {
    pub const PING: &str = "ping";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";

    pub const CONNECTED: &str = "connected";
    pub const SUBSCRIBED: &str = "subscribed";
    pub const UNSUBSCRIBED: &str = "unsubscribed";
    pub const PONG: &str = "pong";
    pub const DASHBOARD_UPDATE: &str = "dashboard_update";
    pub const CALL_UPDATE: &str = "call_update";
    pub const AGENT_UPDATE: &str = "agent_update";
    pub const NOTIFICATION: &str = "notification";
    pub const ERROR: &str = "error";
}

/// Close code sent by a client that is shutting down on purpose.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close reason paired with [`NORMAL_CLOSURE`] on teardown.
pub const TEARDOWN_REASON: &str = "component unmount";
