//! Server side of the realtime channel protocol.

mod hub;
mod session;

pub use hub::{
    ConnectionHub, ConnectionId, METRIC_PUSH_DELIVERED, METRIC_PUSH_FAILED, METRIC_WS_CONNECTIONS,
};
pub use session::{ChannelPolicy, Session};
