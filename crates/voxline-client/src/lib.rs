//! Client side of the Voxline realtime channel.
//!
//! The pure pieces ([`ConnectionManager`], [`SubscriptionRegistry`],
//! [`MessageRouter`]) are combined by [`SyncClient`]; [`RealtimeClient`] runs
//! that core on tokio against a real WebSocket.

pub mod backoff;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod sync;

pub use backoff::Backoff;
pub use connection::{ConnectionManager, ConnectionState, Effect, TransportEvent, TransportId};
pub use endpoint::Endpoint;
pub use error::ClientError;
pub use registry::SubscriptionRegistry;
pub use router::{MessageRouter, NotificationList, ReadCache, RouteOutcome, Scope, StaleTracker};
pub use runtime::{RealtimeClient, RealtimeHandle};
pub use sync::{ClientConfig, ClientEvent, Diagnostics, SyncClient};
