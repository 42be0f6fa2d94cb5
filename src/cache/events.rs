//! Mutation events fed to the invalidation bridge.

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which data family changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// A call was recorded or updated.
    Calls,
    /// An agent was created, edited or toggled.
    Agents,
    /// Aggregate figures changed without a single owning record.
    Stats,
    /// A user-facing notice; touches no cached data.
    Notify,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Agents => "agents",
            Self::Stats => "stats",
            Self::Notify => "notify",
        }
    }
}

/// One data change, scoped to the identity that owns the data.
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub id: Uuid,
    pub identity: String,
    pub kind: MutationKind,
    /// Body of the pushed message.
    pub payload: Value,
    pub timestamp: OffsetDateTime,
}

impl MutationEvent {
    pub fn new(identity: impl Into<String>, kind: MutationKind, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: identity.into(),
            kind,
            payload,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}
