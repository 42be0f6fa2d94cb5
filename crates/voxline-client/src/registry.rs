use std::collections::BTreeSet;

use voxline_api_types::ClientMessage;

/// Channels the client wants, independent of whether a transport is up.
///
/// Ordered so that replays are deterministic.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    desired: BTreeSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the channel was not already desired.
    pub fn insert(&mut self, channel: &str) -> bool {
        if self.desired.contains(channel) {
            return false;
        }
        self.desired.insert(channel.to_owned())
    }

    /// Returns `true` when the channel was desired.
    pub fn remove(&mut self, channel: &str) -> bool {
        self.desired.remove(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.desired.contains(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.desired.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }

    /// One subscribe request per desired channel.
    pub fn replay(&self) -> Vec<ClientMessage> {
        self.channels().map(ClientMessage::subscribe).collect()
    }
}
