//! Invalidation plan generation.
//!
//! Maps one mutation to the cache patterns it purges and the channel it is
//! announced on.

use std::fmt;

use regex::Regex;
use voxline_api_types::channels;

use super::events::{MutationEvent, MutationKind};
use super::keys::patterns;

#[derive(Debug)]
pub struct InvalidationPlan {
    /// Patterns to purge, all scoped to the event identity.
    pub patterns: Vec<Regex>,
    /// Channel the push goes to.
    pub channel: &'static str,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ patterns: {}, channel: {} }}",
            self.patterns.len(),
            self.channel
        )
    }
}

impl InvalidationPlan {
    pub fn for_event(event: &MutationEvent) -> Self {
        let id = event.identity.as_str();
        match event.kind {
            MutationKind::Calls => Self {
                patterns: vec![
                    patterns::call_search(id),
                    patterns::dashboard_stats(id),
                    patterns::analytics(id),
                ],
                channel: channels::CALLS,
            },
            MutationKind::Agents => Self {
                patterns: vec![
                    patterns::user_agents(id),
                    patterns::dashboard_stats(id),
                    patterns::analytics(id),
                ],
                channel: channels::AGENTS,
            },
            MutationKind::Stats => Self {
                patterns: vec![patterns::dashboard_stats(id), patterns::analytics(id)],
                channel: channels::DASHBOARD,
            },
            MutationKind::Notify => Self {
                patterns: Vec::new(),
                channel: channels::NOTIFICATIONS,
            },
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(key))
    }
}
