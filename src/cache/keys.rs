//! Cache key conventions.
//!
//! Keys are colon-delimited with the owning identity in a fixed position so
//! that one anchored pattern clears an identity's whole family. The identity
//! segment is percent-encoded so it never contains the delimiter.

use std::borrow::Cow;

use regex::Regex;

const DASHBOARD_STATS: &str = "dashboard:stats";
const ANALYTICS: &str = "analytics";
const CALL_SEARCH: &str = "calls:search";
const USER_AGENTS: &str = "user:agents";
const ALL_AGENTS: &str = "all";

/// Encode `%` and `:` so an identity always occupies exactly one segment.
fn segment(identity: &str) -> Cow<'_, str> {
    if !identity.contains([':', '%']) {
        return Cow::Borrowed(identity);
    }
    let mut encoded = String::with_capacity(identity.len() + 4);
    for ch in identity.chars() {
        match ch {
            '%' => encoded.push_str("%25"),
            ':' => encoded.push_str("%3A"),
            other => encoded.push(other),
        }
    }
    Cow::Owned(encoded)
}

pub fn dashboard_stats(identity: &str) -> String {
    let identity = segment(identity);
    format!("{DASHBOARD_STATS}:{identity}")
}

/// `None` means the summary spans every agent.
pub fn analytics(identity: &str, agent_id: Option<&str>, window_days: u32) -> String {
    let identity = segment(identity);
    let agent = agent_id.unwrap_or(ALL_AGENTS);
    format!("{ANALYTICS}:{identity}:{agent}:{window_days}")
}

pub fn call_search(identity: &str, query: &str, page: u32) -> String {
    let identity = segment(identity);
    format!("{CALL_SEARCH}:{identity}:{query}:{page}")
}

pub fn user_agents(identity: &str) -> String {
    let identity = segment(identity);
    format!("{USER_AGENTS}:{identity}")
}

/// Patterns covering each key family of one identity.
pub mod patterns {
    use super::*;

    fn compile(source: String) -> Regex {
        // Built from fixed prefixes plus an escaped identity.
        Regex::new(&source).unwrap_or_else(|err| unreachable!("escaped pattern {source}: {err}"))
    }

    fn escaped_segment(identity: &str) -> String {
        regex::escape(&segment(identity))
    }

    pub fn dashboard_stats(identity: &str) -> Regex {
        compile(format!("^{DASHBOARD_STATS}:{}$", escaped_segment(identity)))
    }

    pub fn analytics(identity: &str) -> Regex {
        compile(format!("^{ANALYTICS}:{}:", escaped_segment(identity)))
    }

    pub fn call_search(identity: &str) -> Regex {
        compile(format!("^{CALL_SEARCH}:{}:", escaped_segment(identity)))
    }

    pub fn user_agents(identity: &str) -> Regex {
        compile(format!("^{USER_AGENTS}:{}$", escaped_segment(identity)))
    }
}
