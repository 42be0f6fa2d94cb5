//! Domain entities held by the repositories.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::types::{CallStatus, Identity};

const MAX_CALLER_LEN: usize = 64;
const MAX_AGENT_NAME_LEN: usize = 120;
const MAX_CALL_DURATION_SECS: u32 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,
    pub identity: Identity,
    pub agent_id: Uuid,
    pub caller: String,
    pub status: CallStatus,
    pub duration_secs: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub summary: Option<String>,
}

impl CallRecord {
    /// Case-insensitive match on caller and summary. An empty query matches.
    pub fn matches(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        self.caller.to_lowercase().contains(&needle)
            || self
                .summary
                .as_deref()
                .is_some_and(|summary| summary.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: Uuid,
    pub identity: Identity,
    pub name: String,
    pub voice: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_calls: u64,
    pub completed_calls: u64,
    pub failed_calls: u64,
    pub active_agents: u64,
    pub average_duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub agent_id: Option<Uuid>,
    pub window_days: u32,
    pub calls: u64,
    pub completed: u64,
    pub failed: u64,
    pub average_duration_secs: f64,
}

pub fn validate_caller(caller: &str) -> Result<(), DomainError> {
    let caller = caller.trim();
    if caller.is_empty() {
        return Err(DomainError::validation("caller must not be empty"));
    }
    if caller.chars().count() > MAX_CALLER_LEN {
        return Err(DomainError::validation(format!(
            "caller must be at most {MAX_CALLER_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_duration(duration_secs: u32) -> Result<(), DomainError> {
    if duration_secs > MAX_CALL_DURATION_SECS {
        return Err(DomainError::validation(
            "call duration must not exceed one day",
        ));
    }
    Ok(())
}

pub fn validate_agent_name(name: &str) -> Result<(), DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("agent name must not be empty"));
    }
    if name.chars().count() > MAX_AGENT_NAME_LEN {
        return Err(DomainError::validation(format!(
            "agent name must be at most {MAX_AGENT_NAME_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(caller: &str, summary: Option<&str>) -> CallRecord {
        CallRecord {
            id: Uuid::new_v4(),
            identity: Identity::new("u1"),
            agent_id: Uuid::new_v4(),
            caller: caller.into(),
            status: CallStatus::Completed,
            duration_secs: 30,
            started_at: OffsetDateTime::UNIX_EPOCH,
            summary: summary.map(str::to_owned),
        }
    }

    #[test]
    fn search_matches_caller_or_summary() {
        let record = call("+1 555 0100", Some("Asked about a Refund"));
        assert!(record.matches(""));
        assert!(record.matches("555"));
        assert!(record.matches("refund"));
        assert!(!record.matches("invoice"));
        assert!(!call("+1 555 0100", None).matches("refund"));
    }

    #[test]
    fn validation_rejects_blank_and_oversized_input() {
        assert!(validate_caller("  ").is_err());
        assert!(validate_caller(&"9".repeat(65)).is_err());
        assert!(validate_caller("+44 20 7946 0000").is_ok());
        assert!(validate_agent_name("").is_err());
        assert!(validate_agent_name("Reception").is_ok());
        assert!(validate_duration(86_401).is_err());
        assert!(validate_duration(600).is_ok());
    }
}
