//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{AgentRecord, AnalyticsSummary, CallRecord, DashboardStats};
use crate::domain::types::{CallStatus, Identity};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("storage timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSearch {
    pub query: String,
    /// One-based.
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPage {
    pub items: Vec<CallRecord>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct CreateCallParams {
    pub agent_id: Uuid,
    pub caller: String,
    pub status: CallStatus,
    pub duration_secs: u32,
    pub started_at: OffsetDateTime,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpsertAgentParams {
    pub id: Uuid,
    pub name: String,
    pub voice: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentUpserted {
    pub agent: AgentRecord,
    pub created: bool,
}

#[async_trait]
pub trait CallsRepo: Send + Sync {
    /// Newest first.
    async fn search_calls(
        &self,
        identity: &Identity,
        search: &CallSearch,
    ) -> Result<CallPage, RepoError>;

    async fn list_calls(&self, identity: &Identity) -> Result<Vec<CallRecord>, RepoError>;

    /// Fails with `InvalidInput` when the agent does not belong to `identity`.
    async fn create_call(
        &self,
        identity: &Identity,
        params: CreateCallParams,
    ) -> Result<CallRecord, RepoError>;
}

#[async_trait]
pub trait AgentsRepo: Send + Sync {
    /// Sorted by name.
    async fn list_agents(&self, identity: &Identity) -> Result<Vec<AgentRecord>, RepoError>;

    async fn upsert_agent(
        &self,
        identity: &Identity,
        params: UpsertAgentParams,
    ) -> Result<AgentUpserted, RepoError>;
}

#[async_trait]
pub trait StatsRepo: Send + Sync {
    async fn dashboard_stats(&self, identity: &Identity) -> Result<DashboardStats, RepoError>;

    async fn analytics(
        &self,
        identity: &Identity,
        agent_id: Option<Uuid>,
        window_days: u32,
    ) -> Result<AnalyticsSummary, RepoError>;
}
