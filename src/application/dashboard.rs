//! Dashboard reads and writes.
//!
//! Reads go through the response cache; writes go to the repositories first
//! and then through the invalidation bridge so cached reads and subscribed
//! clients both observe the change.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use voxline_api_types::{NotificationPayload, Severity};

use crate::application::repos::{
    AgentsRepo, CallPage, CallSearch, CallsRepo, CreateCallParams, RepoError, StatsRepo,
    UpsertAgentParams,
};
use crate::cache::{CacheConfig, CacheStore, InvalidationBridge, PushReport, keys};
use crate::domain::entities::{
    AgentRecord, AnalyticsSummary, CallRecord, DashboardStats, validate_agent_name,
    validate_caller, validate_duration,
};
use crate::domain::error::DomainError;
use crate::domain::types::{CallStatus, Identity};

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
pub const MAX_WINDOW_DAYS: u32 = 365;
pub const CALLS_PER_PAGE: u32 = 20;
const MAX_QUERY_LEN: usize = 120;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Result of pushing a notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationSent {
    pub notification: NotificationPayload,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct RecordCallCommand {
    pub agent_id: Uuid,
    pub caller: String,
    pub status: CallStatus,
    pub duration_secs: u32,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpsertAgentCommand {
    pub id: Uuid,
    pub name: String,
    pub voice: String,
    pub active: bool,
}

pub struct DashboardService {
    config: CacheConfig,
    store: Arc<CacheStore>,
    bridge: Arc<InvalidationBridge>,
    calls: Arc<dyn CallsRepo>,
    agents: Arc<dyn AgentsRepo>,
    stats: Arc<dyn StatsRepo>,
}

impl DashboardService {
    pub fn new(
        config: CacheConfig,
        store: Arc<CacheStore>,
        bridge: Arc<InvalidationBridge>,
        calls: Arc<dyn CallsRepo>,
        agents: Arc<dyn AgentsRepo>,
        stats: Arc<dyn StatsRepo>,
    ) -> Self {
        Self {
            config,
            store,
            bridge,
            calls,
            agents,
            stats,
        }
    }

    pub async fn stats(&self, identity: &Identity) -> Result<DashboardStats, DashboardError> {
        let key = keys::dashboard_stats(identity.as_str());
        self.cached(identity, key, self.config.ttls.dashboard_stats, || {
            self.stats.dashboard_stats(identity)
        })
        .await
    }

    pub async fn analytics(
        &self,
        identity: &Identity,
        agent_id: Option<Uuid>,
        window_days: Option<u32>,
    ) -> Result<AnalyticsSummary, DashboardError> {
        let window_days = window_days.unwrap_or(DEFAULT_WINDOW_DAYS);
        if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
            return Err(DomainError::out_of_range(
                "days",
                window_days.into(),
                1,
                MAX_WINDOW_DAYS.into(),
            )
            .into());
        }
        let agent = agent_id.map(|id| id.to_string());
        let key = keys::analytics(identity.as_str(), agent.as_deref(), window_days);
        self.cached(identity, key, self.config.ttls.analytics, || {
            self.stats.analytics(identity, agent_id, window_days)
        })
        .await
    }

    pub async fn search_calls(
        &self,
        identity: &Identity,
        query: Option<String>,
        page: Option<u32>,
    ) -> Result<CallPage, DashboardError> {
        let query = query.unwrap_or_default().trim().to_owned();
        if query.chars().count() > MAX_QUERY_LEN {
            return Err(DomainError::validation(format!(
                "q must be at most {MAX_QUERY_LEN} characters"
            ))
            .into());
        }
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(DomainError::validation("page must be at least 1").into());
        }

        let search = CallSearch {
            query,
            page,
            per_page: CALLS_PER_PAGE,
        };
        let key = keys::call_search(identity.as_str(), &search.query, page);
        self.cached(identity, key, self.config.ttls.call_search, || {
            self.calls.search_calls(identity, &search)
        })
        .await
    }

    pub async fn agents(&self, identity: &Identity) -> Result<Vec<AgentRecord>, DashboardError> {
        let key = keys::user_agents(identity.as_str());
        self.cached(identity, key, self.config.ttls.user_agents, || {
            self.agents.list_agents(identity)
        })
        .await
    }

    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn record_call(
        &self,
        identity: &Identity,
        command: RecordCallCommand,
    ) -> Result<CallRecord, DashboardError> {
        validate_caller(&command.caller)?;
        validate_duration(command.duration_secs)?;

        let record = self
            .calls
            .create_call(
                identity,
                CreateCallParams {
                    agent_id: command.agent_id,
                    caller: command.caller.trim().to_owned(),
                    status: command.status,
                    duration_secs: command.duration_secs,
                    started_at: time::OffsetDateTime::now_utc(),
                    summary: command.summary,
                },
            )
            .await?;

        self.bridge.calls_changed(identity.as_str(), to_payload(&record));
        Ok(record)
    }

    /// Returns the stored agent and whether it was newly created.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn upsert_agent(
        &self,
        identity: &Identity,
        command: UpsertAgentCommand,
    ) -> Result<(AgentRecord, bool), DashboardError> {
        validate_agent_name(&command.name)?;

        let upserted = self
            .agents
            .upsert_agent(
                identity,
                UpsertAgentParams {
                    id: command.id,
                    name: command.name.trim().to_owned(),
                    voice: command.voice,
                    active: command.active,
                },
            )
            .await?;

        self.bridge
            .agents_changed(identity.as_str(), to_payload(&upserted.agent));
        Ok((upserted.agent, upserted.created))
    }

    pub fn notify(
        &self,
        identity: &Identity,
        title: &str,
        message: &str,
        severity: Severity,
    ) -> Result<NotificationSent, DashboardError> {
        if title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty").into());
        }
        let notification = NotificationPayload::new(title.trim(), message, severity);
        let PushReport { delivered, failed } = self.bridge.notify(identity.as_str(), &notification);
        Ok(NotificationSent {
            notification,
            delivered,
            failed,
        })
    }

    /// Cache-aside read. The fill is skipped when a mutation for `identity`
    /// purged its keys while `fetch` was running.
    async fn cached<T, F, Fut>(
        &self,
        identity: &Identity,
        key: String,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, DashboardError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        if self.config.enabled
            && let Some(hit) = self.store.get_json::<T>(&key)
        {
            debug!(target = "voxline::dashboard", key = %key, "Served from cache");
            return Ok(hit);
        }

        let generation = self.store.generation(identity.as_str());
        let value = fetch().await?;
        if self.config.enabled {
            self.store
                .set_json_if_generation(identity.as_str(), generation, key, &value, ttl);
        }
        Ok(value)
    }
}

fn to_payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        warn!(
            target = "voxline::dashboard",
            error = %err,
            "Pushing mutation without a payload: serialization failed"
        );
        serde_json::Value::Null
    })
}
