//! In-memory repository adapter.
//!
//! Keeps the binary and the test suite self-contained. Every operation is one
//! short synchronous critical section.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    AgentUpserted, AgentsRepo, CallPage, CallSearch, CallsRepo, CreateCallParams, RepoError,
    StatsRepo, UpsertAgentParams,
};
use crate::cache::{mutex_lock, rw_read, rw_write};
use crate::domain::entities::{AgentRecord, AnalyticsSummary, CallRecord, DashboardStats};
use crate::domain::stats;
use crate::domain::types::Identity;

const SOURCE: &str = "infra::memory";

#[derive(Default)]
pub struct InMemoryRepositories {
    calls: Mutex<Vec<CallRecord>>,
    agents: RwLock<HashMap<Uuid, AgentRecord>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls_of(&self, identity: &Identity) -> Vec<CallRecord> {
        mutex_lock(&self.calls, SOURCE, "calls_of")
            .iter()
            .filter(|call| &call.identity == identity)
            .cloned()
            .collect()
    }

    fn agents_of(&self, identity: &Identity) -> Vec<AgentRecord> {
        let mut agents: Vec<AgentRecord> = rw_read(&self.agents, SOURCE, "agents_of")
            .values()
            .filter(|agent| &agent.identity == identity)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        agents
    }
}

#[async_trait]
impl CallsRepo for InMemoryRepositories {
    async fn search_calls(
        &self,
        identity: &Identity,
        search: &CallSearch,
    ) -> Result<CallPage, RepoError> {
        if search.page == 0 || search.per_page == 0 {
            return Err(RepoError::invalid_input("page and per_page start at 1"));
        }
        let mut matching: Vec<CallRecord> = self
            .calls_of(identity)
            .into_iter()
            .filter(|call| call.matches(&search.query))
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = matching.len() as u64;
        let skip = ((search.page - 1) as usize).saturating_mul(search.per_page as usize);
        let items = matching
            .into_iter()
            .skip(skip)
            .take(search.per_page as usize)
            .collect();

        Ok(CallPage {
            items,
            page: search.page,
            per_page: search.per_page,
            total,
        })
    }

    async fn list_calls(&self, identity: &Identity) -> Result<Vec<CallRecord>, RepoError> {
        Ok(self.calls_of(identity))
    }

    async fn create_call(
        &self,
        identity: &Identity,
        params: CreateCallParams,
    ) -> Result<CallRecord, RepoError> {
        let owns_agent = rw_read(&self.agents, SOURCE, "create_call.agent")
            .get(&params.agent_id)
            .is_some_and(|agent| &agent.identity == identity);
        if !owns_agent {
            return Err(RepoError::invalid_input(format!(
                "unknown agent {}",
                params.agent_id
            )));
        }

        let record = CallRecord {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            agent_id: params.agent_id,
            caller: params.caller,
            status: params.status,
            duration_secs: params.duration_secs,
            started_at: params.started_at,
            summary: params.summary,
        };
        mutex_lock(&self.calls, SOURCE, "create_call").push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl AgentsRepo for InMemoryRepositories {
    async fn list_agents(&self, identity: &Identity) -> Result<Vec<AgentRecord>, RepoError> {
        Ok(self.agents_of(identity))
    }

    async fn upsert_agent(
        &self,
        identity: &Identity,
        params: UpsertAgentParams,
    ) -> Result<AgentUpserted, RepoError> {
        let mut agents = rw_write(&self.agents, SOURCE, "upsert_agent");
        if let Some(existing) = agents.get(&params.id)
            && &existing.identity != identity
        {
            return Err(RepoError::Integrity {
                message: format!("agent {} belongs to another identity", params.id),
            });
        }

        let agent = AgentRecord {
            id: params.id,
            identity: identity.clone(),
            name: params.name,
            voice: params.voice,
            active: params.active,
            updated_at: OffsetDateTime::now_utc(),
        };
        let created = agents.insert(agent.id, agent.clone()).is_none();
        Ok(AgentUpserted { agent, created })
    }
}

#[async_trait]
impl StatsRepo for InMemoryRepositories {
    async fn dashboard_stats(&self, identity: &Identity) -> Result<DashboardStats, RepoError> {
        Ok(stats::dashboard_stats(
            &self.calls_of(identity),
            &self.agents_of(identity),
        ))
    }

    async fn analytics(
        &self,
        identity: &Identity,
        agent_id: Option<Uuid>,
        window_days: u32,
    ) -> Result<AnalyticsSummary, RepoError> {
        Ok(stats::analytics(
            &self.calls_of(identity),
            agent_id,
            window_days,
            OffsetDateTime::now_utc(),
        ))
    }
}
