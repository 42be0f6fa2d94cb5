use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voxline_api_types::Severity;

use crate::domain::entities::AgentRecord;
use crate::domain::types::CallStatus;

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub agent_id: Option<Uuid>,
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CallsQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CallCreateRequest {
    pub agent_id: Uuid,
    pub caller: String,
    pub status: CallStatus,
    #[serde(default)]
    pub duration_secs: u32,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AgentUpsertRequest {
    pub name: String,
    pub voice: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentRecord>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NotificationRequest {
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}
