//! Aggregations over call and agent records.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::entities::{AgentRecord, AnalyticsSummary, CallRecord, DashboardStats};
use crate::domain::types::CallStatus;

pub fn dashboard_stats(calls: &[CallRecord], agents: &[AgentRecord]) -> DashboardStats {
    let completed_calls = count(calls, |call| call.status == CallStatus::Completed);
    let failed_calls = count(calls, |call| call.status.is_failure());
    DashboardStats {
        total_calls: calls.len() as u64,
        completed_calls,
        failed_calls,
        active_agents: agents.iter().filter(|agent| agent.active).count() as u64,
        average_duration_secs: average_duration(calls.iter()),
    }
}

/// Summary of calls started within the last `window_days`, optionally for one
/// agent.
pub fn analytics(
    calls: &[CallRecord],
    agent_id: Option<Uuid>,
    window_days: u32,
    now: OffsetDateTime,
) -> AnalyticsSummary {
    let since = now - Duration::days(i64::from(window_days));
    let in_window: Vec<&CallRecord> = calls
        .iter()
        .filter(|call| call.started_at >= since)
        .filter(|call| agent_id.is_none_or(|agent| call.agent_id == agent))
        .collect();

    AnalyticsSummary {
        agent_id,
        window_days,
        calls: in_window.len() as u64,
        completed: in_window
            .iter()
            .filter(|call| call.status == CallStatus::Completed)
            .count() as u64,
        failed: in_window
            .iter()
            .filter(|call| call.status.is_failure())
            .count() as u64,
        average_duration_secs: average_duration(in_window.iter().copied()),
    }
}

fn count(calls: &[CallRecord], predicate: impl Fn(&CallRecord) -> bool) -> u64 {
    calls.iter().filter(|call| predicate(call)).count() as u64
}

fn average_duration<'a>(calls: impl Iterator<Item = &'a CallRecord>) -> f64 {
    let (total, n) = calls
        .filter(|call| call.status != CallStatus::InProgress)
        .fold((0_u64, 0_u64), |(total, n), call| {
            (total + u64::from(call.duration_secs), n + 1)
        });
    if n == 0 { 0.0 } else { total as f64 / n as f64 }
}
