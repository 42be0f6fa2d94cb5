use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::dashboard::{DashboardError, RecordCallCommand, UpsertAgentCommand};
use crate::application::repos::{CallPage, RepoError};
use crate::domain::entities::{AnalyticsSummary, DashboardStats};
use crate::domain::error::DomainError;
use crate::infra::http::AppState;

use super::Principal;
use super::error::{ApiError, codes};
use super::models::*;

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = state
        .dashboard
        .stats(&principal.identity)
        .await
        .map_err(dashboard_to_api)?;
    Ok(Json(stats))
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    let summary = state
        .dashboard
        .analytics(&principal.identity, query.agent_id, query.days)
        .await
        .map_err(dashboard_to_api)?;
    Ok(Json(summary))
}

pub async fn list_calls(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CallsQuery>,
) -> Result<Json<CallPage>, ApiError> {
    let page = state
        .dashboard
        .search_calls(&principal.identity, query.q, query.page)
        .await
        .map_err(dashboard_to_api)?;
    Ok(Json(page))
}

pub async fn create_call(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CallCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = RecordCallCommand {
        agent_id: payload.agent_id,
        caller: payload.caller,
        status: payload.status,
        duration_secs: payload.duration_secs,
        summary: payload.summary,
    };
    let record = state
        .dashboard
        .record_call(&principal.identity, command)
        .await
        .map_err(dashboard_to_api)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_agents(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<AgentListResponse>, ApiError> {
    let agents = state
        .dashboard
        .agents(&principal.identity)
        .await
        .map_err(dashboard_to_api)?;
    Ok(Json(AgentListResponse { agents }))
}

pub async fn put_agent(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AgentUpsertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = UpsertAgentCommand {
        id,
        name: payload.name,
        voice: payload.voice,
        active: payload.active,
    };
    let (agent, created) = state
        .dashboard
        .upsert_agent(&principal.identity, command)
        .await
        .map_err(dashboard_to_api)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(agent)))
}

pub async fn send_notification(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<NotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sent = state
        .dashboard
        .notify(
            &principal.identity,
            &payload.title,
            &payload.message,
            payload.severity,
        )
        .map_err(dashboard_to_api)?;
    Ok((StatusCode::ACCEPTED, Json(sent)))
}

fn dashboard_to_api(err: DashboardError) -> ApiError {
    match err {
        DashboardError::Domain(domain) => domain_to_api(domain),
        DashboardError::Repo(repo) => repo_to_api(repo),
    }
}

fn domain_to_api(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::VALIDATION,
            "Validation failed",
            Some(message),
        ),
        err @ DomainError::OutOfRange { .. } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::VALIDATION,
            "Value out of range",
            Some(err.to_string()),
        ),
    }
}

fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::TIMEOUT,
            "Storage timeout",
            None,
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(message),
        ),
    }
}
