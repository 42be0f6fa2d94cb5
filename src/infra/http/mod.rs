//! HTTP surface: the WebSocket endpoint, the dashboard JSON API and health.

pub mod api;
mod middleware;
mod ws;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::dashboard::DashboardService;
use crate::application::sessions::SessionVerifier;
use crate::realtime::{ChannelPolicy, ConnectionHub};

pub use middleware::{RequestContext, log_responses, set_request_context};

/// Shared handles for every route.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<DashboardService>,
    pub sessions: Arc<dyn SessionVerifier>,
    pub hub: Arc<ConnectionHub>,
    pub policy: Arc<ChannelPolicy>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::upgrade))
        .with_state(state.clone())
        .merge(api::build_api_router(state))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
