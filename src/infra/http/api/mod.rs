//! `/api/v1`: dashboard reads served through the response cache and the
//! writes that drive invalidation and push.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

pub use middleware::Principal;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use super::AppState;

pub fn build_api_router(state: AppState) -> Router {
    let auth_state = state.clone();

    Router::new()
        .route("/api/v1/dashboard/stats", get(handlers::get_stats))
        .route("/api/v1/analytics", get(handlers::get_analytics))
        .route(
            "/api/v1/calls",
            get(handlers::list_calls).post(handlers::create_call),
        )
        .route("/api/v1/agents", get(handlers::list_agents))
        .route("/api/v1/agents/{id}", put(handlers::put_agent))
        .route("/api/v1/notifications", post(handlers::send_notification))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_auth,
        ))
}
