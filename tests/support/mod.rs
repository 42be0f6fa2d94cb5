#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use voxline::application::dashboard::DashboardService;
use voxline::application::sessions::StaticSessions;
use voxline::cache::{CacheConfig, CacheStore, InvalidationBridge};
use voxline::domain::types::Identity;
use voxline::infra::http::{AppState, build_router};
use voxline::infra::memory::InMemoryRepositories;
use voxline::realtime::{ChannelPolicy, ConnectionHub};

pub const ALICE_TOKEN: &str = "alice-session-token";
pub const BOB_TOKEN: &str = "bob-session-token";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<CacheStore>,
    pub hub: Arc<ConnectionHub>,
}

pub fn build_app(config: CacheConfig) -> TestApp {
    let store = Arc::new(CacheStore::new());
    let hub = Arc::new(ConnectionHub::new());
    let bridge = Arc::new(InvalidationBridge::new(config, store.clone(), hub.clone()));
    let repos = Arc::new(InMemoryRepositories::new());
    let dashboard = Arc::new(DashboardService::new(
        config,
        store.clone(),
        bridge,
        repos.clone(),
        repos.clone(),
        repos,
    ));
    let sessions = StaticSessions::new([
        (ALICE_TOKEN, Identity::new("alice")),
        (BOB_TOKEN, Identity::new("bob")),
    ]);

    let state = AppState {
        dashboard,
        sessions: Arc::new(sessions),
        hub: hub.clone(),
        policy: Arc::new(ChannelPolicy::default()),
    };

    TestApp {
        router: build_router(state),
        store,
        hub,
    }
}

/// Issue one request through the router and decode the JSON body, if any.
pub async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
