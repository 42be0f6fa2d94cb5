//! Dashboard API behaviour through the full router: authentication, cached
//! reads, and invalidation on writes.

mod support;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;
use voxline::cache::{CacheConfig, keys};
use voxline_api_types::{ServerMessage, channels};

use support::{ALICE_TOKEN, BOB_TOKEN, build_app, call};

async fn create_agent(app: &support::TestApp, token: &str, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    let (status, _) = call(
        &app.router,
        Method::PUT,
        &format!("/api/v1/agents/{id}"),
        Some(token),
        Some(json!({ "name": name, "voice": "alloy" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    id
}

fn call_body(agent_id: Uuid, caller: &str, status: &str) -> Value {
    json!({
        "agent_id": agent_id,
        "caller": caller,
        "status": status,
        "duration_secs": 42,
        "summary": "asked about opening hours",
    })
}

#[tokio::test]
async fn requests_without_a_session_are_rejected() {
    let app = build_app(CacheConfig::default());

    let (status, body) = call(&app.router, Method::GET, "/api/v1/dashboard/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = call(
        &app.router,
        Method::GET,
        "/api/v1/dashboard/stats",
        Some("not-a-session"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn recording_a_call_purges_cached_stats_and_search() {
    let app = build_app(CacheConfig::default());
    let agent = create_agent(&app, ALICE_TOKEN, "Front desk").await;

    let (status, stats) =
        call(&app.router, Method::GET, "/api/v1/dashboard/stats", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_calls"], 0);
    let (_, page) = call(&app.router, Method::GET, "/api/v1/calls", Some(ALICE_TOKEN), None).await;
    assert_eq!(page["total"], 0);

    assert!(app.store.get(&keys::dashboard_stats("alice")).is_some());
    assert!(app.store.get(&keys::call_search("alice", "", 1)).is_some());

    let (status, created) = call(
        &app.router,
        Method::POST,
        "/api/v1/calls",
        Some(ALICE_TOKEN),
        Some(call_body(agent, "+15550100", "completed")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["caller"], "+15550100");

    assert!(app.store.get(&keys::dashboard_stats("alice")).is_none());
    assert!(app.store.get(&keys::call_search("alice", "", 1)).is_none());

    let (_, stats) =
        call(&app.router, Method::GET, "/api/v1/dashboard/stats", Some(ALICE_TOKEN), None).await;
    assert_eq!(stats["total_calls"], 1);
    assert_eq!(stats["completed_calls"], 1);
    let (_, page) = call(&app.router, Method::GET, "/api/v1/calls", Some(ALICE_TOKEN), None).await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn upserting_an_agent_purges_the_agent_list() {
    let app = build_app(CacheConfig::default());
    let agent = create_agent(&app, ALICE_TOKEN, "Front desk").await;

    let (_, listed) = call(&app.router, Method::GET, "/api/v1/agents", Some(ALICE_TOKEN), None).await;
    assert_eq!(listed["agents"][0]["name"], "Front desk");

    let (status, _) = call(
        &app.router,
        Method::PUT,
        &format!("/api/v1/agents/{agent}"),
        Some(ALICE_TOKEN),
        Some(json!({ "name": "Reception", "voice": "alloy", "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = call(&app.router, Method::GET, "/api/v1/agents", Some(ALICE_TOKEN), None).await;
    assert_eq!(listed["agents"][0]["name"], "Reception");
    assert_eq!(listed["agents"][0]["active"], false);
}

#[tokio::test]
async fn one_identity_never_sees_or_purges_another() {
    let app = build_app(CacheConfig::default());
    let alice_agent = create_agent(&app, ALICE_TOKEN, "Alice agent").await;
    create_agent(&app, BOB_TOKEN, "Bob agent").await;

    call(&app.router, Method::GET, "/api/v1/dashboard/stats", Some(BOB_TOKEN), None).await;
    assert!(app.store.get(&keys::dashboard_stats("bob")).is_some());

    call(
        &app.router,
        Method::POST,
        "/api/v1/calls",
        Some(ALICE_TOKEN),
        Some(call_body(alice_agent, "+15550101", "failed")),
    )
    .await;

    assert!(app.store.get(&keys::dashboard_stats("bob")).is_some());
    let (_, stats) =
        call(&app.router, Method::GET, "/api/v1/dashboard/stats", Some(BOB_TOKEN), None).await;
    assert_eq!(stats["total_calls"], 0);

    let (status, body) = call(
        &app.router,
        Method::PUT,
        &format!("/api/v1/agents/{alice_agent}"),
        Some(BOB_TOKEN),
        Some(json!({ "name": "Hijacked", "voice": "alloy" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "integrity_error");

    let (status, _) = call(
        &app.router,
        Method::POST,
        "/api/v1/calls",
        Some(BOB_TOKEN),
        Some(call_body(alice_agent, "+15550102", "completed")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_bounds_are_validated() {
    let app = build_app(CacheConfig::default());

    for uri in [
        "/api/v1/analytics?days=0",
        "/api/v1/analytics?days=366",
        "/api/v1/calls?page=0",
    ] {
        let (status, body) = call(&app.router, Method::GET, uri, Some(ALICE_TOKEN), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "validation_error", "{uri}");
    }

    let (status, summary) =
        call(&app.router, Method::GET, "/api/v1/analytics", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["window_days"], 7);
}

#[tokio::test]
async fn disabled_cache_serves_fresh_reads() {
    let config = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    let app = build_app(config);

    call(&app.router, Method::GET, "/api/v1/dashboard/stats", Some(ALICE_TOKEN), None).await;
    call(&app.router, Method::GET, "/api/v1/agents", Some(ALICE_TOKEN), None).await;
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn notifications_are_pushed_to_subscribed_connections() {
    let app = build_app(CacheConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = app.hub.register("alice", tx);
    assert!(app.hub.subscribe("alice", connection, channels::NOTIFICATIONS));

    let (status, sent) = call(
        &app.router,
        Method::POST,
        "/api/v1/notifications",
        Some(ALICE_TOKEN),
        Some(json!({ "title": "Call failed", "message": "No answer", "severity": "warning" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(sent["delivered"], 1);

    match rx.try_recv().expect("pushed notification") {
        ServerMessage::Notification(payload) => {
            assert_eq!(payload.title, "Call failed");
            assert_eq!(payload.id, sent["notification"]["id"]);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let (status, sent) = call(
        &app.router,
        Method::POST,
        "/api/v1/notifications",
        Some(BOB_TOKEN),
        Some(json!({ "title": "For bob only" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(sent["delivered"], 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn empty_notification_title_is_rejected() {
    let app = build_app(CacheConfig::default());
    let (status, _) = call(
        &app.router,
        Method::POST,
        "/api/v1/notifications",
        Some(ALICE_TOKEN),
        Some(json!({ "title": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
