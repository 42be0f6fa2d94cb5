//! Installs a global recorder, so it lives in its own test binary.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use tokio::sync::mpsc;
use voxline::cache::{
    CacheConfig, CacheStore, InvalidationBridge, METRIC_BRIDGE_APPLY_MS, METRIC_CACHE_HIT,
    METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS, METRIC_CACHE_SWEPT,
};
use voxline::infra::telemetry;
use voxline::realtime::{
    ConnectionHub, METRIC_PUSH_DELIVERED, METRIC_PUSH_FAILED, METRIC_WS_CONNECTIONS,
};
use voxline_api_types::channels;

#[tokio::test(start_paused = true)]
async fn cache_and_push_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let store = Arc::new(CacheStore::new());
    store.set("dashboard:stats:alice", json!({"total_calls": 1}), Duration::from_secs(300));
    store.set("user:agents:alice", json!([]), Duration::from_secs(1));
    assert!(store.get("dashboard:stats:alice").is_some());
    assert!(store.get("calls:search:alice::1").is_none());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(store.sweep_expired(), 1);

    let hub = Arc::new(ConnectionHub::new());
    let (live_tx, _live_rx) = mpsc::unbounded_channel();
    let live = hub.register("alice", live_tx);
    hub.subscribe("alice", live, channels::CALLS);
    let (dead_tx, dead_rx) = mpsc::unbounded_channel();
    let dead = hub.register("alice", dead_tx);
    hub.subscribe("alice", dead, channels::CALLS);
    drop(dead_rx);

    let bridge = InvalidationBridge::new(CacheConfig::default(), store.clone(), hub.clone());
    let report = bridge.calls_changed("alice", json!({"id": "call-1"}));
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert!(store.get("dashboard:stats:alice").is_none());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [
        METRIC_CACHE_HIT,
        METRIC_CACHE_MISS,
        METRIC_CACHE_INVALIDATED,
        METRIC_CACHE_SWEPT,
        METRIC_WS_CONNECTIONS,
        METRIC_PUSH_DELIVERED,
        METRIC_PUSH_FAILED,
        METRIC_BRIDGE_APPLY_MS,
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }
}
