//! Integration tests for the reclaim-web server.
//!
//! These tests start a real axum server on a random port and exercise
//! the REST endpoints against a live collector.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reclaim_rs::collector::{
    Collector, CollectorConfig, EvaluationTrigger, Visibility, VisibilitySignal,
};
use reclaim_rs::memory::{NoProbe, PressureState, ScriptedProbe};
use reclaim_web::{WebBroadcastHandler, WebConfig, WsMessage, spawn_web};
use tokio::sync::broadcast;

struct TestServer {
    collector: Arc<Collector>,
    visibility: VisibilitySignal,
    events: broadcast::Receiver<WsMessage>,
    base: String,
}

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server(collector: Collector) -> TestServer {
    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
        ..Default::default()
    };
    let (tx, events) = config.broadcast_channel();
    let collector = Arc::new(collector.with_event_handler(WebBroadcastHandler::new(tx.clone())));
    let visibility = VisibilitySignal::default();

    let addr = spawn_web(collector.clone(), visibility.clone(), None, tx, config)
        .await
        .unwrap();
    TestServer {
        collector,
        visibility,
        events,
        base: format!("http://{addr}"),
    }
}

fn no_probe() -> Collector {
    Collector::new(CollectorConfig::default(), Arc::new(NoProbe))
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn get_state_returns_snapshot() {
    let server = spawn_test_server(no_probe()).await;
    server.collector.registry().register("image-a");
    server.collector.registry().register("menu-a");

    let resp = reqwest::get(format!("{}/api/state", server.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["pressure"], "normal");
    assert!(json["memory"].is_null());
    assert_eq!(json["stats"]["live"], 2);
    assert_eq!(json["resources"].as_array().unwrap().len(), 2);
    assert_eq!(json["config"]["highMemoryThreshold"], 0.7);
}

#[tokio::test]
async fn get_state_reports_memory_when_probe_available() {
    let collector = Collector::new(
        CollectorConfig::default(),
        Arc::new(ScriptedProbe::from_usage(&[0.5], 1000)),
    );
    let server = spawn_test_server(collector).await;
    server.collector.evaluate(EvaluationTrigger::Manual);

    let json: serde_json::Value = reqwest::get(format!("{}/api/state", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["memory"]["used"], 500);
    assert_eq!(json["memory"]["probe"], "scripted");
}

#[tokio::test]
async fn collect_by_type_runs_only_matching_cleanups() {
    let server = spawn_test_server(no_probe()).await;
    let freed = Arc::new(AtomicUsize::new(0));
    for id in ["image-a", "image-b", "menu-a"] {
        let freed = freed.clone();
        server.collector.registry().register_with_cleanup(id, move || {
            freed.fetch_add(1, Ordering::SeqCst);
        });
    }

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/collect", server.base))
        .json(&serde_json::json!({"type": "image"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["collected"], 2);
    assert_eq!(freed.load(Ordering::SeqCst), 2);
    assert_eq!(server.collector.registry().ids(), vec!["menu-a".to_string()]);
}

#[tokio::test]
async fn collect_without_body_evicts_everything() {
    let server = spawn_test_server(no_probe()).await;
    server.collector.registry().register("image-a");
    server.collector.registry().register("tooltip-a");

    let resp = reqwest::Client::new()
        .post(format!("{}/api/collect", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["collected"], 2);
    assert!(server.collector.registry().is_empty());
}

#[tokio::test]
async fn collect_rejects_conflicting_filters() {
    let server = spawn_test_server(no_probe()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/collect", server.base))
        .json(&serde_json::json!({"type": "image", "idle_secs": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn collect_broadcasts_event() {
    let mut server = spawn_test_server(no_probe()).await;
    server.collector.registry().register("image-a");

    reqwest::Client::new()
        .post(format!("{}/api/collect", server.base))
        .send()
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), server.events.recv())
        .await
        .unwrap()
        .unwrap();
    let json = serde_json::to_value(msg).unwrap();
    assert_eq!(json["type"], "collected");
    assert_eq!(json["trigger"], "manual");
    assert_eq!(json["ids"][0], "image-a");
}

#[tokio::test]
async fn touch_returns_204_or_404() {
    let server = spawn_test_server(no_probe()).await;
    server.collector.registry().register("image-a");
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/resources/image-a/touch", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .post(format!("{}/api/resources/image-missing/touch", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resources: serde_json::Value = client
        .get(format!("{}/api/resources", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // Registration counts as one touch by default.
    assert_eq!(resources[0]["touch_count"], 2);
}

#[tokio::test]
async fn post_visibility_publishes_to_signal() {
    let server = spawn_test_server(no_probe()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/visibility", server.base))
        .json(&serde_json::json!({"visible": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["visibility"], "hidden");
    assert_eq!(json["changed"], true);
    assert_eq!(server.visibility.current(), Visibility::Hidden);

    let json: serde_json::Value = client
        .post(format!("{}/api/visibility", server.base))
        .json(&serde_json::json!({"visible": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["changed"], false);
}

#[tokio::test]
async fn evaluate_auto_collects_on_high_usage() {
    let collector = Collector::new(
        CollectorConfig::default(),
        Arc::new(ScriptedProbe::from_usage(&[0.9], 1000)),
    );
    let server = spawn_test_server(collector).await;
    server.collector.registry().register("image-a");

    let json: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/api/evaluate", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["trigger"], "manual");
    assert_eq!(json["state"], "high_usage");
    assert_eq!(json["auto_collected"], 1);
    assert!(server.collector.registry().is_empty());
}

#[tokio::test]
async fn evaluate_schedules_a_recheck_after_auto_collect() {
    let collector = Collector::new(
        CollectorConfig::new()
            .with_snapshot_throttle(Duration::ZERO)
            .with_recheck_delay(Duration::from_millis(50)),
        Arc::new(ScriptedProbe::from_usage(&[0.9, 0.5], 1000)),
    );
    let server = spawn_test_server(collector).await;
    server.collector.registry().register("image-a");

    let resp = reqwest::Client::new()
        .post(format!("{}/api/evaluate", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        server.collector.pressure_state(),
        PressureState::HighUsage
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.collector.pressure_state(), PressureState::Normal);
}
