//! Stats actor behaviour seen from the outside: persistence across restarts,
//! upstream reporting from the dispatcher, and the day histogram.

use crate::mock_infrastructure::{
    scripted,
    test_helpers::{FALLBACK, PRIMARY, T0_MS},
    TestEdge,
};
use sanctos_core::{
    config::StatsConfig,
    stats::{spawn_stats_actor, CacheLane, FileStatsStorage, StatsEvent, TrafficLane},
    utils::ManualClock,
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

const DAY: Duration = Duration::from_secs(86_400);

#[tokio::test]
async fn test_counters_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats/state.json");
    let clock = ManualClock::shared(T0_MS);
    let config = StatsConfig::default();

    let (stats, task) =
        spawn_stats_actor(Arc::new(FileStatsStorage::new(&path)), clock.clone(), &config);
    stats
        .bump_and_wait(StatsEvent::Traffic { lane: TrafficLane::RpcPost, post: true })
        .await
        .unwrap();
    stats.bump_and_wait(StatsEvent::Cache { lane: CacheLane::Hit, n: 2 }).await.unwrap();
    stats
        .bump_and_wait(StatsEvent::Methods { methods: vec!["getSlot".to_string()] })
        .await
        .unwrap();
    let before = stats.get().await.unwrap();
    task.abort();
    assert!(path.exists());

    clock.advance(Duration::from_secs(120));
    let (stats, _task) =
        spawn_stats_actor(Arc::new(FileStatsStorage::new(&path)), clock.clone(), &config);
    let after = stats.get().await.unwrap();

    assert_eq!(after.start_time, before.start_time);
    assert_eq!(after.start_time, T0_MS);
    assert_eq!(after.total_requests, 1);
    assert_eq!(after.total_post_requests, 1);
    assert_eq!(after.cache_hits, 2);
    assert_eq!(after.methods_all_time.get("getSlot"), Some(&1));
    assert_eq!(after.traffic.totals.get("rpcPost"), Some(&1));
    // The rate window has moved on.
    assert_eq!(after.traffic.last60.get("rpcPost"), Some(&0));

    let ping = stats.ping().await.unwrap();
    assert!(ping.ok);
    assert_eq!(ping.start_time, T0_MS);
}

#[tokio::test]
async fn test_corrupt_state_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{ truncated").unwrap();

    let clock = ManualClock::shared(T0_MS + 5_000);
    let (stats, _task) =
        spawn_stats_actor(Arc::new(FileStatsStorage::new(&path)), clock, &StatsConfig::default());

    let snapshot = stats.get().await.unwrap();
    assert_eq!(snapshot.start_time, T0_MS + 5_000);
    assert_eq!(snapshot.total_requests, 0);
    assert!(!snapshot.degraded);

    let rewritten: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(rewritten["startTime"], json!(T0_MS + 5_000));
}

#[tokio::test]
async fn test_dispatcher_reports_last_upstream() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::status(503));
    edge.transport.set(FALLBACK, scripted::constant(json!(1)));

    edge.call("getSlot", json!([])).await;
    let snapshot = edge.snapshot().await;
    assert_eq!(snapshot.last_upstream_url, FALLBACK);
    assert_eq!(snapshot.last_upstream_status, 200);
    assert_eq!(snapshot.last_upstream_ok_at, T0_MS);
    assert_eq!(snapshot.last_upstream_error, "");
    assert_eq!(snapshot.last_upstream_error_at, T0_MS);

    edge.advance_secs(5);
    edge.transport.set(FALLBACK, scripted::fail());
    edge.call("getLatestBlockhash", json!([])).await;
    let snapshot = edge.snapshot().await;
    assert_eq!(snapshot.last_upstream_status, 0);
    assert!(snapshot.last_upstream_error.starts_with("Connection failed"));
    assert_eq!(snapshot.last_upstream_error_at, T0_MS + 5_000);
}

#[tokio::test]
async fn test_method_days_roll_and_prune() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(1)));

    for _ in 0..12 {
        edge.call("getSlot", json!([])).await;
        edge.clock.advance(DAY);
    }
    edge.call("getBalance", json!(["addr"])).await;

    let snapshot = edge.snapshot().await;
    assert_eq!(snapshot.methods_by_day.len(), StatsConfig::default().retained_days);
    assert_eq!(snapshot.methods_all_time.get("getSlot"), Some(&12));
    assert_eq!(snapshot.today, "2024-01-13");
    assert_eq!(snapshot.today_counts.get("getBalance"), Some(&1));
    assert!(!snapshot.methods_by_day.contains_key("2024-01-01"));
    assert!(edge.storage.save_count() > 0);
}
