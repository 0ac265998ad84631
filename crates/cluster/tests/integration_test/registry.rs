use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use cdp_cluster::registry::{CLEANUP_TASK, HEARTBEAT_TASK};
use cdp_cluster::{ClusterNode, ClusterRegistry};
use cdp_core::config::ClusterConfig;
use cdp_core::CdpError;

use crate::helpers::*;

#[tokio::test]
async fn init_registers_node_with_sanitised_stats() {
    let persistence = persistence();
    let registry = node("node-a", &persistence).await;

    let nodes = registry.get_cluster_nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    let me = &nodes[0];
    assert_eq!(me.item_id, "node-a");
    assert_eq!(me.public_host_address, "http://localhost:8181");
    assert_eq!(me.cpu_load, 0.25);
    assert_eq!(me.load_average, [1.0, 0.5, 0.0]);
    assert_eq!(me.uptime, 60_000);
    assert!(me.last_heartbeat > 0);
}

#[tokio::test]
async fn blank_node_id_is_rejected() {
    let persistence = persistence();
    let err = ClusterRegistry::init(&cluster_config("   "), persistence.clone(), fixed_stats())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CdpError::InvalidNodeConfiguration(_)));
    assert!(persistence.load::<ClusterNode>("   ", None).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_peers_are_evicted() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let b = node("node-b", &persistence).await;
    let c = node("node-c", &persistence).await;

    let t0 = Utc::now();
    for n in [&a, &b, &c] {
        n.heartbeat_at(t0).await.unwrap();
    }
    let t1 = t0 + ChronoDuration::seconds(40);
    a.heartbeat_at(t1).await.unwrap();
    c.heartbeat_at(t1).await.unwrap();

    let evicted = a.evict_stale_nodes_at(t1).await.unwrap();
    assert_eq!(evicted, vec!["node-b".to_string()]);

    let ids: Vec<String> = a
        .get_cluster_nodes()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.item_id)
        .collect();
    assert_eq!(ids, vec!["node-a", "node-c"]);
}

#[tokio::test]
async fn fresh_peers_survive_cleanup() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let b = node("node-b", &persistence).await;

    let t0 = Utc::now();
    a.heartbeat_at(t0).await.unwrap();
    b.heartbeat_at(t0).await.unwrap();

    // 25s is within three 10s periods.
    let evicted = a.evict_stale_nodes_at(t0 + ChronoDuration::seconds(25)).await.unwrap();
    assert!(evicted.is_empty());
}

#[tokio::test]
async fn node_never_evicts_itself() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    a.heartbeat_at(Utc::now() - ChronoDuration::hours(1)).await.unwrap();

    let evicted = a.evict_stale_nodes().await.unwrap();
    assert!(evicted.is_empty());
    assert_eq!(a.get_cluster_nodes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn coordinator_is_smallest_live_id() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let b = node("node-b", &persistence).await;

    let t0 = Utc::now();
    a.heartbeat_at(t0).await.unwrap();
    b.heartbeat_at(t0).await.unwrap();
    assert!(a.is_coordinator_at(t0).await.unwrap());
    assert!(!b.is_coordinator_at(t0).await.unwrap());

    // node-a stops heartbeating; node-b takes over once it is stale.
    let later = t0 + ChronoDuration::seconds(45);
    b.heartbeat_at(later).await.unwrap();
    assert!(b.is_coordinator_at(later).await.unwrap());
}

#[tokio::test]
async fn destroy_deregisters_node() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let b = node("node-b", &persistence).await;

    b.destroy().await.unwrap();

    let nodes = a.get_cluster_nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].item_id, "node-a");
}

#[tokio::test]
async fn scheduler_receives_heartbeat_and_cleanup_tasks() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let scheduler = RecordingScheduler::default();

    a.attach_scheduler(&scheduler);
    {
        let tasks = scheduler.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 2);
        let heartbeat = tasks.iter().find(|t| t.name == HEARTBEAT_TASK).unwrap();
        assert_eq!(heartbeat.period, Duration::from_secs(10));
        assert!(heartbeat.run_immediately);
        let cleanup = tasks.iter().find(|t| t.name == CLEANUP_TASK).unwrap();
        assert_eq!(cleanup.period, Duration::from_secs(60));
        assert!(!cleanup.run_immediately);
    }

    a.heartbeat_at(Utc::now() - ChronoDuration::hours(1)).await.unwrap();
    let before = persistence.load::<ClusterNode>("node-a", None).await.unwrap().unwrap();
    (scheduler.task(HEARTBEAT_TASK))().await;
    let after = persistence.load::<ClusterNode>("node-a", None).await.unwrap().unwrap();
    assert!(after.last_heartbeat > before.last_heartbeat);

    a.detach_scheduler();
    assert!(scheduler.is_cancelled(HEARTBEAT_TASK));
    assert!(scheduler.is_cancelled(CLEANUP_TASK));
}

#[tokio::test]
async fn cleanup_task_evicts_through_scheduler() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let b = node("node-b", &persistence).await;
    b.heartbeat_at(Utc::now() - ChronoDuration::minutes(5)).await.unwrap();

    let scheduler = RecordingScheduler::default();
    a.attach_scheduler(&scheduler);
    (scheduler.task(CLEANUP_TASK))().await;

    assert!(persistence.load::<ClusterNode>("node-b", None).await.unwrap().is_none());
}

#[tokio::test]
async fn tasks_are_noops_after_registry_is_dropped() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let scheduler = RecordingScheduler::default();
    a.attach_scheduler(&scheduler);

    let stale = Utc::now() - ChronoDuration::hours(1);
    a.heartbeat_at(stale).await.unwrap();
    drop(a);

    (scheduler.task(HEARTBEAT_TASK))().await;
    let stored = persistence.load::<ClusterNode>("node-a", None).await.unwrap().unwrap();
    assert_eq!(stored.last_heartbeat, stale.timestamp_millis());
}

#[tokio::test]
async fn reattach_cancels_tasks_from_previous_scheduler() {
    let persistence = persistence();
    let a = node("node-a", &persistence).await;
    let first = RecordingScheduler::default();
    let second = RecordingScheduler::default();

    a.attach_scheduler(&first);
    a.attach_scheduler(&second);

    assert!(first.is_cancelled(HEARTBEAT_TASK));
    assert!(first.is_cancelled(CLEANUP_TASK));
    assert!(!second.is_cancelled(HEARTBEAT_TASK));
    assert!(!second.is_cancelled(CLEANUP_TASK));

    a.detach_scheduler();
    assert!(second.is_cancelled(HEARTBEAT_TASK));
    assert!(second.is_cancelled(CLEANUP_TASK));
}

#[tokio::test]
async fn huge_heartbeat_period_treats_nothing_as_stale() {
    let persistence = persistence();
    let peer = node("node-b", &persistence).await;
    peer.heartbeat_at(Utc::now() - ChronoDuration::days(365)).await.unwrap();

    // Stale windows past chrono's date range and past its duration range.
    for heartbeat_ms in [10_000_000_000_000_000u64, u64::MAX / 2] {
        let config = ClusterConfig {
            heartbeat_ms,
            ..cluster_config("node-a")
        };
        let a = ClusterRegistry::init(&config, persistence.clone(), fixed_stats())
            .await
            .unwrap();
        assert!(a.evict_stale_nodes().await.unwrap().is_empty());
        assert!(a.is_coordinator().await.unwrap());
    }
    assert!(persistence.load::<ClusterNode>("node-b", None).await.unwrap().is_some());
}
