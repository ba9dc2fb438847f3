// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for outbox → consumer → relations replication
//!
//! The in-memory store plays the CDC reader: every committed outbox row is
//! emitted to a bounded channel drained by a background
//! `ReplicationConsumer`, which replicates to `InMemoryRelations` and
//! signals the writer through `InProcessBroadcast`.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use cim_inventory::consumer::ConsumerStats;
use cim_inventory::service::ResourceService;
use cim_inventory::store::Store;
use cim_inventory::tuples::RelationsTuple;
use fixtures::*;

fn workspace_tuple(workspace_id: &str) -> RelationsTuple {
    RelationsTuple::workspace(&key(), workspace_id)
}

/// Wait until the consumer has handled `n` tuple events
async fn processed(stats: &Arc<ConsumerStats>, n: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = stats.snapshot();
            if snapshot.replicated + snapshot.failed >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer did not catch up");
}

#[tokio::test]
async fn test_consistent_write_returns_after_replication() {
    let config = read_after_write_config();
    let harness = Harness::new(&config);
    harness.start_consumer(&config).await;

    let response = harness
        .service
        .report_resource(consistent_report("workspace-1"))
        .await
        .unwrap();

    assert!(response.replicated);
    assert!(harness.relations.contains(&workspace_tuple("workspace-1")));

    let mut tx = harness.store.begin().await.unwrap();
    let resource = tx.repository().find_resource_by_keys(&key()).await.unwrap();
    assert_eq!(
        resource.consistency_token().map(|t| t.as_str().to_string()),
        Some("ktn-1".to_string())
    );
}

#[tokio::test]
async fn test_workspace_move_replaces_tuple() {
    let config = read_after_write_config();
    let harness = Harness::new(&config);
    harness.start_consumer(&config).await;

    for workspace in ["workspace-1", "workspace-2"] {
        let response = harness
            .service
            .report_resource(consistent_report(workspace))
            .await
            .unwrap();
        assert!(response.replicated);
    }

    assert_eq!(harness.relations.tuples(), vec![workspace_tuple("workspace-2")]);
    assert_eq!(harness.relations.mutations(), 2);
}

#[tokio::test]
async fn test_unchanged_workspace_sends_nothing() {
    let config = read_after_write_config();
    let harness = Harness::new(&config);
    let stats = harness.start_consumer(&config).await;

    for _ in 0..2 {
        let response = harness
            .service
            .report_resource(consistent_report("workspace-1"))
            .await
            .unwrap();
        assert!(response.replicated);
    }

    assert_eq!(harness.relations.mutations(), 1);
    assert_eq!(stats.snapshot().replicated, 2);
}

#[tokio::test]
async fn test_delete_then_revive_restores_tuple() {
    let config = read_after_write_config();
    let harness = Harness::new(&config);
    let stats = harness.start_consumer(&config).await;

    harness
        .service
        .report_resource(consistent_report("workspace-1"))
        .await
        .unwrap();
    harness.service.delete_resource(delete()).await.unwrap();
    processed(&stats, 2).await;
    assert!(harness.relations.is_empty());

    let revived = harness
        .service
        .report_resource(consistent_report("workspace-1"))
        .await
        .unwrap();
    assert!(revived.replicated);
    assert!(harness.relations.contains(&workspace_tuple("workspace-1")));
}

#[tokio::test(start_paused = true)]
async fn test_relations_outage_is_retried_with_backoff() {
    let config = read_after_write_config();
    let harness = Harness::new(&config);
    let stats = harness.start_consumer(&config).await;
    harness.relations.fail_next(2);

    let response = harness
        .service
        .report_resource(consistent_report("workspace-1"))
        .await
        .unwrap();

    assert!(response.replicated);
    assert!(harness.relations.contains(&workspace_tuple("workspace-1")));
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.retries, 2);
    assert_eq!(snapshot.replicated, 1);
}

#[tokio::test(start_paused = true)]
async fn test_give_up_still_releases_writer() {
    let mut config = read_after_write_config();
    config.consumer.max_retries = 1;
    let harness = Harness::new(&config);
    let stats = harness.start_consumer(&config).await;
    harness.relations.fail_next(10);

    let started = tokio::time::Instant::now();
    let response = harness
        .service
        .report_resource(consistent_report("workspace-1"))
        .await
        .unwrap();

    assert!(response.replicated);
    assert!(started.elapsed() < config.broadcast.wait_timeout);
    assert!(harness.relations.is_empty());
    assert_eq!(stats.snapshot().failed, 1);
}
