// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for the Postgres store and LISTEN/NOTIFY broadcast
//!
//! These tests need a reachable Postgres; point `INVENTORY_DATABASE_URL`
//! at it and run with `cargo test -- --ignored`. Every test works on its
//! own freshly generated key, so they can share one database.

mod fixtures;

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use cim_inventory::aggregate::{DeleteResourceCommand, Resource, ResourceReport};
use cim_inventory::broadcast::{ClusterBroadcast, InProcessBroadcast, PgClusterBroadcast};
use cim_inventory::domain::{ReporterResourceKey, TransactionId};
use cim_inventory::events::OperationType;
use cim_inventory::service::{OutboxResourceService, ResourceService, ServiceError};
use cim_inventory::store::{PgStore, Store};
use cim_inventory::transaction::{is_serialization_failure, RetryPolicy, TransactionManager};
use cim_inventory::{InventoryConfig, InventoryError};
use fixtures::*;

async fn store() -> PgStore {
    let config = InventoryConfig::from_env().expect("valid environment");
    let store = PgStore::connect(&config.database)
        .await
        .expect("Postgres reachable");
    store.migrate().await.expect("schema applied");
    store
}

fn unique_key() -> ReporterResourceKey {
    key_for(&Uuid::now_v7().to_string())
}

fn service(store: &PgStore) -> OutboxResourceService {
    OutboxResourceService::new(
        TransactionManager::new(Arc::new(store.clone()), RetryPolicy::default()),
        schema(),
        Arc::new(InProcessBroadcast::new()),
        &InventoryConfig::default(),
    )
}

fn resource_report(workspace_id: &str) -> ResourceReport {
    ResourceReport {
        api_href: API_HREF.to_string(),
        console_href: None,
        reporter_version: None,
        reporter_data: document(json!({"satellite_id": SATELLITE_ID})),
        common_data: document(json!({"workspace_id": workspace_id})),
    }
}

async fn outbox_rows(store: &PgStore) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM outbox_events")
        .fetch_one(store.pool())
        .await
        .expect("outbox readable")
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_migrations_are_idempotent() {
    let store = store().await;
    store.migrate().await.unwrap();
    assert_eq!(outbox_rows(&store).await, 0);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_report_delete_revive() {
    let store = store().await;
    let service = service(&store);
    let key = unique_key();

    let created = service
        .report_resource(report_for(key.clone(), "workspace-1"))
        .await
        .unwrap();
    assert_eq!(created.operation, Some(OperationType::Created));
    let updated = service
        .report_resource(report_for(key.clone(), "workspace-2"))
        .await
        .unwrap();
    assert_eq!(updated.operation, Some(OperationType::Updated));

    service
        .delete_resource(DeleteResourceCommand {
            key: key.clone(),
            reporter_principal: REPORTER_PRINCIPAL.to_string(),
        })
        .await
        .unwrap();

    let mut tx = store.begin().await.unwrap();
    let repo = tx.repository();
    assert!(repo.find_resource_by_keys(&key).await.unwrap_err().is_not_found());
    let tombstoned = repo
        .find_tombstoned_resource_by_keys(&key)
        .await
        .unwrap()
        .expect("tombstoned row is still addressable");
    let latest = repo
        .find_latest_representations(&key)
        .await
        .unwrap()
        .expect("latest common document");
    assert_eq!(latest.workspace_id(), "workspace-2");
    tx.rollback().await.unwrap();

    let revived = service
        .report_resource(report_for(key.clone(), "workspace-3"))
        .await
        .unwrap();
    assert_eq!(revived.operation, Some(OperationType::Created));

    let mut tx = store.begin().await.unwrap();
    let resource = tx.repository().find_resource_by_keys(&key).await.unwrap();
    assert_eq!(resource.id(), tombstoned.id());
    assert_eq!(resource.common_version().value(), 2);
    let reporter = resource.reporter_resource(&key).expect("reporter resource");
    assert_eq!(reporter.generation.value(), 1);
    assert_eq!(reporter.representation_version.value(), 0);
    assert!(!reporter.tombstone);
    tx.rollback().await.unwrap();

    assert_eq!(outbox_rows(&store).await, 0);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_deleting_missing_key_is_not_found() {
    let store = store().await;
    let err = service(&store)
        .delete_resource(DeleteResourceCommand {
            key: unique_key(),
            reporter_principal: REPORTER_PRINCIPAL.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_client_transaction_id_is_recorded_once() {
    let store = store().await;
    let service = service(&store);
    let key = unique_key();
    let client_txid = format!("client-{}", Uuid::now_v7());

    let mut first = report_for(key.clone(), "workspace-1");
    first.transaction_id = Some(client_txid.clone());
    let mut replay = report_for(key.clone(), "workspace-2");
    replay.transaction_id = Some(client_txid.clone());

    service.report_resource(first).await.unwrap();
    let replayed = service.report_resource(replay).await.unwrap();
    assert!(replayed.is_replay());

    let mut tx = store.begin().await.unwrap();
    let repo = tx.repository();
    assert!(repo.contains_event_for_transaction_id(&client_txid).await.unwrap());
    assert!(!repo.contains_event_for_transaction_id("never-used").await.unwrap());
    let resource = repo.find_resource_by_keys(&key).await.unwrap();
    assert_eq!(resource.common_version().value(), 0);
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_failed_work_rolls_back_everything() {
    let store = store().await;
    let manager = TransactionManager::new(Arc::new(store.clone()), RetryPolicy::default());
    let key = unique_key();

    let work_key = key.clone();
    let err = manager
        .handle_serializable_transaction::<(), _>("test", move |repo| {
            let key = work_key.clone();
            Box::pin(async move {
                let resource = Resource::new(
                    repo.next_resource_id(),
                    key,
                    repo.next_reporter_resource_id(),
                    resource_report("workspace-1"),
                    TransactionId::new("tx-rollback"),
                );
                repo.save(&resource, OperationType::Created, &TransactionId::generate())
                    .await?;
                Err(InventoryError::Validation("rejected after save".into()))
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err.root(), InventoryError::Validation(_)));

    let mut tx = store.begin().await.unwrap();
    let repo = tx.repository();
    assert!(repo.find_resource_by_keys(&key).await.unwrap_err().is_not_found());
    assert!(!repo.contains_event_for_transaction_id("tx-rollback").await.unwrap());
    tx.rollback().await.unwrap();
    assert_eq!(outbox_rows(&store).await, 0);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_concurrent_update_is_serialization_failure() {
    let store = store().await;
    let key = unique_key();
    service(&store)
        .report_resource(report_for(key.clone(), "workspace-1"))
        .await
        .unwrap();

    let mut first_tx = store.begin().await.unwrap();
    let mut second_tx = store.begin().await.unwrap();
    let mut first = first_tx.repository().find_resource_by_keys(&key).await.unwrap();
    let mut second = second_tx.repository().find_resource_by_keys(&key).await.unwrap();

    let first_txid = TransactionId::generate();
    first
        .update(&key, resource_report("workspace-2"), first_txid.clone())
        .unwrap();
    first_tx
        .repository()
        .save(&first, OperationType::Updated, &first_txid)
        .await
        .unwrap();
    first_tx.commit().await.unwrap();

    let second_txid = TransactionId::generate();
    second
        .update(&key, resource_report("workspace-3"), second_txid.clone())
        .unwrap();
    let saved = second_tx
        .repository()
        .save(&second, OperationType::Updated, &second_txid)
        .await;
    let err = match saved {
        Err(err) => err,
        Ok(()) => second_tx.commit().await.unwrap_err(),
    };
    assert!(is_serialization_failure(&err), "unexpected error: {err}");
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_concurrent_reports_are_retried_to_completion() {
    let store = store().await;
    let service = service(&store);
    let key = unique_key();
    service
        .report_resource(report_for(key.clone(), "workspace-1"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        service.report_resource(report_for(key.clone(), "workspace-2")),
        service.report_resource(report_for(key.clone(), "workspace-3")),
    );
    a.unwrap();
    b.unwrap();

    let mut tx = store.begin().await.unwrap();
    let resource = tx.repository().find_resource_by_keys(&key).await.unwrap();
    assert_eq!(resource.common_version().value(), 2);
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_signal_reaches_waiter_on_another_instance() {
    let store = store().await;
    let config = InventoryConfig::default().broadcast;
    let waiting = PgClusterBroadcast::start(store.pool().clone(), &config)
        .await
        .unwrap();
    let signalling = PgClusterBroadcast::start(store.pool().clone(), &config)
        .await
        .unwrap();

    let txid = TransactionId::generate();
    let mut subscription = waiting.subscribe(txid.as_str());
    assert!(!signalling.table().contains(txid.as_str()));

    signalling.signal(txid.as_str()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("notification delivered")
        .unwrap();
}
