// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory Replicator Service
//!
//! Tails the outbox CDC stream and replicates workspace tuples to the
//! relations service:
//! - CDC → JetStream → JetStreamEventSource → ReplicationConsumer → relations service
//! - after each event, `pg_notify` wakes the writer waiting on its txid
//!
//! Run with: cargo run --bin inventory-replicator
//!
//! Prerequisites:
//! 1. Postgres reachable via INVENTORY_DATABASE_URL
//! 2. NATS server running (NATS_URL, default: nats://localhost:4222)
//! 3. A relations service answering on INVENTORY_RELATIONS_SUBJECT

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use cim_inventory::{
    broadcast::PgClusterBroadcast,
    consumer::{JetStreamEventSource, ReplicationConsumer},
    events::event_channel,
    replication::{NatsRelationsReplicator, RelationReplicationService},
    schema::{InMemorySchemaRepository, SchemaService},
    store::PgStore,
    telemetry::init_tracing,
    transaction::{is_serialization_failure, RetryPolicy, TransactionManager},
    InventoryConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    info!("starting inventory replicator");

    let config = InventoryConfig::from_env().context("failed to load configuration")?;
    if !config.consumer.enabled {
        warn!("replication consumer disabled, exiting");
        return Ok(());
    }
    info!(
        stream = %config.jetstream.stream_name,
        subject = %config.jetstream.subject,
        relations = %config.relations.subject,
        "configuration loaded"
    );

    let store = PgStore::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    store.migrate().await.context("failed to apply migrations")?;

    let broadcast = PgClusterBroadcast::start(store.pool().clone(), &config.broadcast)
        .await
        .context("failed to start notification listener")?;
    let relations = NatsRelationsReplicator::connect(&config.relations)
        .await
        .context("failed to connect to relations service")?;

    let transactions = TransactionManager::new(
        Arc::new(store),
        RetryPolicy::new(config.database.max_serialization_retries)
            .with_predicate(is_serialization_failure),
    );
    let replication = RelationReplicationService::new(
        Arc::new(relations),
        SchemaService::new(Arc::new(InMemorySchemaRepository::new())),
    );
    let consumer = ReplicationConsumer::new(
        transactions,
        replication,
        Arc::new(broadcast),
        config.consumer.clone(),
    );
    let stats = consumer.stats();

    let (emitter, events) = event_channel(config.consumer.event_buffer_size);
    let source = JetStreamEventSource::connect(config.jetstream.clone(), emitter)
        .await
        .context("failed to set up JetStream CDC source")?;

    tokio::select! {
        result = source.run() => result.context("CDC source stopped")?,
        _ = consumer.run(events) => warn!("replication consumer stopped"),
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    let stats = stats.snapshot();
    info!(
        replicated = stats.replicated,
        failed = stats.failed,
        skipped = stats.skipped,
        retries = stats.retries,
        "inventory replicator stopped"
    );
    Ok(())
}
