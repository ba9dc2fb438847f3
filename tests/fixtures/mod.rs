// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-inventory
//!
//! Deterministic keys and documents plus a [`Harness`] wiring the write
//! service and the replication consumer over in-memory collaborators.
//!
//! # Design Principles
//! - Keys, principals and documents are fixed constants
//! - Identifiers and write txids are generated by the code under test
//! - Every harness owns its own store, broadcast and relations fake

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;

use cim_inventory::aggregate::{DeleteResourceCommand, ReportResourceCommand, WriteVisibility};
use cim_inventory::broadcast::InProcessBroadcast;
use cim_inventory::consumer::{ConsumerStats, ReplicationConsumer};
use cim_inventory::domain::{ReporterResourceKey, ReporterType, Representation, ResourceType};
use cim_inventory::events::event_channel;
use cim_inventory::replication::{InMemoryRelations, RelationReplicationService};
use cim_inventory::schema::{
    FieldType, InMemorySchemaRepository, RequiredFieldsValidator, SchemaService,
};
use cim_inventory::service::OutboxResourceService;
use cim_inventory::store::InMemoryStore;
use cim_inventory::transaction::{RetryPolicy, TransactionManager};
use cim_inventory::InventoryConfig;

pub const LOCAL_RESOURCE_ID: &str = "dd1b73b9-3e33-4264-968c-e3ce55b9afec";
pub const RESOURCE_TYPE: &str = "host";
pub const REPORTER_TYPE: &str = "hbi";
pub const REPORTER_INSTANCE_ID: &str = "3088be62-1c60-4884-b133-9200542d0b3f";
pub const REPORTER_PRINCIPAL: &str = "svc-hbi";
pub const API_HREF: &str = "https://apiHref.com/";
pub const SATELLITE_ID: &str = "2c4196f1-0371-4f4c-8913-e113cfaa6e67";

pub fn key() -> ReporterResourceKey {
    key_for(LOCAL_RESOURCE_ID)
}

pub fn key_for(local_resource_id: &str) -> ReporterResourceKey {
    ReporterResourceKey::parse(
        local_resource_id,
        RESOURCE_TYPE,
        REPORTER_TYPE,
        REPORTER_INSTANCE_ID,
    )
    .expect("fixture key is valid")
}

pub fn document(value: Value) -> Representation {
    Representation::from_value(value).expect("fixture document is an object")
}

/// `host` requires a string `workspace_id`; `hbi` requires `satellite_id`
pub fn schema() -> SchemaService {
    let host = ResourceType::new(RESOURCE_TYPE).expect("valid resource type");
    let repository = InMemorySchemaRepository::new()
        .with_resource(
            host.clone(),
            Some(Arc::new(
                RequiredFieldsValidator::new().require("workspace_id", FieldType::String),
            )),
        )
        .with_reporter(
            host,
            ReporterType::new(REPORTER_TYPE).expect("valid reporter type"),
            Some(Arc::new(
                RequiredFieldsValidator::new().require("satellite_id", FieldType::String),
            )),
        );
    SchemaService::new(Arc::new(repository))
}

pub fn report(workspace_id: &str) -> ReportResourceCommand {
    report_for(key(), workspace_id)
}

pub fn report_for(key: ReporterResourceKey, workspace_id: &str) -> ReportResourceCommand {
    ReportResourceCommand {
        key,
        api_href: API_HREF.to_string(),
        console_href: None,
        reporter_version: Some("2.7.16".to_string()),
        reporter_representation: document(json!({"satellite_id": SATELLITE_ID})),
        common_representation: document(json!({"workspace_id": workspace_id})),
        transaction_id: None,
        write_visibility: WriteVisibility::Unspecified,
        reporter_principal: REPORTER_PRINCIPAL.to_string(),
    }
}

pub fn consistent_report(workspace_id: &str) -> ReportResourceCommand {
    ReportResourceCommand {
        write_visibility: WriteVisibility::Consistent,
        ..report(workspace_id)
    }
}

pub fn delete() -> DeleteResourceCommand {
    DeleteResourceCommand {
        key: key(),
        reporter_principal: REPORTER_PRINCIPAL.to_string(),
    }
}

/// Read-after-write enabled for the fixture principal
pub fn read_after_write_config() -> InventoryConfig {
    let mut config = InventoryConfig::default();
    config.usecase.read_after_write_enabled = true;
    config.usecase.read_after_write_allowlist = vec![REPORTER_PRINCIPAL.to_string()];
    config
}

pub fn transactions(store: &InMemoryStore) -> TransactionManager {
    TransactionManager::new(Arc::new(store.clone()), RetryPolicy::default())
}

/// Write service and replication consumer sharing in-memory collaborators
pub struct Harness {
    pub store: InMemoryStore,
    pub broadcast: Arc<InProcessBroadcast>,
    pub relations: InMemoryRelations,
    pub service: OutboxResourceService,
}

impl Harness {
    pub fn new(config: &InventoryConfig) -> Self {
        let store = InMemoryStore::new();
        let broadcast = Arc::new(InProcessBroadcast::new());
        let relations = InMemoryRelations::new();
        let service = OutboxResourceService::new(
            transactions(&store),
            schema(),
            broadcast.clone(),
            config,
        );
        Self {
            store,
            broadcast,
            relations,
            service,
        }
    }

    /// Attach the store's log to a consumer running in the background
    pub async fn start_consumer(&self, config: &InventoryConfig) -> Arc<ConsumerStats> {
        let (emitter, events) = event_channel(config.consumer.event_buffer_size);
        self.store.attach_emitter(emitter).await;

        let consumer = self.consumer(config);
        let stats = consumer.stats();
        tokio::spawn(async move { consumer.run(events).await });
        stats
    }

    /// Consumer over this harness' store, relations and broadcast
    pub fn consumer(&self, config: &InventoryConfig) -> ReplicationConsumer {
        ReplicationConsumer::new(
            transactions(&self.store),
            RelationReplicationService::new(Arc::new(self.relations.clone()), schema()),
            self.broadcast.clone(),
            config.consumer.clone(),
        )
    }
}
