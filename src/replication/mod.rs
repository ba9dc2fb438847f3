// Copyright (c) 2025 - Cowboy AI, Inc.
//! Relation Replication
//!
//! Turns a committed `kessel.tuples` event into tuple mutations on the
//! relations service and records the returned consistency token.
//!
//! | operation | representations read                     | mutation          |
//! |-----------|------------------------------------------|-------------------|
//! | created   | common at `common_version`               | create            |
//! | updated   | common at `common_version` and its prior | create and delete |
//! | deleted   | latest common                            | delete            |
//!
//! A create never deletes: a resource revived after a tombstone keeps its
//! last workspace, and the relation removed by the delete has to come back.

pub mod memory;
pub mod nats;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::ConsistencyToken;
use crate::errors::InventoryResult;
use crate::events::{OperationType, TupleEvent};
use crate::schema::SchemaService;
use crate::store::ResourceRepository;
use crate::tuples::{RelationsTuple, TuplesToReplicate};

pub use memory::InMemoryRelations;
pub use nats::NatsRelationsReplicator;

/// Tuple mutations on the relations service
#[async_trait]
pub trait RelationsReplicator: Send + Sync {
    /// Create `creates`, then delete `deletes`; returns the service's token
    async fn replicate_tuples(
        &self,
        creates: &[RelationsTuple],
        deletes: &[RelationsTuple],
    ) -> InventoryResult<ConsistencyToken>;
}

#[derive(Clone)]
pub struct RelationReplicationService {
    replicator: Arc<dyn RelationsReplicator>,
    schema: SchemaService,
}

impl RelationReplicationService {
    pub fn new(replicator: Arc<dyn RelationsReplicator>, schema: SchemaService) -> Self {
        Self { replicator, schema }
    }

    /// Replicate one event inside the caller's transaction
    ///
    /// Returns the tuples sent to the relations service; empty when the
    /// change did not touch workspace membership.
    pub async fn replicate(
        &self,
        repo: &mut dyn ResourceRepository,
        event: &TupleEvent,
    ) -> InventoryResult<TuplesToReplicate> {
        let key = &event.reporter_resource_key;
        let operation = event.operation_type;

        let (current, previous) = match operation {
            OperationType::Created => {
                let (current, _) = repo
                    .find_current_and_previous_versioned_representations(key, event.common_version, operation)
                    .await?;
                (current, None)
            }
            OperationType::Updated => {
                repo.find_current_and_previous_versioned_representations(key, event.common_version, operation)
                    .await?
            }
            OperationType::Deleted => (None, repo.find_latest_representations(key).await?),
        };

        let tuples = self
            .schema
            .calculate_tuples_for_resource(current.as_ref(), previous.as_ref(), key);
        if tuples.is_empty() {
            debug!(%key, %operation, "no tuples to replicate");
            return Ok(tuples);
        }

        let token = self
            .replicator
            .replicate_tuples(&tuples.tuples_to_create, &tuples.tuples_to_delete)
            .await?;
        info!(
            %key,
            %operation,
            created = tuples.tuples_to_create.len(),
            deleted = tuples.tuples_to_delete.len(),
            "tuples replicated"
        );

        if operation != OperationType::Deleted && !token.is_empty() {
            match repo.update_consistency_token(key, &token).await {
                Err(err) if err.is_not_found() => {
                    debug!(%key, "resource gone, skipping consistency token")
                }
                other => other?,
            }
        }
        Ok(tuples)
    }
}
