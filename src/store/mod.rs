// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Store
//!
//! Persistence is expressed as three capabilities:
//!
//! - [`Store`] opens serializable transactions
//! - [`Tx`] commits or rolls back and lends out its repository
//! - [`ResourceRepository`] reads and writes the aggregate inside one transaction
//!
//! Two implementations are selected at construction time:
//! [`InMemoryStore`] for tests and embedded use, [`PgStore`] for Postgres.
//!
//! # Save Semantics
//!
//! `save` appends the change recorded on the aggregate: resource row,
//! reporter-resource row, reporter representation, common representation
//! (if any), then the outbox rows (insert + delete). Any failure leaves the
//! transaction unusable and the caller rolls it back.

pub mod memory;
pub mod migrations;
pub mod postgres;

use async_trait::async_trait;

use crate::aggregate::{Resource, ResourceEvent};
use crate::domain::{
    ConsistencyToken, ReporterResourceId, ReporterResourceKey, Representation, Representations,
    ResourceId, TransactionId, Version,
};
use crate::errors::InventoryResult;
use crate::events::OperationType;
use crate::tuples::{calculate_tuples, TuplesToReplicate};

pub use memory::{InMemoryStore, TableCounts};
pub use postgres::PgStore;

/// Transaction-scoped access to resources
#[async_trait]
pub trait ResourceRepository: Send {
    /// New time-ordered resource id
    fn next_resource_id(&self) -> ResourceId {
        ResourceId::generate()
    }

    /// New time-ordered reporter resource id
    fn next_reporter_resource_id(&self) -> ReporterResourceId {
        ReporterResourceId::generate()
    }

    /// Active resource for `key`; tombstoned reporter resources yield
    /// [`crate::errors::InventoryError::ResourceNotFound`]
    async fn find_resource_by_keys(&mut self, key: &ReporterResourceKey) -> InventoryResult<Resource>;

    /// Resource whose reporter resource for `key` is tombstoned
    async fn find_tombstoned_resource_by_keys(
        &mut self,
        key: &ReporterResourceKey,
    ) -> InventoryResult<Option<Resource>>;

    /// Append the aggregate's pending change and its outbox events
    async fn save(
        &mut self,
        resource: &Resource,
        operation: OperationType,
        txid: &TransactionId,
    ) -> InventoryResult<()>;

    /// Whether a write with this transaction id has been applied
    async fn contains_event_for_transaction_id(&mut self, txid: &str) -> InventoryResult<bool>;

    /// Common snapshots at `current_version` and `current_version - 1`
    async fn find_current_and_previous_versioned_representations(
        &mut self,
        key: &ReporterResourceKey,
        current_version: Option<Version>,
        operation: OperationType,
    ) -> InventoryResult<(Option<Representations>, Option<Representations>)>;

    /// Highest-version common snapshot; `None` when its document is empty
    async fn find_latest_representations(
        &mut self,
        key: &ReporterResourceKey,
    ) -> InventoryResult<Option<Representations>>;

    /// Record the relations service's token on the resource
    async fn update_consistency_token(
        &mut self,
        key: &ReporterResourceKey,
        token: &ConsistencyToken,
    ) -> InventoryResult<()>;
}

/// Open serializable transaction
#[async_trait]
pub trait Tx: Send {
    fn repository(&mut self) -> &mut dyn ResourceRepository;

    async fn commit(self: Box<Self>) -> InventoryResult<()>;

    async fn rollback(self: Box<Self>) -> InventoryResult<()>;
}

/// Transaction factory
#[async_trait]
pub trait Store: Send + Sync {
    /// Begin a serializable transaction
    async fn begin(&self) -> InventoryResult<Box<dyn Tx>>;
}

/// Common version whose snapshot is the "before" side of a saved change
pub(crate) fn previous_common_version(event: &ResourceEvent, operation: OperationType) -> Option<Version> {
    match operation {
        OperationType::Created => None,
        OperationType::Updated => event.common_version.previous(),
        OperationType::Deleted => Some(event.common_version),
    }
}

/// Tuple diff recorded in the outbox for a saved change
pub(crate) fn change_tuples(
    event: &ResourceEvent,
    previous_common: Option<(Representation, Version)>,
) -> TuplesToReplicate {
    let current = event
        .common_representation()
        .and_then(|common| Representations::common(common.data.clone(), common.version).ok());
    let previous =
        previous_common.and_then(|(data, version)| Representations::common(data, version).ok());
    calculate_tuples(
        current.as_ref(),
        previous.as_ref(),
        &event.reporter_resource.key,
    )
}
