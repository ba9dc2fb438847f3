// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Service Layer
//!
//! Application service for the reporter write path. Each write:
//!
//! 1. validates the reporter/resource pairing and both documents
//! 2. runs in a serializable transaction (retried on conflicts)
//! 3. appends versioned snapshots plus outbox rows through `save`
//! 4. optionally waits, bounded, for the replication consumer
//!
//! # Service Pattern
//!
//! ```text
//! Command → validate → TransactionManager ──▶ Resource::new / update / delete
//!                              │                          ↓
//!                              │              ResourceRepository::save
//!                              ↓
//!                           commit → metrics → [wait(txid) behind breaker]
//! ```
//!
//! # Transaction Semantics
//!
//! Everything up to the commit is all-or-nothing. Nothing after the commit
//! can fail the call: a replication wait that times out or is rejected by
//! the breaker is logged and the write is still reported as applied.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::metrics::ServiceMetrics;
use crate::aggregate::{
    DeleteResourceCommand, ReportResourceCommand, Resource, ResourceReport, WriteVisibility,
};
use crate::broadcast::{ClusterBroadcast, Subscription};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{InventoryConfig, UsecaseConfig};
use crate::domain::{ReporterResourceKey, TransactionId};
use crate::errors::{InventoryError, InventoryResult};
use crate::events::OperationType;
use crate::schema::{SchemaError, SchemaService};
use crate::store::ResourceRepository;
use crate::transaction::TransactionManager;

pub const REPORT_RESOURCE_OPERATION: &str = "report_resource";
pub const DELETE_RESOURCE_OPERATION: &str = "delete_resource";

/// Service layer result type
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Client-visible failures of a write
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Reporter/resource pairing or document rejected; never retried
    #[error("validation error: {0}")]
    Validation(String),

    /// No active reporter resource for the key
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Persistence failure, including exhausted conflict retries
    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SchemaError> for ServiceError {
    fn from(err: SchemaError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<InventoryError> for ServiceError {
    fn from(err: InventoryError) -> Self {
        match err.root() {
            InventoryError::ResourceNotFound => ServiceError::NotFound(err.to_string()),
            InventoryError::Validation(reason) => ServiceError::Validation(reason.clone()),
            InventoryError::Database(_)
            | InventoryError::WriteConflict(_)
            | InventoryError::RetriesExhausted { .. } => ServiceError::Database(err.to_string()),
            _ => ServiceError::Internal(err.to_string()),
        }
    }
}

/// Result of a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportResourceResponse {
    /// Transaction id of the write; the consumer signals it once replicated
    pub txid: TransactionId,
    /// `None` when the client transaction id had already been applied
    pub operation: Option<OperationType>,
    /// The replication consumer confirmed the write before returning
    pub replicated: bool,
}

impl ReportResourceResponse {
    pub fn is_replay(&self) -> bool {
        self.operation.is_none()
    }
}

/// Resource write service
///
/// Defines the application service interface for reporters.
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Create or update one reporter's view of a resource
    ///
    /// # Returns
    /// - The write's transaction id and the operation applied, or a replay
    ///   marker when the client transaction id was seen before
    async fn report_resource(
        &self,
        command: ReportResourceCommand,
    ) -> ServiceResult<ReportResourceResponse>;

    /// Tombstone one reporter's view of a resource
    ///
    /// # Returns
    /// - The write's transaction id
    /// - [`ServiceError::NotFound`] when the key has no active reporter resource
    async fn delete_resource(&self, command: DeleteResourceCommand) -> ServiceResult<TransactionId>;
}

/// Transactional-outbox implementation of [`ResourceService`]
pub struct OutboxResourceService {
    transactions: TransactionManager,
    schema: SchemaService,
    broadcast: Arc<dyn ClusterBroadcast>,
    wait_breaker: CircuitBreaker,
    wait_timeout: Duration,
    usecase: UsecaseConfig,
    metrics: Arc<ServiceMetrics>,
}

impl OutboxResourceService {
    pub fn new(
        transactions: TransactionManager,
        schema: SchemaService,
        broadcast: Arc<dyn ClusterBroadcast>,
        config: &InventoryConfig,
    ) -> Self {
        Self {
            transactions,
            schema,
            broadcast,
            wait_breaker: CircuitBreaker::new("read_after_write", config.circuit_breaker),
            wait_timeout: config.broadcast.wait_timeout,
            usecase: config.usecase.clone(),
            metrics: Arc::new(ServiceMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn wait_breaker(&self) -> &CircuitBreaker {
        &self.wait_breaker
    }

    fn validate(&self, command: &ReportResourceCommand) -> ServiceResult<()> {
        let key = &command.key;
        if !self
            .schema
            .is_reporter_for_resource(&key.resource_type, &key.reporter_type)
        {
            return Err(ServiceError::Validation(format!(
                "reporter '{}' does not report resource type '{}'",
                key.reporter_type, key.resource_type
            )));
        }
        self.schema
            .common_shallow_validate(&key.resource_type, &command.common_representation)?;
        self.schema.reporter_shallow_validate(
            &key.resource_type,
            &key.reporter_type,
            &command.reporter_representation,
        )?;
        Ok(())
    }

    fn read_after_write(&self, command: &ReportResourceCommand) -> bool {
        command.write_visibility == WriteVisibility::Consistent
            && self.usecase.read_after_write_enabled
            && self.usecase.consumer_enabled
            && self.usecase.is_allowlisted(&command.reporter_principal)
    }

    /// Wait for the replication signal; true only if it arrived
    async fn wait_for_replication(&self, mut subscription: Subscription) -> bool {
        self.metrics.record_wait();
        let txid = subscription.key().to_string();
        let wait_timeout = self.wait_timeout;

        let result = self
            .wait_breaker
            .call(|| async move {
                match tokio::time::timeout(wait_timeout, subscription.recv()).await {
                    Ok(received) => received,
                    Err(_) => Err(InventoryError::Timeout("waiting for replication".into())),
                }
            })
            .await;

        match result {
            Ok(()) => {
                debug!(%txid, "replication confirmed");
                true
            }
            Err(InventoryError::Timeout(_)) => {
                self.metrics.record_wait_timeout();
                debug!(%txid, "reached timeout waiting for notification from consumer");
                false
            }
            Err(InventoryError::CircuitOpen(state)) => {
                debug!(%txid, state, "circuit breaker rejected wait for notification from consumer");
                false
            }
            Err(err) => {
                warn!(%txid, error = %err, "waiting for replication failed");
                false
            }
        }
    }
}

/// Unit of work for a report; `None` means the client transaction id was
/// already applied
async fn report_in_transaction(
    repo: &mut dyn ResourceRepository,
    key: &ReporterResourceKey,
    report: ResourceReport,
    client_txid: TransactionId,
    txid: &TransactionId,
) -> InventoryResult<Option<OperationType>> {
    if !client_txid.is_empty()
        && repo
            .contains_event_for_transaction_id(client_txid.as_str())
            .await?
    {
        info!(%key, transaction_id = %client_txid, "transaction already processed, skipping update");
        return Ok(None);
    }

    let (resource, operation) = match repo.find_resource_by_keys(key).await {
        Ok(mut resource) => {
            debug!(%key, "resource exists, updating");
            resource.update(key, report, client_txid)?;
            (resource, OperationType::Updated)
        }
        Err(err) if err.is_not_found() => match repo.find_tombstoned_resource_by_keys(key).await? {
            Some(mut resource) => {
                debug!(%key, "reviving tombstoned resource");
                resource.update(key, report, client_txid)?;
                (resource, OperationType::Created)
            }
            None => {
                debug!(%key, "creating new resource");
                let resource = Resource::new(
                    repo.next_resource_id(),
                    key.clone(),
                    repo.next_reporter_resource_id(),
                    report,
                    client_txid,
                );
                (resource, OperationType::Created)
            }
        },
        Err(err) => return Err(err),
    };

    repo.save(&resource, operation, txid).await?;
    Ok(Some(operation))
}

#[async_trait]
impl ResourceService for OutboxResourceService {
    async fn report_resource(
        &self,
        command: ReportResourceCommand,
    ) -> ServiceResult<ReportResourceResponse> {
        self.validate(&command)?;

        let txid = TransactionId::generate();
        let subscription = self
            .read_after_write(&command)
            .then(|| self.broadcast.subscribe(txid.as_str()));

        let key = command.key.clone();
        let report = ResourceReport::from(&command);
        let client_txid = TransactionId::new(command.transaction_id.clone().unwrap_or_default());
        let write_txid = txid.clone();
        let operation = self
            .transactions
            .handle_serializable_transaction(REPORT_RESOURCE_OPERATION, move |repo| {
                let key = key.clone();
                let report = report.clone();
                let client_txid = client_txid.clone();
                let write_txid = write_txid.clone();
                Box::pin(async move {
                    report_in_transaction(repo, &key, report, client_txid, &write_txid).await
                })
            })
            .await?;

        let Some(operation) = operation else {
            self.metrics.record_replay();
            return Ok(ReportResourceResponse {
                txid,
                operation: None,
                replicated: false,
            });
        };
        self.metrics.record_outbox_write(operation);
        info!(key = %command.key, %txid, %operation, "resource reported");

        let replicated = match subscription {
            Some(subscription) => self.wait_for_replication(subscription).await,
            None => false,
        };
        Ok(ReportResourceResponse {
            txid,
            operation: Some(operation),
            replicated,
        })
    }

    async fn delete_resource(&self, command: DeleteResourceCommand) -> ServiceResult<TransactionId> {
        let txid = TransactionId::generate();
        let key = command.key.clone();
        let write_txid = txid.clone();
        self.transactions
            .handle_serializable_transaction(DELETE_RESOURCE_OPERATION, move |repo| {
                let key = key.clone();
                let write_txid = write_txid.clone();
                Box::pin(async move {
                    let mut resource = repo.find_resource_by_keys(&key).await?;
                    resource.delete(&key, write_txid.clone())?;
                    repo.save(&resource, OperationType::Deleted, &write_txid).await
                })
            })
            .await?;

        self.metrics.record_outbox_write(OperationType::Deleted);
        info!(key = %command.key, %txid, principal = %command.reporter_principal, "resource deleted");
        Ok(txid)
    }
}
