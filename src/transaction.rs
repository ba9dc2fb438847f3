// Copyright (c) 2025 - Cowboy AI, Inc.
//! Serializable Transaction Manager
//!
//! Runs a unit of work against a [`ResourceRepository`] inside a fresh
//! serializable transaction and retries it when the work or the commit
//! fails with a write conflict.
//!
//! # Architecture
//!
//! ```text
//! attempt 1..=max
//!   begin ──▶ work(repo) ──err──▶ rollback ──retryable?──▶ next attempt
//!                │                              └─no──▶ TransactionFailed
//!                ok
//!                ▼
//!             commit ──err──retryable?──▶ next attempt
//!                │            └─no──▶ CommitFailed
//!                ok ──▶ value
//! max reached ──▶ RetriesExhausted { attempts }
//! ```
//!
//! Whether an error is a conflict is decided by the [`RetryPolicy`]'s
//! predicates, so a backend registers its own conflict signature instead
//! of the manager matching on driver types.
//!
//! # Example
//!
//! ```rust,ignore
//! let value = manager
//!     .handle_serializable_transaction("report_resource", |repo| {
//!         let key = key.clone();
//!         Box::pin(async move { repo.find_resource_by_keys(&key).await })
//!     })
//!     .await?;
//! ```

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::errors::{InventoryError, InventoryResult, PG_SERIALIZATION_FAILURE};
use crate::store::{ResourceRepository, Store};

/// Default attempt budget for serializable transactions
pub const DEFAULT_MAX_SERIALIZATION_RETRIES: u32 = 10;

/// Classifies an error as a retryable conflict
pub type RetryPredicate = Arc<dyn Fn(&InventoryError) -> bool + Send + Sync>;

/// Postgres `40001 serialization_failure`
pub fn is_serialization_failure(err: &InventoryError) -> bool {
    err.sqlstate().as_deref() == Some(PG_SERIALIZATION_FAILURE)
}

/// Optimistic conflict raised by a non-SQL store
pub fn is_write_conflict(err: &InventoryError) -> bool {
    matches!(err.root(), InventoryError::WriteConflict(_))
}

/// Attempt budget and the predicates that mark an error as retryable
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    predicates: Vec<RetryPredicate>,
}

impl RetryPolicy {
    /// Policy with no predicates; nothing is retried until one is added
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&InventoryError) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }

    pub fn is_retryable(&self, err: &InventoryError) -> bool {
        self.predicates.iter().any(|predicate| predicate(err))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SERIALIZATION_RETRIES)
            .with_predicate(is_serialization_failure)
            .with_predicate(is_write_conflict)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

/// Conflict counts for one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializationCounts {
    /// Attempts that hit a retryable conflict
    pub failures: u64,
    /// Runs that used up the attempt budget
    pub exhaustions: u64,
}

/// Conflict counters keyed by operation name
#[derive(Debug, Default)]
pub struct TransactionMetrics {
    by_operation: Mutex<HashMap<String, SerializationCounts>>,
}

impl TransactionMetrics {
    fn update(&self, operation: &str, f: impl FnOnce(&mut SerializationCounts)) {
        let mut counts = self.by_operation.lock().unwrap_or_else(PoisonError::into_inner);
        f(counts.entry(operation.to_string()).or_default());
    }

    fn record_failure(&self, operation: &str) {
        self.update(operation, |c| c.failures += 1);
    }

    fn record_exhaustion(&self, operation: &str) {
        self.update(operation, |c| c.exhaustions += 1);
    }

    pub fn counts(&self, operation: &str) -> SerializationCounts {
        self.by_operation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied()
            .unwrap_or_default()
    }
}

/// Runs units of work in serializable transactions
#[derive(Clone)]
pub struct TransactionManager {
    store: Arc<dyn Store>,
    policy: RetryPolicy,
    metrics: Arc<TransactionMetrics>,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn Store>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            metrics: Arc::new(TransactionMetrics::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Shared by every clone of this manager
    pub fn metrics(&self) -> &TransactionMetrics {
        &self.metrics
    }

    /// Run `work` until it commits, fails for good, or the budget runs out
    ///
    /// `work` may run more than once; it must not have side effects outside
    /// the repository it is handed.
    pub async fn handle_serializable_transaction<T, F>(
        &self,
        operation: &str,
        mut work: F,
    ) -> InventoryResult<T>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut dyn ResourceRepository) -> BoxFuture<'a, InventoryResult<T>> + Send,
    {
        let max_attempts = self.policy.max_attempts();

        for attempt in 1..=max_attempts {
            let mut tx = match self.store.begin().await {
                Ok(tx) => tx,
                Err(err) if self.policy.is_retryable(&err) => {
                    debug!(operation, attempt, error = %err, "begin conflicted, retrying");
                    self.metrics.record_failure(operation);
                    continue;
                }
                Err(err) => return Err(InventoryError::TransactionFailed(Box::new(err))),
            };

            let value = match work(tx.repository()).await {
                Ok(value) => value,
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(operation, attempt, error = %rollback_err, "rollback failed");
                    }
                    if self.policy.is_retryable(&err) {
                        debug!(operation, attempt, error = %err, "serialization conflict, retrying");
                        self.metrics.record_failure(operation);
                        continue;
                    }
                    return Err(InventoryError::TransactionFailed(Box::new(err)));
                }
            };

            match tx.commit().await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(operation, attempts = attempt, "transaction committed after retry");
                    }
                    return Ok(value);
                }
                Err(err) if self.policy.is_retryable(&err) => {
                    debug!(operation, attempt, error = %err, "commit conflicted, retrying");
                    self.metrics.record_failure(operation);
                }
                Err(err) => return Err(InventoryError::CommitFailed(Box::new(err))),
            }
        }

        warn!(operation, attempts = max_attempts, "serializable transaction retries exhausted");
        self.metrics.record_exhaustion(operation);
        Err(InventoryError::RetriesExhausted {
            attempts: max_attempts,
        })
    }
}
