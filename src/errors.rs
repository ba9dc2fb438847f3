// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for inventory persistence and infrastructure operations

use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::domain::{KeyError, RepresentationsError};

/// SQLSTATE raised by Postgres when a serializable transaction cannot commit
pub const PG_SERIALIZATION_FAILURE: &str = "40001";

/// Errors that can occur below the service layer
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No active reporter-resource matches the key
    #[error("resource not found")]
    ResourceNotFound,

    /// Database driver error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Optimistic write conflict detected by a non-SQL store
    #[error("write conflict: {0}")]
    WriteConflict(String),

    /// Unit of work failed with a non-retryable error
    #[error("transaction failed: {0}")]
    TransactionFailed(Box<InventoryError>),

    /// Commit failed with a non-retryable error
    #[error("committing transaction failed: {0}")]
    CommitFailed(Box<InventoryError>),

    /// Every attempt hit a retryable conflict
    #[error("transaction failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Schema or input validation failure
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS subscribe or fetch error
    #[error("NATS subscribe error: {0}")]
    NatsSubscribe(String),

    /// Relations service rejected a tuple mutation
    #[error("replication error: {0}")]
    Replication(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation timed out
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Circuit breaker rejected the call
    #[error("circuit breaker is {0}")]
    CircuitOpen(&'static str),

    /// Generic infrastructure error
    #[error("infrastructure error: {0}")]
    Generic(String),
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

impl InventoryError {
    /// Strip transaction wrappers and return the originating error
    pub fn root(&self) -> &InventoryError {
        match self {
            InventoryError::TransactionFailed(inner) | InventoryError::CommitFailed(inner) => {
                inner.root()
            }
            other => other,
        }
    }

    /// True when the originating error is a lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), InventoryError::ResourceNotFound)
    }

    /// SQLSTATE of the originating database error, if any
    pub fn sqlstate(&self) -> Option<String> {
        match self.root() {
            InventoryError::Database(sqlx::Error::Database(db)) => {
                db.code().map(|code| code.into_owned())
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Serialization(err.to_string())
    }
}

impl From<async_nats::Error> for InventoryError {
    fn from(err: async_nats::Error) -> Self {
        InventoryError::NatsConnection(err.to_string())
    }
}

impl From<KeyError> for InventoryError {
    fn from(err: KeyError) -> Self {
        InventoryError::Validation(err.to_string())
    }
}

impl From<AggregateError> for InventoryError {
    fn from(err: AggregateError) -> Self {
        InventoryError::Generic(err.to_string())
    }
}

impl From<RepresentationsError> for InventoryError {
    fn from(err: RepresentationsError) -> Self {
        InventoryError::Validation(err.to_string())
    }
}
