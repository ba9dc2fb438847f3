// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource inventory write path for the Composable Information Machine
//!
//! Reporters submit versioned facts about resources. Each write is
//! persisted in one serializable transaction together with transactional
//! outbox rows; a log-tailing consumer replays those rows to the relations
//! service and signals the writer when read-after-write was requested.
//!
//! # Module Organization
//!
//! - [`domain`] / [`aggregate`] - keys, versions, representations and the `Resource` aggregate
//! - [`store`] / [`transaction`] - repositories and the serializable retry loop
//! - [`events`] / [`tuples`] - outbox payloads and workspace tuple diffs
//! - [`service`] - `ReportResource` / `DeleteResource` orchestration
//! - [`consumer`] / [`replication`] / [`broadcast`] - CDC replication and read-after-write signalling

pub mod aggregate;
pub mod broadcast;
pub mod circuit_breaker;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod errors;
pub mod events;
pub mod replication;
pub mod schema;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod transaction;
pub mod tuples;

// Re-export commonly used types
pub use config::InventoryConfig;
pub use errors::{InventoryError, InventoryResult};
pub use service::{OutboxResourceService, ResourceService, ServiceError, ServiceResult};
