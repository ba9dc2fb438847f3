// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for the Resource Inventory
//!
//! Application services orchestrate validation, the serializable unit of
//! work and the post-commit read-after-write wait.
//!
//! # Architecture
//!
//! ```text
//! Reporter Request (transport layer)
//!     ↓
//! Service Layer (this module)
//!     ↓
//! SchemaService → TransactionManager → Resource aggregate
//!     ↓
//! ResourceRepository::save (rows + outbox, one transaction)
//!     ↓
//! CDC → ReplicationConsumer → relations service
//!     ↓
//! ClusterBroadcast::signal(txid) → waiting writer returns
//! ```
//!
//! # Design Principles
//!
//! 1. **Transaction Boundaries**: one serializable transaction per write
//! 2. **No Synchronous Fan-out**: the relations service is only reached through the outbox
//! 3. **Best-effort Visibility**: nothing after the commit fails the write
//!
//! # Example
//!
//! ```rust,ignore
//! use cim_inventory::service::{OutboxResourceService, ResourceService};
//!
//! let service = OutboxResourceService::new(transactions, schema, broadcast, &config);
//! let response = service.report_resource(command).await?;
//! println!("applied {:?} as {}", response.operation, response.txid);
//! ```

pub mod metrics;
pub mod resource;

pub use crate::aggregate::{DeleteResourceCommand, ReportResourceCommand, WriteVisibility};
pub use metrics::{ServiceMetrics, ServiceMetricsSnapshot};
pub use resource::{
    OutboxResourceService, ReportResourceResponse, ResourceService, ServiceError, ServiceResult,
    DELETE_RESOURCE_OPERATION, REPORT_RESOURCE_OPERATION,
};
