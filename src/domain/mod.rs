// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory Domain Models
//!
//! Value objects for the resource inventory write path.
//!
//! # Value Objects with Invariants
//!
//! - [`ReporterResourceKey`] - natural key of a reporter's claim, case-normalized
//! - [`ResourceId`] / [`ReporterResourceId`] - UUID v7 identifiers
//! - [`Version`] / [`Generation`] - monotonic counters
//! - [`TransactionId`] - idempotency key of a write
//! - [`Representation`] - opaque JSON document with a `workspace_id` accessor
//! - [`ReporterRepresentation`] / [`CommonRepresentation`] - versioned snapshots

pub mod ids;
pub mod keys;
pub mod representation;

pub use ids::{
    ConsistencyToken, Generation, ReporterResourceId, ResourceId, TransactionId, Version,
};
pub use keys::{
    KeyError, LocalResourceId, ReporterInstanceId, ReporterResourceKey, ReporterType,
    ResourceType,
};
pub use representation::{
    CommonRepresentation, Representation, ReporterRepresentation, Representations,
    RepresentationsError, WORKSPACE_ID_FIELD,
};
