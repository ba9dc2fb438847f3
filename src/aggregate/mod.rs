// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Aggregate
//!
//! The aggregate computes the next versioned snapshots for a write; the
//! repository appends them. Mutations are plain methods on [`Resource`]
//! and never perform I/O.
//!
//! # Write Flow
//!
//! ```text
//! ReportResourceCommand → Resource::new / update → ResourceEvent
//!                                                      ↓
//!                                  ResourceRepository::save (rows + outbox)
//! ```
//!
//! # Versioning Rules
//!
//! - `common_version` starts at 0 and grows by 1 on every report after the first
//! - a reporter's `representation_version` grows by 1 on every report and delete
//! - reporting a tombstoned key revives it as a new `generation` at version 0
//! - representations are never rewritten, only appended

pub mod commands;
pub mod reporter_resource;
pub mod resource;

pub use commands::{DeleteResourceCommand, ReportResourceCommand, ResourceReport, WriteVisibility};
pub use reporter_resource::ReporterResource;
pub use resource::{AggregateError, Resource, ResourceChange, ResourceEvent};
