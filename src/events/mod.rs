// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory Events
//!
//! Events are immutable facts emitted by a committed write. They leave the
//! process only through the transactional outbox:
//!
//! ```text
//! Save → outbox INSERT + DELETE → WAL → CDC → EventSource → EventStream → consumer
//! ```
//!
//! # Module Organization
//!
//! - [`outbox`] - outbox row and its `kessel.resources` / `kessel.tuples` payloads
//! - [`channel`] - bounded, drop-when-full channel feeding the consumer

pub mod channel;
pub mod outbox;

pub use channel::{event_channel, EventEmitter, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
pub use outbox::{AggregateType, OperationType, OutboxEvent, ResourceEventPayload, TupleEvent};
