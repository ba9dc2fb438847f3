// Copyright (c) 2025 - Cowboy AI, Inc.
//! Write path counters

use std::sync::atomic::{AtomicU64, Ordering};

use crate::events::OperationType;

/// Counters since start; there is no exporter, callers read [`snapshot`](Self::snapshot)
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    outbox_writes_created: AtomicU64,
    outbox_writes_updated: AtomicU64,
    outbox_writes_deleted: AtomicU64,
    read_after_write_waits: AtomicU64,
    read_after_write_timeouts: AtomicU64,
    idempotent_replays: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceMetricsSnapshot {
    pub outbox_writes: u64,
    pub outbox_writes_created: u64,
    pub outbox_writes_updated: u64,
    pub outbox_writes_deleted: u64,
    pub read_after_write_waits: u64,
    pub read_after_write_timeouts: u64,
    pub idempotent_replays: u64,
}

impl ServiceMetrics {
    /// Count a committed write
    pub fn record_outbox_write(&self, operation: OperationType) {
        let counter = match operation {
            OperationType::Created => &self.outbox_writes_created,
            OperationType::Updated => &self.outbox_writes_updated,
            OperationType::Deleted => &self.outbox_writes_deleted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait(&self) {
        self.read_after_write_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait_timeout(&self) {
        self.read_after_write_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay(&self) {
        self.idempotent_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        let created = self.outbox_writes_created.load(Ordering::Relaxed);
        let updated = self.outbox_writes_updated.load(Ordering::Relaxed);
        let deleted = self.outbox_writes_deleted.load(Ordering::Relaxed);
        ServiceMetricsSnapshot {
            outbox_writes: created + updated + deleted,
            outbox_writes_created: created,
            outbox_writes_updated: updated,
            outbox_writes_deleted: deleted,
            read_after_write_waits: self.read_after_write_waits.load(Ordering::Relaxed),
            read_after_write_timeouts: self.read_after_write_timeouts.load(Ordering::Relaxed),
            idempotent_replays: self.idempotent_replays.load(Ordering::Relaxed),
        }
    }
}
