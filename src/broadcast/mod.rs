// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster Broadcast
//!
//! Signal/wait primitive behind read-after-write. A writer waits on its
//! transaction id; the replication consumer signals the same id once the
//! write's tuples are replicated.
//!
//! # Architecture
//!
//! ```text
//!  process A (writer)                     process B (consumer)
//!  ┌───────────────────────┐              ┌───────────────────────┐
//!  │ wait(txid)            │              │ signal(txid)          │
//!  │  └─ SubscriptionTable │◀── NOTIFY ───│  ├─ local table hit?  │
//!  │        ▲              │   channel    │  └─ else pg_notify    │
//!  │  LISTEN loop ─────────┘              └───────────────────────┘
//! ```
//!
//! Signal always tries the local table first; only a miss goes through
//! the database. Waits carry no timeout of their own: callers bound them
//! with `tokio::time::timeout`, and dropping the wait unregisters the key.
//!
//! A writer subscribes before opening its transaction and waits after the
//! commit; a signal that lands in between is held by the subscription.

pub mod postgres;
pub mod subscription;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::InventoryResult;

pub use postgres::PgClusterBroadcast;
pub use subscription::{Subscription, SubscriptionTable};

/// Cross-process one-shot signal keyed by string
#[async_trait]
pub trait ClusterBroadcast: Send + Sync {
    /// Register the local waiter for `key`
    fn subscribe(&self, key: &str) -> Subscription;

    /// Block until `key` is signalled
    async fn wait(&self, key: &str) -> InventoryResult<()> {
        self.subscribe(key).recv().await
    }

    /// Wake the waiter for `key`, wherever it is registered
    async fn signal(&self, key: &str) -> InventoryResult<()>;
}

/// Single-process broadcast; signals for unknown keys are dropped
#[derive(Debug, Clone, Default)]
pub struct InProcessBroadcast {
    table: SubscriptionTable,
}

impl InProcessBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }
}

#[async_trait]
impl ClusterBroadcast for InProcessBroadcast {
    fn subscribe(&self, key: &str) -> Subscription {
        self.table.register(key)
    }

    async fn signal(&self, key: &str) -> InventoryResult<()> {
        if !self.table.notify(key) {
            debug!(key, "no local waiter for signal");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_releases_wait() {
        let broadcast = Arc::new(InProcessBroadcast::new());
        let waiter = {
            let broadcast = Arc::clone(&broadcast);
            tokio::spawn(async move { broadcast.wait("tx-1").await })
        };

        while !broadcast.table().contains("tx-1") {
            tokio::task::yield_now().await;
        }
        broadcast.signal("tx-1").await.unwrap();
        waiter.await.unwrap().unwrap();
        assert!(broadcast.table().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_wait_unregisters() {
        let broadcast = InProcessBroadcast::new();
        let result = tokio::time::timeout(Duration::from_secs(10), broadcast.wait("tx-1")).await;
        assert!(result.is_err());
        assert!(broadcast.table().is_empty());
    }

    #[tokio::test]
    async fn test_signal_before_wait_is_kept_by_subscription() {
        let broadcast = InProcessBroadcast::new();
        let mut subscription = broadcast.subscribe("tx-1");
        broadcast.signal("tx-1").await.unwrap();
        subscription.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_without_waiter_is_ok() {
        InProcessBroadcast::new().signal("nobody").await.unwrap();
    }
}
