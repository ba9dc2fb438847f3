// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscription table: key → single-slot signal

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

use crate::errors::{InventoryError, InventoryResult};

#[derive(Debug)]
struct Slot {
    id: u64,
    tx: mpsc::Sender<()>,
}

/// Waiters registered in this process
///
/// One waiter per key; registering again for the same key replaces the
/// earlier slot and the earlier waiter's [`Subscription::recv`] fails.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionTable {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Slot { id, tx });
        Subscription {
            key: key.to_string(),
            id,
            rx,
            table: self.clone(),
        }
    }

    /// Wake the local waiter for `key`; false if there is none
    pub fn notify(&self, key: &str) -> bool {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match slots.get(key) {
            // A full slot means the waiter was already signalled
            Some(slot) => match slot.tx.try_send(()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
                Err(mpsc::error::TrySendError::Closed(())) => false,
            },
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: &str, id: u64) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.get(key).map(|slot| slot.id) == Some(id) {
            slots.remove(key);
        }
    }
}

/// A registered waiter; dropping it unregisters the key
#[derive(Debug)]
pub struct Subscription {
    key: String,
    id: u64,
    rx: mpsc::Receiver<()>,
    table: SubscriptionTable,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resolve once the key is signalled
    pub async fn recv(&mut self) -> InventoryResult<()> {
        match self.rx.recv().await {
            Some(()) => Ok(()),
            None => Err(InventoryError::Generic(format!(
                "subscription for '{}' was replaced",
                self.key
            ))),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.table.remove(&self.key, self.id);
    }
}
