// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bounded event channel between an event source and the replication consumer
//!
//! Producers never block: when the buffer is full the event is dropped with
//! a warning and the source moves on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::outbox::OutboxEvent;

/// Default number of buffered events
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Create a bounded channel
pub fn event_channel(capacity: usize) -> (EventEmitter, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventEmitter {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        EventStream { rx },
    )
}

/// Producer half
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<OutboxEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventEmitter {
    /// Enqueue without waiting; returns false if the event was dropped
    pub fn emit(&self, event: OutboxEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(txid = %event.txid, "event channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(txid = %event.txid, "event channel closed, dropping event");
                false
            }
        }
    }

    /// Number of events dropped because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<OutboxEvent>,
}

impl EventStream {
    /// Next event, or `None` once every emitter is gone
    pub async fn recv(&mut self) -> Option<OutboxEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AggregateType, OperationType};
    use uuid::Uuid;

    fn event(txid: &str) -> OutboxEvent {
        OutboxEvent {
            id: Uuid::now_v7(),
            aggregate_type: AggregateType::Tuples,
            aggregate_id: "r".into(),
            operation: OperationType::Created,
            txid: txid.into(),
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (emitter, mut stream) = event_channel(2);
        assert!(emitter.emit(event("a")));
        assert!(emitter.emit(event("b")));
        assert!(!emitter.emit(event("c")));
        assert_eq!(emitter.dropped(), 1);

        assert_eq!(stream.recv().await.unwrap().txid, "a");
        assert_eq!(stream.recv().await.unwrap().txid, "b");
        assert!(emitter.emit(event("d")));
        assert_eq!(stream.recv().await.unwrap().txid, "d");
    }

    #[tokio::test]
    async fn test_stream_ends_when_emitters_dropped() {
        let (emitter, mut stream) = event_channel(DEFAULT_EVENT_BUFFER_SIZE);
        drop(emitter);
        assert!(stream.recv().await.is_none());
    }
}
