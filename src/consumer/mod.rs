// Copyright (c) 2025 - Cowboy AI, Inc.
//! Replication Consumer
//!
//! Drains the [`EventStream`] and replicates each `kessel.tuples` event to
//! the relations service, then signals the event's transaction id so a
//! writer waiting for read-after-write can return.
//!
//! # Architecture
//!
//! ```text
//! JetStreamEventSource ──emit──▶ EventStream ──▶ ReplicationConsumer
//!                                                  │  tx: replicate(repo, tuple event)
//!                                                  │  retry with backoff
//!                                                  └─▶ ClusterBroadcast::signal(txid)
//! ```
//!
//! An event that still fails after `max_retries` attempts is logged and
//! given up on; its transaction id is signalled anyway so the writer does
//! not sit out the full wait.

pub mod jetstream;
pub mod message;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::broadcast::ClusterBroadcast;
use crate::config::ConsumerConfig;
use crate::errors::InventoryResult;
use crate::events::{AggregateType, EventStream, OutboxEvent, TupleEvent};
use crate::replication::RelationReplicationService;
use crate::transaction::TransactionManager;
use crate::tuples::TuplesToReplicate;

pub use jetstream::JetStreamEventSource;
pub use message::{CdcHeaders, CdcMessage};

/// Counters since start
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub replicated: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    pub retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerStatsSnapshot {
    pub replicated: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retries: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            replicated: self.replicated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

pub struct ReplicationConsumer {
    transactions: TransactionManager,
    replication: RelationReplicationService,
    broadcast: Arc<dyn ClusterBroadcast>,
    config: ConsumerConfig,
    stats: Arc<ConsumerStats>,
}

impl ReplicationConsumer {
    pub fn new(
        transactions: TransactionManager,
        replication: RelationReplicationService,
        broadcast: Arc<dyn ClusterBroadcast>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            transactions,
            replication,
            broadcast,
            config,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Process events until every emitter is dropped
    pub async fn run(&self, mut events: EventStream) {
        info!("replication consumer started");
        while let Some(event) = events.recv().await {
            // Failures are logged and counted inside process
            let _ = self.process(event).await;
        }
        info!("event stream closed, replication consumer stopped");
    }

    /// Replicate one event and signal its transaction id
    pub async fn process(&self, event: OutboxEvent) -> InventoryResult<TuplesToReplicate> {
        if event.aggregate_type != AggregateType::Tuples {
            debug!(txid = %event.txid, aggregate = event.aggregate_type.as_str(), "ignoring non-tuple event");
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(TuplesToReplicate::default());
        }

        let result = match event.tuple_event() {
            Ok(tuple_event) => self.replicate_with_retry(&event.txid, tuple_event).await,
            Err(err) => {
                error!(txid = %event.txid, error = %err, "failed to parse tuple event");
                Err(err)
            }
        };
        match &result {
            Ok(_) => {
                self.stats.replicated.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        if event.txid.is_empty() {
            debug!("skipping replication signal: no txid");
        } else if let Err(err) = self.broadcast.signal(&event.txid).await {
            error!(txid = %event.txid, error = %err, "failed to signal replication complete");
        } else {
            debug!(txid = %event.txid, "signalled replication complete");
        }
        result
    }

    async fn replicate_with_retry(
        &self,
        txid: &str,
        tuple_event: TupleEvent,
    ) -> InventoryResult<TuplesToReplicate> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let replication = self.replication.clone();
            let event = tuple_event.clone();
            let outcome = self
                .transactions
                .handle_serializable_transaction("replicate_tuples", move |repo| {
                    let replication = replication.clone();
                    let event = event.clone();
                    Box::pin(async move { replication.replicate(repo, &event).await })
                })
                .await;

            match outcome {
                Ok(tuples) => return Ok(tuples),
                Err(err) if self.config.should_retry(attempt) => {
                    let backoff = self.config.backoff(attempt);
                    warn!(txid, attempt, ?backoff, error = %err, "replication failed, retrying");
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    error!(txid, attempts = attempt, error = %err, "replication failed, giving up");
                    return Err(err);
                }
            }
        }
    }
}
