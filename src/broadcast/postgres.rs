// Copyright (c) 2025 - Cowboy AI, Inc.
//! Postgres LISTEN/NOTIFY broadcast
//!
//! The LISTEN side owns a dedicated connection (a [`PgListener`]) and runs
//! in a background task; NOTIFY goes through the regular pool so a signal
//! is never queued behind a blocked listen.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ClusterBroadcast, Subscription, SubscriptionTable};
use crate::config::BroadcastConfig;
use crate::errors::InventoryResult;

const RECV_RETRY_MIN: Duration = Duration::from_millis(100);
const RECV_RETRY_MAX: Duration = Duration::from_secs(5);

/// Delay before the next `recv` after `failures` consecutive errors
fn recv_retry_delay(failures: u32) -> Duration {
    RECV_RETRY_MIN
        .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
        .min(RECV_RETRY_MAX)
}

pub struct PgClusterBroadcast {
    table: SubscriptionTable,
    notifier: PgPool,
    channel: String,
    listener_task: JoinHandle<()>,
}

impl PgClusterBroadcast {
    /// Start listening on `config.channel`
    pub async fn start(pool: PgPool, config: &BroadcastConfig) -> InventoryResult<Self> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(&config.channel).await?;
        info!(channel = %config.channel, "listening for replication notifications");

        let table = SubscriptionTable::new();
        let listener_task = tokio::spawn(run_notification_loop(
            listener,
            table.clone(),
            config.listen_timeout,
        ));

        Ok(Self {
            table,
            notifier: pool,
            channel: config.channel.clone(),
            listener_task,
        })
    }

    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }
}

impl Drop for PgClusterBroadcast {
    fn drop(&mut self) {
        self.listener_task.abort();
    }
}

async fn run_notification_loop(mut listener: PgListener, table: SubscriptionTable, listen_timeout: Duration) {
    let mut failures = 0u32;
    loop {
        match tokio::time::timeout(listen_timeout, listener.recv()).await {
            Err(_) => continue,
            Ok(Ok(notification)) => {
                failures = 0;
                let key = notification.payload();
                if !table.notify(key) {
                    debug!(key, "notification for a waiter in another process");
                }
            }
            // PgListener reconnects on the next recv
            Ok(Err(err)) => {
                failures = failures.saturating_add(1);
                let delay = recv_retry_delay(failures);
                warn!(error = %err, failures, delay_ms = delay.as_millis() as u64, "notification wait failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[async_trait]
impl ClusterBroadcast for PgClusterBroadcast {
    fn subscribe(&self, key: &str) -> Subscription {
        self.table.register(key)
    }

    async fn signal(&self, key: &str) -> InventoryResult<()> {
        if self.table.notify(key) {
            return Ok(());
        }
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(key)
            .execute(&self.notifier)
            .await?;
        debug!(key, channel = %self.channel, "signal broadcast to cluster");
        Ok(())
    }
}
