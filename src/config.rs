// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration
//!
//! Plain structs with defaults. Loading them (files, flags) is up to the
//! embedding process; [`InventoryConfig::from_env`] covers the handful of
//! variables the replicator binary reads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{InventoryError, InventoryResult};
use crate::transaction::DEFAULT_MAX_SERIALIZATION_RETRIES;

pub use crate::circuit_breaker::CircuitBreakerConfig;

/// Postgres connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Attempt budget for serializable transactions
    pub max_serialization_retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/inventory".to_string(),
            max_connections: 10,
            max_serialization_retries: DEFAULT_MAX_SERIALIZATION_RETRIES,
        }
    }
}

/// LISTEN/NOTIFY settings for read-after-write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub channel: String,
    /// Interval at which the LISTEN loop re-issues its wait
    pub listen_timeout: Duration,
    /// Upper bound on a writer's read-after-write wait
    pub wait_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel: "consumer_notifications".to_string(),
            listen_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(10),
        }
    }
}

/// Replication consumer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub enabled: bool,
    pub event_buffer_size: usize,
    /// Attempts per event; negative retries forever
    pub max_retries: i32,
    pub backoff_factor: u32,
    pub max_backoff: Duration,
    pub base_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_buffer_size: crate::events::DEFAULT_EVENT_BUFFER_SIZE,
            max_retries: 4,
            backoff_factor: 4,
            max_backoff: Duration::from_secs(30),
            base_backoff: Duration::from_millis(300),
        }
    }
}

impl ConsumerConfig {
    /// `min(base * factor * attempt, max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(self.backoff_factor.saturating_mul(attempt))
            .min(self.max_backoff)
    }

    /// Whether another attempt follows attempt number `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_retries < 0 || i64::from(attempt) < i64::from(self.max_retries)
    }
}

/// Write-path switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsecaseConfig {
    pub read_after_write_enabled: bool,
    /// Principals allowed to wait; `"*"` admits everyone
    pub read_after_write_allowlist: Vec<String>,
    pub consumer_enabled: bool,
}

impl Default for UsecaseConfig {
    fn default() -> Self {
        Self {
            read_after_write_enabled: false,
            read_after_write_allowlist: Vec::new(),
            consumer_enabled: true,
        }
    }
}

impl UsecaseConfig {
    pub fn is_allowlisted(&self, principal: &str) -> bool {
        self.read_after_write_allowlist
            .iter()
            .any(|entry| entry == "*" || entry == principal)
    }
}

/// JetStream CDC input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JetStreamSourceConfig {
    pub servers: Vec<String>,
    pub stream_name: String,
    pub subject: String,
    pub durable_name: String,
    pub batch_size: usize,
    pub fetch_timeout: Duration,
}

impl Default for JetStreamSourceConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            stream_name: "INVENTORY_CDC".to_string(),
            subject: "outbox.event.kessel.tuples".to_string(),
            durable_name: "inventory-replicator".to_string(),
            batch_size: 10,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Relations service reached over NATS request/reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationsConfig {
    pub servers: Vec<String>,
    /// Client name shown by the NATS server
    pub name: String,
    pub subject: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "inventory-replicator".to_string(),
            subject: "kessel.relations.replicate".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub database: DatabaseConfig,
    pub broadcast: BroadcastConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub consumer: ConsumerConfig,
    pub usecase: UsecaseConfig,
    pub jetstream: JetStreamSourceConfig,
    pub relations: RelationsConfig,
}

impl InventoryConfig {
    /// Defaults overridden by `INVENTORY_DATABASE_URL`, `NATS_URL`,
    /// `INVENTORY_CDC_STREAM`, `INVENTORY_RELATIONS_SUBJECT` and
    /// `INVENTORY_CONSUMER_ENABLED`
    pub fn from_env() -> InventoryResult<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("INVENTORY_DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(servers) = std::env::var("NATS_URL") {
            config.jetstream.servers = servers.split(',').map(str::to_string).collect();
            config.relations.servers = config.jetstream.servers.clone();
        }
        if let Ok(stream) = std::env::var("INVENTORY_CDC_STREAM") {
            config.jetstream.stream_name = stream;
        }
        if let Ok(subject) = std::env::var("INVENTORY_RELATIONS_SUBJECT") {
            config.relations.subject = subject;
        }
        if let Ok(enabled) = std::env::var("INVENTORY_CONSUMER_ENABLED") {
            config.consumer.enabled = enabled.parse().map_err(|_| {
                InventoryError::Configuration(format!(
                    "INVENTORY_CONSUMER_ENABLED must be true or false, got '{enabled}'"
                ))
            })?;
        }
        config.usecase.consumer_enabled = config.consumer.enabled;
        Ok(config)
    }
}
