// Copyright (c) 2025 - Cowboy AI, Inc.
//! Relations service over NATS request/reply
//!
//! One request per `replicate_tuples` call:
//!
//! ```text
//! request  {"creates": [tuple..], "deletes": [tuple..]}
//! reply    {"consistency_token": "..."}  or  {"error": "..."}
//! ```

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::RelationsReplicator;
use crate::config::RelationsConfig;
use crate::domain::ConsistencyToken;
use crate::errors::{InventoryError, InventoryResult};
use crate::tuples::RelationsTuple;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateTuplesRequest {
    pub creates: Vec<RelationsTuple>,
    pub deletes: Vec<RelationsTuple>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicateTuplesReply {
    #[serde(default)]
    pub consistency_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplicateTuplesReply {
    /// Token on success, the service's error otherwise
    pub fn into_token(self) -> InventoryResult<ConsistencyToken> {
        match self.error {
            Some(reason) => Err(InventoryError::Replication(reason)),
            None => Ok(ConsistencyToken::new(self.consistency_token)),
        }
    }
}

#[derive(Clone)]
pub struct NatsRelationsReplicator {
    client: Client,
    subject: String,
}

impl NatsRelationsReplicator {
    pub async fn connect(config: &RelationsConfig) -> InventoryResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| InventoryError::NatsConnection(e.to_string()))?;
        info!(servers = ?config.servers, subject = %config.subject, "connected to relations service");

        Ok(Self::new(client, config.subject.clone()))
    }

    pub fn new(client: Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl RelationsReplicator for NatsRelationsReplicator {
    async fn replicate_tuples(
        &self,
        creates: &[RelationsTuple],
        deletes: &[RelationsTuple],
    ) -> InventoryResult<ConsistencyToken> {
        let payload = serde_json::to_vec(&ReplicateTuplesRequest {
            creates: creates.to_vec(),
            deletes: deletes.to_vec(),
        })?;

        let response = self
            .client
            .request(self.subject.clone(), payload.into())
            .await
            .map_err(|e| InventoryError::Replication(e.to_string()))?;

        let reply: ReplicateTuplesReply = serde_json::from_slice(&response.payload)
            .map_err(|e| InventoryError::Deserialization(e.to_string()))?;
        debug!(subject = %self.subject, creates = creates.len(), deletes = deletes.len(), "relations service replied");
        reply.into_token()
    }
}
