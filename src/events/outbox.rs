// Copyright (c) 2025 - Cowboy AI, Inc.
//! Outbox Events
//!
//! Each saved write produces two outbox rows, inserted and deleted in the
//! same transaction so only a log-tailing reader ever sees them:
//!
//! - `kessel.resources` carries the full snapshot ([`ResourceEventPayload`])
//! - `kessel.tuples` carries the tuple diff ([`TupleEvent`])

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::aggregate::ResourceEvent;
use crate::domain::{ReporterResourceKey, Representation, Version};
use crate::errors::{InventoryError, InventoryResult};
use crate::tuples::TuplesToReplicate;

/// Kind of state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Created,
    Updated,
    Deleted,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Created => "created",
            OperationType::Updated => "updated",
            OperationType::Deleted => "deleted",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(OperationType::Created),
            "updated" => Ok(OperationType::Updated),
            "deleted" => Ok(OperationType::Deleted),
            other => Err(InventoryError::Deserialization(format!(
                "unknown operation type: {other}"
            ))),
        }
    }
}

/// Stream an outbox row is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    #[serde(rename = "kessel.resources")]
    Resources,
    #[serde(rename = "kessel.tuples")]
    Tuples,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Resources => "kessel.resources",
            AggregateType::Tuples => "kessel.tuples",
        }
    }
}

impl FromStr for AggregateType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kessel.resources" => Ok(AggregateType::Resources),
            "kessel.tuples" => Ok(AggregateType::Tuples),
            other => Err(InventoryError::Deserialization(format!(
                "unknown aggregate type: {other}"
            ))),
        }
    }
}

/// Payload of a `kessel.tuples` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleEvent {
    pub reporter_resource_key: ReporterResourceKey,
    pub operation_type: OperationType,
    pub common_version: Option<Version>,
    pub reporter_representation_version: Option<Version>,
    /// Diff computed inside the write transaction
    #[serde(default)]
    pub tuples: Option<TuplesToReplicate>,
}

/// Payload of a `kessel.resources` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEventPayload {
    pub resource_id: Uuid,
    pub resource_type: String,
    pub reporter_resource_id: Uuid,
    pub reporter_resource_key: ReporterResourceKey,
    pub api_href: String,
    pub console_href: Option<String>,
    pub common_version: Version,
    pub representation_version: Version,
    pub generation: u64,
    pub tombstone: bool,
    pub reporter_data: Representation,
    pub common_data: Option<Representation>,
    pub operation_type: OperationType,
    pub reported_at: DateTime<Utc>,
}

/// Transient outbox row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    #[serde(rename = "aggregatetype")]
    pub aggregate_type: AggregateType,
    #[serde(rename = "aggregateid")]
    pub aggregate_id: String,
    pub operation: OperationType,
    pub txid: String,
    pub payload: serde_json::Value,
}

impl OutboxEvent {
    /// Build the resource and tuple rows for a saved change
    pub fn for_change(
        event: &ResourceEvent,
        operation: OperationType,
        txid: &str,
        tuples: TuplesToReplicate,
    ) -> InventoryResult<[OutboxEvent; 2]> {
        let reporter_resource = &event.reporter_resource;
        let reporter_representation = event.reporter_representation();
        let aggregate_id = event.resource_id.to_string();

        let resource_payload = ResourceEventPayload {
            resource_id: event.resource_id.as_uuid(),
            resource_type: event.resource_type.as_str().to_string(),
            reporter_resource_id: reporter_resource.id.as_uuid(),
            reporter_resource_key: reporter_resource.key.clone(),
            api_href: reporter_resource.api_href.clone(),
            console_href: reporter_resource.console_href.clone(),
            common_version: event.common_version,
            representation_version: reporter_resource.representation_version,
            generation: reporter_resource.generation.value(),
            tombstone: reporter_resource.tombstone,
            reporter_data: reporter_representation.data.clone(),
            common_data: event.common_representation().map(|c| c.data.clone()),
            operation_type: operation,
            reported_at: Utc::now(),
        };
        let tuple_payload = TupleEvent {
            reporter_resource_key: reporter_resource.key.clone(),
            operation_type: operation,
            common_version: Some(event.common_version),
            reporter_representation_version: Some(reporter_resource.representation_version),
            tuples: Some(tuples),
        };

        Ok([
            OutboxEvent {
                id: Uuid::now_v7(),
                aggregate_type: AggregateType::Resources,
                aggregate_id: aggregate_id.clone(),
                operation,
                txid: txid.to_string(),
                payload: serde_json::to_value(resource_payload)?,
            },
            OutboxEvent {
                id: Uuid::now_v7(),
                aggregate_type: AggregateType::Tuples,
                aggregate_id,
                operation,
                txid: txid.to_string(),
                payload: serde_json::to_value(tuple_payload)?,
            },
        ])
    }

    /// Decode the payload of a `kessel.tuples` event
    pub fn tuple_event(&self) -> InventoryResult<TupleEvent> {
        if self.aggregate_type != AggregateType::Tuples {
            return Err(InventoryError::Deserialization(format!(
                "expected kessel.tuples event, got {}",
                self.aggregate_type.as_str()
            )));
        }
        serde_json::from_value(self.payload.clone())
            .map_err(|e| InventoryError::Deserialization(e.to_string()))
    }
}
