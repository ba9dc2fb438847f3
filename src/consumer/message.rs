// Copyright (c) 2025 - Cowboy AI, Inc.
//! CDC message decoding
//!
//! CDC delivers each outbox row as a Debezium-style envelope:
//!
//! - headers `operation` and `txid` (both required, `txid` may be empty)
//! - key `{"schema": .., "payload": "<resource id>"}`
//! - value `{"schema": .., "payload": <outbox payload>}`
//!
//! Bare (unwrapped) keys and values are accepted as well.

use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::{InventoryError, InventoryResult};
use crate::events::{AggregateType, OperationType, OutboxEvent};

pub const OPERATION_HEADER: &str = "operation";
pub const TXID_HEADER: &str = "txid";

/// Required headers of a CDC message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdcHeaders {
    pub operation: OperationType,
    pub txid: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CdcMessage {
    pub headers: HashMap<String, String>,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("payload") => {
            map.remove("payload").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl CdcMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn parse_headers(&self) -> InventoryResult<CdcHeaders> {
        let (Some(operation), Some(txid)) = (
            self.headers.get(OPERATION_HEADER),
            self.headers.get(TXID_HEADER),
        ) else {
            return Err(InventoryError::Deserialization(format!(
                "required headers are missing: {:?}",
                self.headers
            )));
        };
        if operation.is_empty() {
            return Err(InventoryError::Deserialization(
                "operation header is empty".into(),
            ));
        }
        Ok(CdcHeaders {
            operation: operation.parse()?,
            txid: txid.clone(),
        })
    }

    /// Resource id carried by the key, if there is a key
    pub fn parse_key(&self) -> InventoryResult<Option<String>> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let value: Value = serde_json::from_slice(key)
            .map_err(|e| InventoryError::Deserialization(format!("message key: {e}")))?;
        match unwrap_envelope(value) {
            Value::String(id) => Ok(Some(id)),
            Value::Null => Ok(None),
            other => Err(InventoryError::Deserialization(format!(
                "message key is not a string: {other}"
            ))),
        }
    }

    pub fn payload_value(&self) -> InventoryResult<Value> {
        let value: Value = serde_json::from_slice(&self.payload)
            .map_err(|e| InventoryError::Deserialization(format!("message payload: {e}")))?;
        Ok(unwrap_envelope(value))
    }

    /// Rebuild the `kessel.tuples` outbox row this message was captured from
    pub fn to_outbox_event(&self) -> InventoryResult<OutboxEvent> {
        let headers = self.parse_headers()?;
        Ok(OutboxEvent {
            id: Uuid::now_v7(),
            aggregate_type: AggregateType::Tuples,
            aggregate_id: self.parse_key()?.unwrap_or_default(),
            operation: headers.operation,
            txid: headers.txid,
            payload: self.payload_value()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReporterResourceKey;
    use crate::events::TupleEvent;
    use crate::domain::Version;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tuple_event() -> TupleEvent {
        TupleEvent {
            reporter_resource_key: ReporterResourceKey::parse("h1", "host", "hbi", "i1").unwrap(),
            operation_type: OperationType::Updated,
            common_version: Some(Version::new(2)),
            reporter_representation_version: Some(Version::new(2)),
            tuples: None,
        }
    }

    fn message() -> CdcMessage {
        let value = json!({"schema": {}, "payload": serde_json::to_value(tuple_event()).unwrap()});
        CdcMessage::new(serde_json::to_vec(&value).unwrap())
            .with_header("operation", "updated")
            .with_header("txid", "tx-9")
            .with_key(br#"{"schema": {}, "payload": "0190-resource"}"#.to_vec())
    }

    #[test]
    fn test_headers_parsed() {
        assert_eq!(
            message().parse_headers().unwrap(),
            CdcHeaders {
                operation: OperationType::Updated,
                txid: "tx-9".into(),
            }
        );
    }

    #[test]
    fn test_missing_txid_header_is_rejected() {
        let mut msg = message();
        msg.headers.remove("txid");
        assert!(msg.parse_headers().is_err());
    }

    #[test]
    fn test_empty_txid_is_allowed() {
        let msg = message().with_header("txid", "");
        assert_eq!(msg.parse_headers().unwrap().txid, "");
    }

    #[test]
    fn test_empty_or_unknown_operation_is_rejected() {
        assert!(message().with_header("operation", "").parse_headers().is_err());
        assert!(message().with_header("operation", "moved").parse_headers().is_err());
    }

    #[test]
    fn test_envelope_decodes_to_tuple_event() {
        let event = message().to_outbox_event().unwrap();
        assert_eq!(event.aggregate_id, "0190-resource");
        assert_eq!(event.txid, "tx-9");
        assert_eq!(event.tuple_event().unwrap(), tuple_event());
    }

    #[test]
    fn test_bare_payload_and_missing_key() {
        let msg = CdcMessage::new(serde_json::to_vec(&tuple_event()).unwrap())
            .with_header("operation", "created")
            .with_header("txid", "tx-1");
        let event = msg.to_outbox_event().unwrap();
        assert_eq!(event.aggregate_id, "");
        assert_eq!(event.operation, OperationType::Created);
        assert_eq!(event.tuple_event().unwrap().common_version, Some(Version::new(2)));
    }
}
