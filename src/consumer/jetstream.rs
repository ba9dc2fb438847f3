// Copyright (c) 2025 - Cowboy AI, Inc.
//! JetStream CDC source
//!
//! Pulls CDC messages for `kessel.tuples` outbox rows from a durable
//! JetStream consumer and feeds them to the replication consumer.
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_inventory::config::JetStreamSourceConfig;
//! use cim_inventory::consumer::JetStreamEventSource;
//! use cim_inventory::events::event_channel;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (emitter, _events) = event_channel(100);
//!     let source = JetStreamEventSource::connect(JetStreamSourceConfig::default(), emitter).await?;
//!     source.run().await?;
//!     Ok(())
//! }
//! ```

use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, consumer::PullConsumer};
use async_nats::HeaderMap;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::message::CdcMessage;
use crate::config::JetStreamSourceConfig;
use crate::errors::{InventoryError, InventoryResult};
use crate::events::EventEmitter;

/// Header carrying the CDC message key, when the sink forwards one
pub const KEY_HEADER: &str = "key";

/// Build a [`CdcMessage`] from a NATS payload and its headers
pub fn cdc_message_from_nats(payload: &[u8], headers: Option<&HeaderMap>) -> CdcMessage {
    let mut cdc = CdcMessage::new(payload.to_vec());
    if let Some(headers) = headers {
        for name in [super::message::OPERATION_HEADER, super::message::TXID_HEADER] {
            if let Some(value) = headers.get(name) {
                cdc = cdc.with_header(name, value.as_str());
            }
        }
        if let Some(key) = headers.get(KEY_HEADER) {
            cdc = cdc.with_key(key.as_str().as_bytes().to_vec());
        }
    }
    cdc
}

pub struct JetStreamEventSource {
    consumer: PullConsumer,
    config: JetStreamSourceConfig,
    emitter: EventEmitter,
}

impl JetStreamEventSource {
    /// Connect, ensure the stream and durable consumer exist
    pub async fn connect(config: JetStreamSourceConfig, emitter: EventEmitter) -> InventoryResult<Self> {
        let client = async_nats::connect(config.servers.join(","))
            .await
            .map_err(|e| InventoryError::NatsConnection(e.to_string()))?;
        info!(servers = ?config.servers, "connected to NATS");
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![config.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| InventoryError::NatsConnection(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &config.durable_name,
                pull::Config {
                    durable_name: Some(config.durable_name.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| InventoryError::NatsSubscribe(e.to_string()))?;
        info!(
            stream = %config.stream_name,
            consumer = %config.durable_name,
            "JetStream CDC source ready"
        );

        Ok(Self {
            consumer,
            config,
            emitter,
        })
    }

    /// Poll forever
    pub async fn run(&self) -> InventoryResult<()> {
        loop {
            let received = self.poll_once().await?;
            if received == 0 {
                debug!("no CDC messages in fetch window");
            }
        }
    }

    /// Fetch one batch; returns the number of messages acknowledged
    pub async fn poll_once(&self) -> InventoryResult<usize> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(self.config.batch_size)
            .expires(self.config.fetch_timeout)
            .messages()
            .await
            .map_err(|e| InventoryError::NatsSubscribe(e.to_string()))?;

        let mut count = 0;
        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| InventoryError::NatsSubscribe(e.to_string()))?;

            match cdc_message_from_nats(&message.payload, message.headers.as_ref()).to_outbox_event() {
                Ok(event) => {
                    self.emitter.emit(event);
                }
                // Redelivery would fail the same way
                Err(err) => warn!(subject = %message.subject, error = %err, "dropping malformed CDC message"),
            }

            message
                .ack()
                .await
                .map_err(|e| InventoryError::NatsSubscribe(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"payload": {"a": 1}}"#;

    #[test]
    fn test_headers_are_copied() {
        let mut headers = HeaderMap::new();
        headers.insert("operation", "created");
        headers.insert("txid", "tx-1");
        headers.insert("key", "\"res-1\"");
        headers.insert("ignored", "x");

        let cdc = cdc_message_from_nats(PAYLOAD, Some(&headers));
        assert_eq!(cdc.headers.len(), 2);
        let event = cdc.to_outbox_event().unwrap();
        assert_eq!(event.txid, "tx-1");
        assert_eq!(event.aggregate_id, "res-1");
    }

    #[test]
    fn test_message_without_headers_fails_to_parse() {
        let cdc = cdc_message_from_nats(PAYLOAD, None);
        assert!(cdc.parse_headers().is_err());
    }
}
