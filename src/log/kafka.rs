// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Kafka-backed event sink.
//!
//! The producer is synchronous per request: `publish` resolves only once
//! every in-sync replica has acknowledged the record (`acks=all`).
//! Transient broker errors are retried inside librdkafka up to the small
//! configured limit; past that the error surfaces to the caller
//! unacknowledged.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::debug;

use super::traits::{EventSink, LogError};

/// How long a publish may sit in the send queue before giving up.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct KafkaEventSink {
    producer: FutureProducer,
}

impl KafkaEventSink {
    /// Build a producer against the bootstrap endpoint(s).
    pub fn connect(bootstrap_servers: &str) -> Result<Self, LogError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("acks", "all")
            .set("message.send.max.retries", "3")
            .set("retry.backoff.ms", "100")
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| LogError::Config(e.to_string()))?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), LogError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(PUBLISH_TIMEOUT))
            .await
        {
            Ok((partition, offset)) => {
                debug!(topic, key, partition, offset, "Event published");
                Ok(())
            }
            Err((err, _unsent)) => Err(LogError::Publish(err.to_string())),
        }
    }
}
