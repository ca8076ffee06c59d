// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Kafka consumer-group loop driving the [`Applier`].
//!
//! Offsets are committed per message, only after the apply succeeds.
//! A failed apply seeks the partition back to the failed record, so the
//! next fetch redelivers it; the partition blocks behind a persistently
//! failing record rather than losing it.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::client::ClientContext;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::Offset;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{Applier, ApplierState, ConsumerError, ConsumerStatus, CONSUMER_GROUP};
use crate::event::ALL_TOPICS;

/// Backoff before refetching a record whose apply failed, so a dead
/// shard doesn't spin the loop.
const REDELIVERY_BACKOFF: Duration = Duration::from_secs(1);

/// Client context that latches readiness on the first assignment.
struct ApplierContext {
    status: Arc<ConsumerStatus>,
}

impl ClientContext for ApplierContext {}

impl ConsumerContext for ApplierContext {
    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(assignment) => {
                info!(partitions = assignment.count(), "Partitions assigned");
                self.status.mark_assigned();
            }
            Rebalance::Revoke(revoked) => {
                info!(partitions = revoked.count(), "Partitions revoked");
            }
            Rebalance::Error(e) => {
                error!(error = %e, "Rebalance error");
            }
        }
    }
}

pub struct KafkaApplier {
    consumer: StreamConsumer<ApplierContext>,
    applier: Applier,
    status: Arc<ConsumerStatus>,
}

impl KafkaApplier {
    /// Join the `db-writer-group` and subscribe to all three topics.
    pub fn connect(
        bootstrap_servers: &str,
        applier: Applier,
        status: Arc<ConsumerStatus>,
    ) -> Result<Self, ConsumerError> {
        let context = ApplierContext {
            status: status.clone(),
        };

        let consumer: StreamConsumer<ApplierContext> = ClientConfig::new()
            .set("group.id", CONSUMER_GROUP)
            .set("bootstrap.servers", bootstrap_servers)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .set("heartbeat.interval.ms", "3000")
            .set("partition.assignment.strategy", "roundrobin")
            .create_with_context(context)
            .map_err(|e| ConsumerError::Config(e.to_string()))?;

        consumer
            .subscribe(&ALL_TOPICS)
            .map_err(|e| ConsumerError::Subscribe(e.to_string()))?;

        Ok(Self {
            consumer,
            applier,
            status,
        })
    }

    /// Poll/apply until `shutdown` fires, then drain and stop.
    ///
    /// The in-flight message always completes before the shutdown branch
    /// is taken; draining commits the consumer position so a clean stop
    /// never replays more than the log's at-least-once floor anyway.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(group = CONSUMER_GROUP, topics = ?ALL_TOPICS, "Consumer loop started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    self.status.set_state(ApplierState::Draining);
                    info!("Shutdown signal received; draining");
                    break;
                }
                fetched = self.consumer.recv() => {
                    match fetched {
                        Ok(message) => self.process(&message).await,
                        Err(e) => {
                            error!(error = %e, "Log fetch error");
                        }
                    }
                }
            }
        }

        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Sync) {
            warn!(error = %e, "Final offset commit failed");
        }
        self.status.set_state(ApplierState::Stopped);
        info!("Consumer loop stopped");
    }

    async fn process(&self, message: &BorrowedMessage<'_>) {
        let topic = message.topic();
        let payload = message.payload().unwrap_or_default();

        match self.applier.handle(topic, payload).await {
            Ok(_) => {
                // Applied or skipped poison: either way the offset moves.
                if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
                    warn!(topic, offset = message.offset(), error = %e, "Offset commit failed");
                }
            }
            Err(e) => {
                error!(
                    topic,
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %e,
                    "Apply failed; seeking back for redelivery"
                );
                if let Err(seek_err) = self.consumer.seek(
                    topic,
                    message.partition(),
                    Offset::Offset(message.offset()),
                    Duration::from_secs(5),
                ) {
                    // Seek can fail during a rebalance; the group will
                    // redeliver from the committed offset regardless.
                    warn!(error = %seek_err, "Seek failed");
                }
                tokio::time::sleep(REDELIVERY_BACKOFF).await;
            }
        }
    }
}
