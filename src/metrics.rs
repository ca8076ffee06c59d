//! Metrics instrumentation for shardline.
//!
//! Uses the `metrics` crate for backend-agnostic collection; each binary
//! chooses the exporter (the shipped ones install Prometheus and serve
//! `/metrics`).
//!
//! # Metric Naming Convention
//! - `shardline_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `topic`: posts, comments, likes
//! - `shard`: shard_0, shard_1, ...
//! - `status`: success, error, skipped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an event published to the log.
pub fn record_event_published(topic: &str, status: &str) {
    counter!(
        "shardline_events_published_total",
        "topic" => topic.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a consumed message outcome (applied, skipped, error).
pub fn record_message_processed(topic: &str, status: &str) {
    counter!(
        "shardline_messages_processed_total",
        "topic" => topic.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a write against a shard table.
pub fn record_shard_write(shard_id: u32, table: &str, status: &str) {
    counter!(
        "shardline_shard_writes_total",
        "shard" => format!("shard_{}", shard_id),
        "table" => table.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a read against a shard.
pub fn record_shard_query(shard_id: u32, status: &str) {
    counter!(
        "shardline_shard_queries_total",
        "shard" => format!("shard_{}", shard_id),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a scatter that dropped one or more shard contributions.
///
/// This is the only place partial results are visible; the response body
/// does not surface them.
pub fn record_partial_scatter(operation: &str, shards_dropped: usize) {
    counter!(
        "shardline_partial_scatters_total",
        "operation" => operation.to_string()
    )
    .increment(1);
    counter!(
        "shardline_scatter_shards_dropped_total",
        "operation" => operation.to_string()
    )
    .increment(shards_dropped as u64);
}

/// Record message processing latency.
pub fn record_apply_latency(topic: &str, duration: Duration) {
    histogram!(
        "shardline_message_apply_seconds",
        "topic" => topic.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record end-to-end request latency for an HTTP operation.
pub fn record_request_latency(endpoint: &str, duration: Duration) {
    histogram!(
        "shardline_http_request_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set the number of shards answering pings.
pub fn set_healthy_shards(healthy: usize, total: usize) {
    gauge!("shardline_healthy_shards").set(healthy as f64);
    gauge!("shardline_total_shards").set(total as f64);
}

/// Record a consumer state transition.
pub fn record_state_transition(state: &str) {
    counter!(
        "shardline_consumer_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// A timing guard that records apply latency on drop.
pub struct ApplyTimer {
    topic: &'static str,
    start: Instant,
}

impl ApplyTimer {
    /// Start a new timer for a topic's message.
    #[must_use]
    pub fn new(topic: &'static str) -> Self {
        Self {
            topic,
            start: Instant::now(),
        }
    }
}

impl Drop for ApplyTimer {
    fn drop(&mut self) {
        record_apply_latency(self.topic, self.start.elapsed());
    }
}
