// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The write applier.
//!
//! One consumer group applies every event to its owning shard with an
//! idempotent statement, so at-least-once delivery yields exactly-once
//! effect. That is the whole correctness argument, and the tests lean
//! on it hard.
//!
//! # Lifecycle
//!
//! ```text
//! Starting → Ready → Draining → Stopped
//! ```
//!
//! `Ready` latches on the first completed partition assignment and is
//! what the health endpoint reports. `Draining` finishes the in-flight
//! message and commits offsets before stopping.
//!
//! # Failure policy
//!
//! - Malformed payloads are poison: logged and skipped, with the offset
//!   committed. Progress on the partition beats one broken record.
//! - Shard failures leave the offset uncommitted; the record redelivers
//!   and a repeatedly failing record blocks its partition until an
//!   operator intervenes.

pub mod http;
pub mod kafka;

pub use kafka::KafkaApplier;

use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::event::Event;
use crate::metrics;
use crate::shard::{ShardError, ShardSet};

/// The single consumer group per deployment.
pub const CONSUMER_GROUP: &str = "db-writer-group";

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("consumer configuration error: {0}")]
    Config(String),
    #[error("log subscription error: {0}")]
    Subscribe(String),
}

/// Applier lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplierState {
    /// Waiting for the first partition assignment.
    Starting,
    /// Assigned and applying.
    Ready,
    /// Shutdown requested; finishing the in-flight message.
    Draining,
    /// Loop exited.
    Stopped,
}

impl std::fmt::Display for ApplierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Ready => write!(f, "Ready"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Shared status surface for the consumer process.
///
/// State changes are broadcast on a watch channel (for anything that
/// wants to follow transitions); readiness is additionally a latch:
/// once the first assignment completes the process reports ready for
/// the rest of its life, including while draining.
pub struct ConsumerStatus {
    state: watch::Sender<ApplierState>,
    state_rx: watch::Receiver<ApplierState>,
    ready: AtomicBool,
}

impl ConsumerStatus {
    #[must_use]
    pub fn new() -> Self {
        let (state, state_rx) = watch::channel(ApplierState::Starting);
        Self {
            state,
            state_rx,
            ready: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ApplierState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ApplierState> {
        self.state_rx.clone()
    }

    /// Whether the first partition assignment has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Record a state transition.
    pub fn set_state(&self, state: ApplierState) {
        metrics::record_state_transition(&state.to_string());
        let _ = self.state.send(state);
    }

    /// Latch readiness: called from the rebalance callback on the first
    /// completed assignment.
    pub fn mark_assigned(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.set_state(ApplierState::Ready);
    }
}

impl Default for ConsumerStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of handling one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event reached its shard (possibly as a no-op replay).
    Applied,
    /// Poison record dropped by design; the offset must still commit.
    Skipped,
}

/// Applies decoded events to their owning shards.
///
/// Holds at most one shard connection at a time per message; there are
/// no multi-shard transactions and no coordination across retries;
/// idempotent statements make both unnecessary.
pub struct Applier {
    shards: ShardSet,
}

impl Applier {
    #[must_use]
    pub fn new(shards: ShardSet) -> Self {
        Self { shards }
    }

    /// The fleet this applier writes to.
    #[must_use]
    pub fn shards(&self) -> &ShardSet {
        &self.shards
    }

    /// Handle one record from a topic.
    ///
    /// `Ok(_)` means the offset may be committed, including for skipped
    /// poison records. `Err(_)` means the offset must NOT be committed;
    /// the record will redeliver.
    #[tracing::instrument(skip(self, payload), fields(shard_id))]
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<ApplyOutcome, ShardError> {
        let event = match Event::decode(topic, payload) {
            Ok(event) => event,
            Err(e) => {
                // Deserialization failures are permanent; dropping the
                // record preserves partition progress.
                error!(topic, error = %e, "Skipping poison record");
                metrics::record_message_processed(topic, "skipped");
                return Ok(ApplyOutcome::Skipped);
            }
        };

        let _timer = metrics::ApplyTimer::new(event.topic());
        let (shard_id, store) = self.shards.owner(event.routing_key());
        tracing::Span::current().record("shard_id", shard_id);

        let (table, result) = match &event {
            Event::Post(e) => ("posts", store.insert_post(e).await),
            Event::Comment(e) => ("comments", store.insert_comment(e).await),
            Event::Like(e) => match e.action {
                crate::event::LikeAction::Like => ("likes", store.insert_like(e).await),
                crate::event::LikeAction::Unlike => (
                    "likes",
                    store.delete_like(e.post_id, &e.user_id).await.map(|rows| {
                        if rows == 0 {
                            // Already unliked or never liked; not an error.
                            debug!(post_id = %e.post_id, user_id = %e.user_id, "Unlike affected no rows");
                        }
                    }),
                ),
            },
        };

        match result {
            Ok(()) => {
                metrics::record_shard_write(shard_id, table, "success");
                metrics::record_message_processed(topic, "success");
                Ok(ApplyOutcome::Applied)
            }
            Err(e) => {
                metrics::record_shard_write(shard_id, table, "error");
                metrics::record_message_processed(topic, "error");
                warn!(shard_id, table, error = %e, "Shard apply failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CommentEvent, LikeAction, LikeEvent, PostEvent, TOPIC_POSTS};
    use crate::shard::{InMemoryShard, ShardStore};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn fleet(n: usize) -> (Applier, Vec<Arc<InMemoryShard>>) {
        let shards: Vec<Arc<InMemoryShard>> =
            (0..n).map(|_| Arc::new(InMemoryShard::new())).collect();
        let set = ShardSet::new(
            shards
                .iter()
                .map(|s| s.clone() as Arc<dyn ShardStore>)
                .collect(),
        );
        (Applier::new(set), shards)
    }

    fn post_event(user_id: &str) -> PostEvent {
        PostEvent {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: "hello".into(),
            timestamp: Utc::now(),
        }
    }

    fn like_event(post_id: Uuid, user_id: &str, action: LikeAction) -> LikeEvent {
        LikeEvent {
            id: Uuid::new_v4(),
            post_id,
            user_id: user_id.into(),
            action,
            timestamp: Utc::now(),
        }
    }

    async fn handle_event(applier: &Applier, event: &Event) -> Result<ApplyOutcome, ShardError> {
        applier
            .handle(event.topic(), &event.to_payload().unwrap())
            .await
    }

    #[tokio::test]
    async fn test_post_lands_on_routed_shard() {
        let (applier, shards) = fleet(3);
        let event = Event::Post(post_event("alice"));

        let outcome = handle_event(&applier, &event).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        let owner = applier.shards().router().route("alice") as usize;
        assert_eq!(shards[owner].counts().0, 1);
        for (i, shard) in shards.iter().enumerate() {
            if i != owner {
                assert_eq!(shard.counts().0, 0);
            }
        }
    }

    #[tokio::test]
    async fn test_redelivery_is_a_noop() {
        let (applier, shards) = fleet(3);
        let event = Event::Post(post_event("alice"));

        for _ in 0..5 {
            handle_event(&applier, &event).await.unwrap();
        }

        let total: usize = shards.iter().map(|s| s.counts().0).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_poison_record_is_skipped() {
        let (applier, _) = fleet(2);
        let outcome = applier.handle(TOPIC_POSTS, b"{ not json").await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_skipped() {
        let (applier, _) = fleet(2);
        let outcome = applier.handle("retweets", b"{}").await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_shard_failure_propagates() {
        let (applier, shards) = fleet(1);
        shards[0].set_available(false);

        let event = Event::Post(post_event("alice"));
        let err = handle_event(&applier, &event).await.unwrap_err();
        assert!(matches!(err, ShardError::Connection(_)));
    }

    #[tokio::test]
    async fn test_like_then_unlike_leaves_no_row() {
        let (applier, shards) = fleet(3);
        let post_id = Uuid::new_v4();

        let like = Event::Like(like_event(post_id, "bob", LikeAction::Like));
        let unlike = Event::Like(like_event(post_id, "bob", LikeAction::Unlike));

        handle_event(&applier, &like).await.unwrap();
        handle_event(&applier, &unlike).await.unwrap();

        let total: usize = shards.iter().map(|s| s.counts().2).sum();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_unlike_without_like_is_not_an_error() {
        let (applier, _) = fleet(2);
        let unlike = Event::Like(like_event(Uuid::new_v4(), "bob", LikeAction::Unlike));
        let outcome = handle_event(&applier, &unlike).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn test_comment_routes_by_commenter() {
        let (applier, shards) = fleet(3);
        let event = Event::Comment(CommentEvent {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            user_id: "carol".into(),
            content: "nice".into(),
            timestamp: Utc::now(),
        });

        handle_event(&applier, &event).await.unwrap();

        let owner = applier.shards().router().route("carol") as usize;
        assert_eq!(shards[owner].counts().1, 1);
    }

    #[test]
    fn test_status_latches_ready() {
        let status = ConsumerStatus::new();
        assert_eq!(status.state(), ApplierState::Starting);
        assert!(!status.is_ready());

        status.mark_assigned();
        assert_eq!(status.state(), ApplierState::Ready);
        assert!(status.is_ready());

        // Readiness survives draining.
        status.set_state(ApplierState::Draining);
        assert!(status.is_ready());
    }
}
