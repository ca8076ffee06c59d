//! Failure-scenario tests for the write applier.
//!
//! Everything here is about what happens when a piece misbehaves:
//! poison records, shards dropping mid-stream, redelivery storms, and
//! the log refusing writes. The recurring assertion is the same one the
//! consumer is built on: redelivery never changes the final state.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use shardline::event::{
    Event, LikeAction, LikeEvent, PostEvent, TOPIC_LIKES, TOPIC_POSTS,
};
use shardline::{
    Applier, ApplyOutcome, IngestService, InMemoryShard, MemoryLog, ShardSet, ShardStore,
};

fn fleet(n: usize) -> (Applier, Vec<Arc<InMemoryShard>>) {
    let shards: Vec<Arc<InMemoryShard>> = (0..n).map(|_| Arc::new(InMemoryShard::new())).collect();
    let set = ShardSet::new(
        shards
            .iter()
            .map(|s| s.clone() as Arc<dyn ShardStore>)
            .collect(),
    );
    (Applier::new(set), shards)
}

fn post_event(user_id: &str, content: &str) -> Event {
    Event::Post(PostEvent {
        id: Uuid::new_v4(),
        user_id: user_id.into(),
        content: content.into(),
        timestamp: Utc::now(),
    })
}

fn like_event(post_id: Uuid, user_id: &str, action: LikeAction) -> Event {
    Event::Like(LikeEvent {
        id: Uuid::new_v4(),
        post_id,
        user_id: user_id.into(),
        action,
        timestamp: Utc::now(),
    })
}

async fn apply(applier: &Applier, event: &Event) -> ApplyOutcome {
    applier
        .handle(event.topic(), &event.to_payload().unwrap())
        .await
        .unwrap()
}

fn total_rows(shards: &[Arc<InMemoryShard>]) -> (usize, usize, usize) {
    shards.iter().fold((0, 0, 0), |acc, shard| {
        let (p, c, l) = shard.counts();
        (acc.0 + p, acc.1 + c, acc.2 + l)
    })
}

// =============================================================================
// Poison records
// =============================================================================

#[tokio::test]
async fn poison_record_does_not_block_the_partition() {
    let (applier, shards) = fleet(2);

    let outcome = applier.handle(TOPIC_POSTS, b"\xff\xfe garbage").await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Skipped);

    // The next record on the same topic still applies.
    let event = post_event("alice", "after the poison");
    assert_eq!(apply(&applier, &event).await, ApplyOutcome::Applied);
    assert_eq!(total_rows(&shards).0, 1);
}

#[tokio::test]
async fn wrong_kind_payload_on_topic_is_poison() {
    let (applier, shards) = fleet(2);

    // A valid like payload arriving on the posts topic cannot decode as
    // a post event and is dropped, not misapplied.
    let like = like_event(Uuid::new_v4(), "bob", LikeAction::Like);
    let outcome = applier
        .handle(TOPIC_POSTS, &like.to_payload().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Skipped);
    assert_eq!(total_rows(&shards), (0, 0, 0));
}

// =============================================================================
// Shard failure and redelivery
// =============================================================================

#[tokio::test]
async fn failed_apply_succeeds_on_redelivery_after_recovery() {
    let (applier, shards) = fleet(1);
    let event = post_event("alice", "hi");

    shards[0].set_available(false);
    assert!(applier
        .handle(event.topic(), &event.to_payload().unwrap())
        .await
        .is_err());
    assert_eq!(total_rows(&shards).0, 0);

    // Offset was never committed; the same record arrives again once
    // the shard is back.
    shards[0].set_available(true);
    assert_eq!(apply(&applier, &event).await, ApplyOutcome::Applied);
    assert_eq!(total_rows(&shards).0, 1);
}

#[tokio::test]
async fn one_dead_shard_does_not_stop_other_actors() {
    let (applier, shards) = fleet(3);
    let router = applier.shards().router();

    let dead = 1u32;
    shards[dead as usize].set_available(false);

    let mut applied = 0;
    let mut failed = 0;
    for i in 0..30 {
        let event = post_event(&format!("user-{}", i), "content");
        let result = applier
            .handle(event.topic(), &event.to_payload().unwrap())
            .await;
        if router.route(event.routing_key()) == dead {
            assert!(result.is_err());
            failed += 1;
        } else {
            assert_eq!(result.unwrap(), ApplyOutcome::Applied);
            applied += 1;
        }
    }

    assert!(applied > 0);
    assert!(failed > 0);
    assert_eq!(total_rows(&shards).0, applied);
}

// =============================================================================
// Like/unlike ordering under redelivery
// =============================================================================

#[tokio::test]
async fn like_unlike_converges_under_every_redelivery_pattern() {
    // like → unlike published in order on one key; redelivery may repeat
    // any prefix-respecting pattern. The row must end deleted.
    let post_id = Uuid::new_v4();
    let like = like_event(post_id, "bob", LikeAction::Like);
    let unlike = like_event(post_id, "bob", LikeAction::Unlike);

    let patterns: Vec<Vec<&Event>> = vec![
        vec![&like, &unlike],
        vec![&like, &like, &unlike],
        vec![&like, &unlike, &unlike],
        vec![&like, &like, &unlike, &unlike],
        // Full replay from offset zero after a crash.
        vec![&like, &unlike, &like, &unlike],
    ];

    for pattern in patterns {
        let (applier, shards) = fleet(3);
        for event in pattern {
            apply(&applier, event).await;
        }
        assert_eq!(total_rows(&shards).2, 0, "a like row survived");
    }
}

#[tokio::test]
async fn replaying_the_full_log_reproduces_identical_state() {
    let log = Arc::new(MemoryLog::new(4));
    let service = IngestService::new(log.clone());

    // A busy mixed workload, all through the real ingestion path.
    let mut post_ids = Vec::new();
    for i in 0..6 {
        let id = service
            .create_post(&format!("author-{}", i), &format!("post {}", i))
            .await
            .unwrap();
        post_ids.push(id.to_string());
    }
    for (i, post_id) in post_ids.iter().enumerate() {
        service
            .create_comment(post_id, &format!("commenter-{}", i), "nice")
            .await
            .unwrap();
        service
            .like(post_id, "liker-a", "like")
            .await
            .unwrap();
        service.like(post_id, "liker-a", "like").await.unwrap();
        if i % 2 == 0 {
            service.like(post_id, "liker-a", "unlike").await.unwrap();
        }
    }

    let deliver = |applier: Applier| {
        let log = log.clone();
        async move {
            for topic in shardline::event::ALL_TOPICS {
                for record in log.records(topic) {
                    let _ = applier.handle(topic, &record.payload).await;
                }
            }
            applier
        }
    };

    // Fresh fleet, one delivery.
    let (applier_once, shards_once) = fleet(3);
    let _ = deliver(applier_once).await;

    // Fresh fleet, the stream delivered three times over.
    let (applier_thrice, shards_thrice) = fleet(3);
    let applier_thrice = deliver(applier_thrice).await;
    let applier_thrice = deliver(applier_thrice).await;
    let _ = deliver(applier_thrice).await;

    let snapshots_once: Vec<_> = shards_once.iter().map(|s| s.snapshot()).collect();
    let snapshots_thrice: Vec<_> = shards_thrice.iter().map(|s| s.snapshot()).collect();
    assert_eq!(snapshots_once, snapshots_thrice);

    // And the like table respects the (post_id, user_id) uniqueness
    // everywhere.
    for shard in &shards_once {
        let (_, _, likes) = shard.snapshot();
        let mut pairs: Vec<(Uuid, String)> = likes
            .iter()
            .map(|l| (l.post_id, l.user_id.clone()))
            .collect();
        let before = pairs.len();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), before, "duplicate (post_id, user_id) pair");
    }
}

// =============================================================================
// Log unavailability
// =============================================================================

#[tokio::test]
async fn log_outage_rejects_writes_then_recovers() {
    let log = Arc::new(MemoryLog::new(2));
    let service = IngestService::new(log.clone());

    log.set_available(false);
    assert!(service.create_post("alice", "hi").await.is_err());
    assert!(log.is_empty(TOPIC_POSTS));

    log.set_available(true);
    assert!(service.create_post("alice", "hi").await.is_ok());
    assert_eq!(log.len(TOPIC_POSTS), 1);

    // The failed attempt left nothing behind: exactly one event.
    assert_eq!(log.len(TOPIC_LIKES), 0);
}
