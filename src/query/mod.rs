// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The read planner.
//!
//! Reads keyed by a user go to the single owning shard. Reads keyed by
//! post id scatter to every shard in parallel and merge, because a post
//! is located by its author, not its id. A shard failing during a
//! scatter is dropped from the merge (counted via metrics, invisible in
//! the body); a failing single-shard read surfaces as an error.
//!
//! Scatter futures are dropped when the request is cancelled, which
//! releases their pooled connections; client disconnects do not pin
//! the fleet.

pub mod http;

use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::metrics;
use crate::model::{Comment, Like, Post, PostDetail, PostStats, UserStats};
use crate::shard::{ShardError, ShardSet};

/// Default page size for a user's posts.
pub const DEFAULT_USER_POSTS_LIMIT: i64 = 10;
/// Default size of the cross-shard recency feed.
pub const DEFAULT_RECENT_LIMIT: i64 = 20;

/// Normalize a client-supplied limit: absent, zero, or negative all mean
/// the default.
#[must_use]
pub fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    match limit {
        Some(l) if l >= 1 => l,
        _ => default,
    }
}

/// Normalize a client-supplied offset: absent or negative means 0.
#[must_use]
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.filter(|o| *o >= 0).unwrap_or(0)
}

/// Merge scattered recency candidates: newest first, ties broken by id
/// ascending so the feed is deterministic across runs and replicas.
#[must_use]
pub fn merge_recent(mut candidates: Vec<Post>, limit: usize) -> Vec<Post> {
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    candidates.truncate(limit);
    candidates
}

pub struct QueryPlanner {
    shards: ShardSet,
}

impl QueryPlanner {
    #[must_use]
    pub fn new(shards: ShardSet) -> Self {
        Self { shards }
    }

    #[must_use]
    pub fn shards(&self) -> &ShardSet {
        &self.shards
    }

    /// Posts authored by one user: single-shard, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn user_posts(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Post>, ShardError> {
        let limit = clamp_limit(limit, DEFAULT_USER_POSTS_LIMIT);
        let offset = clamp_offset(offset);

        let (shard_id, store) = self.shards.owner(user_id);
        let result = store.posts_by_user(user_id, limit, offset).await;
        metrics::record_shard_query(shard_id, if result.is_ok() { "success" } else { "error" });
        result
    }

    /// Authored-activity counts for one user: single-shard, complete by
    /// construction since routing is by actor.
    #[tracing::instrument(skip(self))]
    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats, ShardError> {
        let (shard_id, store) = self.shards.owner(user_id);
        let result = store.user_stats(user_id).await;
        metrics::record_shard_query(shard_id, if result.is_ok() { "success" } else { "error" });

        let (post_count, comment_count, like_count) = result?;
        Ok(UserStats {
            user_id: user_id.to_string(),
            post_count,
            comment_count,
            like_count,
        })
    }

    /// A post with its comments and likes, assembled by scatter-gather.
    ///
    /// At most one shard holds the post row. Comments and likes are
    /// scattered separately because they live on their authors' shards;
    /// a shard failing either collection is dropped from the result.
    #[tracing::instrument(skip(self))]
    pub async fn post_detail(&self, post_id: Uuid) -> Option<PostDetail> {
        let post = self.locate_post(post_id).await?;

        let (comments, likes) = tokio::join!(
            self.scatter_comments(post_id),
            self.scatter_likes(post_id)
        );

        let stats = PostStats {
            comment_count: comments.len(),
            like_count: likes.len(),
        };
        Some(PostDetail {
            post,
            comments,
            likes,
            stats,
        })
    }

    /// The newest posts across the whole fleet.
    ///
    /// Each shard contributes its own top-`limit`; the merged result is
    /// therefore always a subset of the union of per-shard tops.
    #[tracing::instrument(skip(self))]
    pub async fn recent_posts(&self, limit: Option<i64>) -> Vec<Post> {
        let limit = clamp_limit(limit, DEFAULT_RECENT_LIMIT);

        let fetches = self.shards.iter().map(|(shard_id, store)| {
            let store = Arc::clone(store);
            async move { (shard_id, store.recent_posts(limit).await) }
        });

        let mut candidates = Vec::new();
        let mut dropped = 0usize;
        for (shard_id, result) in join_all(fetches).await {
            match result {
                Ok(posts) => {
                    metrics::record_shard_query(shard_id, "success");
                    candidates.extend(posts);
                }
                Err(e) => {
                    metrics::record_shard_query(shard_id, "error");
                    warn!(shard_id, error = %e, "Dropping shard from recency scatter");
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            metrics::record_partial_scatter("recent_posts", dropped);
        }

        merge_recent(candidates, limit as usize)
    }

    /// Liveness of the fleet: `(healthy, total)`.
    pub async fn ping_shards(&self) -> (usize, usize) {
        let (healthy, total) = self.shards.ping_all().await;
        metrics::set_healthy_shards(healthy, total);
        (healthy, total)
    }

    /// Point-scatter for the post row; failures drop the shard.
    async fn locate_post(&self, post_id: Uuid) -> Option<Post> {
        let lookups = self.shards.iter().map(|(shard_id, store)| {
            let store = Arc::clone(store);
            async move { (shard_id, store.find_post(post_id).await) }
        });

        let mut found = None;
        let mut dropped = 0usize;
        for (shard_id, result) in join_all(lookups).await {
            match result {
                Ok(Some(post)) => {
                    metrics::record_shard_query(shard_id, "success");
                    found = Some(post);
                }
                Ok(None) => metrics::record_shard_query(shard_id, "success"),
                Err(e) => {
                    metrics::record_shard_query(shard_id, "error");
                    warn!(shard_id, error = %e, "Dropping shard from post lookup");
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            metrics::record_partial_scatter("get_post", dropped);
        }
        found
    }

    async fn scatter_comments(&self, post_id: Uuid) -> Vec<Comment> {
        let fetches = self.shards.iter().map(|(shard_id, store)| {
            let store = Arc::clone(store);
            async move { (shard_id, store.comments_for_post(post_id).await) }
        });

        let mut comments = Vec::new();
        let mut dropped = 0usize;
        for (shard_id, result) in join_all(fetches).await {
            match result {
                Ok(batch) => {
                    metrics::record_shard_query(shard_id, "success");
                    comments.extend(batch);
                }
                Err(e) => {
                    metrics::record_shard_query(shard_id, "error");
                    warn!(shard_id, error = %e, "Dropping shard from comment scatter");
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            metrics::record_partial_scatter("get_post", dropped);
        }

        // Per-shard batches are already oldest-first; re-sort the merged
        // set to interleave across shards.
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        comments
    }

    async fn scatter_likes(&self, post_id: Uuid) -> Vec<Like> {
        let fetches = self.shards.iter().map(|(shard_id, store)| {
            let store = Arc::clone(store);
            async move { (shard_id, store.likes_for_post(post_id).await) }
        });

        let mut likes = Vec::new();
        let mut dropped = 0usize;
        for (shard_id, result) in join_all(fetches).await {
            match result {
                Ok(batch) => {
                    metrics::record_shard_query(shard_id, "success");
                    likes.extend(batch);
                }
                Err(e) => {
                    metrics::record_shard_query(shard_id, "error");
                    warn!(shard_id, error = %e, "Dropping shard from like scatter");
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            metrics::record_partial_scatter("get_post", dropped);
        }
        likes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LikeAction, LikeEvent, PostEvent};
    use crate::shard::{InMemoryShard, ShardStore};
    use chrono::{Duration as ChronoDuration, Utc};

    fn fleet(n: usize) -> (QueryPlanner, Vec<Arc<InMemoryShard>>) {
        let shards: Vec<Arc<InMemoryShard>> =
            (0..n).map(|_| Arc::new(InMemoryShard::new())).collect();
        let set = ShardSet::new(
            shards
                .iter()
                .map(|s| s.clone() as Arc<dyn ShardStore>)
                .collect(),
        );
        (QueryPlanner::new(set), shards)
    }

    fn post_at(user_id: &str, content: &str, seconds_ago: i64) -> PostEvent {
        PostEvent {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            timestamp: Utc::now() - ChronoDuration::seconds(seconds_ago),
        }
    }

    async fn seed_post(planner: &QueryPlanner, event: &PostEvent) {
        let (_, store) = planner.shards().owner(&event.user_id);
        store.insert_post(event).await.unwrap();
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 10), 10);
        assert_eq!(clamp_limit(Some(0), 10), 10);
        assert_eq!(clamp_limit(Some(-3), 10), 10);
        assert_eq!(clamp_limit(Some(5), 10), 5);
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(None), 0);
        assert_eq!(clamp_offset(Some(-1)), 0);
        assert_eq!(clamp_offset(Some(7)), 7);
    }

    #[test]
    fn test_merge_recent_orders_and_truncates() {
        let now = Utc::now();
        let mut posts = Vec::new();
        for age in [30, 10, 20] {
            posts.push(Post {
                id: Uuid::new_v4(),
                user_id: "u".into(),
                content: format!("{}s ago", age),
                created_at: now - ChronoDuration::seconds(age),
                updated_at: now - ChronoDuration::seconds(age),
            });
        }

        let merged = merge_recent(posts, 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "10s ago");
        assert_eq!(merged[1].content, "20s ago");
    }

    #[test]
    fn test_merge_recent_ties_break_by_id_ascending() {
        let now = Utc::now();
        let mut ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let posts: Vec<Post> = ids
            .iter()
            .map(|&id| Post {
                id,
                user_id: "u".into(),
                content: "tied".into(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let merged = merge_recent(posts, 4);
        ids.sort();
        let merged_ids: Vec<Uuid> = merged.iter().map(|p| p.id).collect();
        assert_eq!(merged_ids, ids);
    }

    #[tokio::test]
    async fn test_user_posts_hits_only_owning_shard() {
        let (planner, _) = fleet(3);
        seed_post(&planner, &post_at("alice", "hi", 0)).await;

        let posts = planner.user_posts("alice", None, None).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].user_id, "alice");
    }

    #[tokio::test]
    async fn test_user_posts_error_when_owner_down() {
        let (planner, shards) = fleet(3);
        let owner = planner.shards().router().route("alice") as usize;
        shards[owner].set_available(false);

        assert!(planner.user_posts("alice", None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_post_detail_found_across_shards() {
        let (planner, _) = fleet(3);
        let post = post_at("alice", "hi", 0);
        seed_post(&planner, &post).await;

        // A like from a user on a different shard than the author.
        let like = LikeEvent {
            id: Uuid::new_v4(),
            post_id: post.id,
            user_id: "bob".into(),
            action: LikeAction::Like,
            timestamp: Utc::now(),
        };
        let (_, store) = planner.shards().owner("bob");
        store.insert_like(&like).await.unwrap();

        let detail = planner.post_detail(post.id).await.unwrap();
        assert_eq!(detail.post.id, post.id);
        assert_eq!(detail.likes.len(), 1);
        assert_eq!(detail.stats.like_count, 1);
        assert_eq!(detail.stats.comment_count, 0);
    }

    #[tokio::test]
    async fn test_post_detail_missing_is_none() {
        let (planner, _) = fleet(2);
        assert!(planner.post_detail(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_recent_posts_merges_across_shards() {
        let (planner, _) = fleet(3);
        for i in 0..10 {
            seed_post(&planner, &post_at(&format!("u{}", i), &format!("post {}", i), i)).await;
        }

        let posts = planner.recent_posts(Some(5)).await;
        assert_eq!(posts.len(), 5);
        for window in posts.windows(2) {
            assert!(window[0].created_at >= window[1].created_at);
        }
        assert_eq!(posts[0].content, "post 0");
    }

    #[tokio::test]
    async fn test_recent_posts_drops_dead_shard() {
        let (planner, shards) = fleet(3);
        for i in 0..9 {
            seed_post(&planner, &post_at(&format!("u{}", i), &format!("post {}", i), i)).await;
        }
        shards[1].set_available(false);

        let posts = planner.recent_posts(Some(20)).await;
        let expected: usize = [0usize, 2]
            .iter()
            .map(|&i| shards[i].counts().0)
            .sum();
        assert_eq!(posts.len(), expected);
    }

    #[tokio::test]
    async fn test_ping_shards_counts_healthy() {
        let (planner, shards) = fleet(3);
        shards[2].set_available(false);
        assert_eq!(planner.ping_shards().await, (2, 3));
    }
}
