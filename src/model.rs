//! Row types stored in the shards and the aggregates the read tier
//! assembles from them.
//!
//! Each logical entity lives on exactly one shard, chosen by hashing its
//! routing key (always the authoring user's id). A comment's `post_id`
//! may point at a post on a different shard; no cross-shard foreign key
//! is enforced and readers tolerate dangling references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A post row. Immutable once applied; there is no update or delete path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A comment row, stored on the *commenter's* shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A like row. Exists while the user's last action on `(post_id, user_id)`
/// is `like`; an unlike deletes it outright (no tombstone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Like {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user authored-activity counts, complete from the owning shard
/// alone because routing is by actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub post_count: i64,
    pub comment_count: i64,
    pub like_count: i64,
}

/// Aggregate counts bundled with a post detail response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub comment_count: usize,
    pub like_count: usize,
}

/// A post with its scattered comments and likes.
///
/// Comments arrive ordered by `created_at` ascending. A shard that fails
/// during the comment/like scatter is dropped from the bundle; the body
/// does not surface partialness (recorded via metrics instead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub likes: Vec<Like>,
    pub stats: PostStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            content: "hi".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_post_json_shape() {
        let post = sample_post();
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["user_id"], "alice");
        assert_eq!(json["content"], "hi");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn test_updated_at_not_before_created_at() {
        let post = sample_post();
        assert!(post.updated_at >= post.created_at);
    }

    #[test]
    fn test_user_stats_roundtrip() {
        let stats = UserStats {
            user_id: "bob".into(),
            post_count: 3,
            comment_count: 1,
            like_count: 7,
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: UserStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
