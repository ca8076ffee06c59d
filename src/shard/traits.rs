use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::event::{CommentEvent, LikeEvent, PostEvent};
use crate::model::{Comment, Like, Post};

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("shard connection error: {0}")]
    Connection(String),
    #[error("shard statement error: {0}")]
    Statement(String),
}

impl ShardError {
    /// Classify a sqlx error: pool/IO problems are transient connection
    /// errors, everything else is a statement error.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Tls(_) => Self::Connection(err.to_string()),
            other => Self::Statement(other.to_string()),
        }
    }
}

/// One shard of the fleet.
///
/// The write side is owned by the consumer and is idempotent end to end:
/// every statement is a no-op on replay, which is what turns the log's
/// at-least-once delivery into exactly-once effect. The read side is
/// owned by the query planner.
#[async_trait]
pub trait ShardStore: Send + Sync {
    // --- Write side (consumer) ---

    /// Insert a post row; a row with the same `id` already present means
    /// a redelivered event, and the statement does nothing.
    async fn insert_post(&self, event: &PostEvent) -> Result<(), ShardError>;

    /// Insert a comment row; same redelivery contract as posts.
    async fn insert_comment(&self, event: &CommentEvent) -> Result<(), ShardError>;

    /// Insert a like row unless `(post_id, user_id)` already exists.
    /// The `id` of a duplicate like event is discarded.
    async fn insert_like(&self, event: &LikeEvent) -> Result<(), ShardError>;

    /// Delete the like row for `(post_id, user_id)`. Returns rows
    /// affected; 0 (already unliked or never liked) is not an error.
    async fn delete_like(&self, post_id: Uuid, user_id: &str) -> Result<u64, ShardError>;

    // --- Read side (query planner) ---

    /// Posts authored by `user_id`, newest first.
    async fn posts_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, ShardError>;

    /// Point lookup by post id. At most one shard in the fleet returns a
    /// row for any given id.
    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>, ShardError>;

    /// Comments on a post held by this shard, oldest first.
    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>, ShardError>;

    /// Likes on a post held by this shard.
    async fn likes_for_post(&self, post_id: Uuid) -> Result<Vec<Like>, ShardError>;

    /// This shard's newest posts, for the cross-shard recency merge.
    async fn recent_posts(&self, limit: i64) -> Result<Vec<Post>, ShardError>;

    /// `(post_count, comment_count, like_count)` authored by `user_id`.
    async fn user_stats(&self, user_id: &str) -> Result<(i64, i64, i64), ShardError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), ShardError>;
}
