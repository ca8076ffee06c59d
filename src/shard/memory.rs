//! In-memory shard backend.
//!
//! Mirrors the Postgres statement contracts (conflict-skipping inserts,
//! rows-affected on delete, the same orderings) so the
//! consumer and query planner can be exercised without a database.
//! An availability switch simulates an unreachable shard.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::traits::{ShardError, ShardStore};
use crate::event::{CommentEvent, LikeEvent, PostEvent};
use crate::model::{Comment, Like, Post};

#[derive(Default)]
struct Tables {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    likes: Vec<Like>,
}

pub struct InMemoryShard {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl InMemoryShard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Flip shard availability; while unavailable every operation fails
    /// with a connection error, like a shard that dropped off the
    /// network.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ShardError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ShardError::Connection("shard unreachable".into()))
        }
    }

    /// Row counts `(posts, comments, likes)`.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        let tables = self.tables.read();
        (tables.posts.len(), tables.comments.len(), tables.likes.len())
    }

    /// Full contents sorted by id, for state-equality assertions.
    #[must_use]
    pub fn snapshot(&self) -> (Vec<Post>, Vec<Comment>, Vec<Like>) {
        let tables = self.tables.read();
        let mut posts = tables.posts.clone();
        let mut comments = tables.comments.clone();
        let mut likes = tables.likes.clone();
        posts.sort_by_key(|p| p.id);
        comments.sort_by_key(|c| c.id);
        likes.sort_by_key(|l| l.id);
        (posts, comments, likes)
    }
}

impl Default for InMemoryShard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardStore for InMemoryShard {
    async fn insert_post(&self, event: &PostEvent) -> Result<(), ShardError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        if tables.posts.iter().any(|p| p.id == event.id) {
            return Ok(());
        }
        tables.posts.push(Post {
            id: event.id,
            user_id: event.user_id.clone(),
            content: event.content.clone(),
            created_at: event.timestamp,
            updated_at: event.timestamp,
        });
        Ok(())
    }

    async fn insert_comment(&self, event: &CommentEvent) -> Result<(), ShardError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        if tables.comments.iter().any(|c| c.id == event.id) {
            return Ok(());
        }
        tables.comments.push(Comment {
            id: event.id,
            post_id: event.post_id,
            user_id: event.user_id.clone(),
            content: event.content.clone(),
            created_at: event.timestamp,
            updated_at: event.timestamp,
        });
        Ok(())
    }

    async fn insert_like(&self, event: &LikeEvent) -> Result<(), ShardError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        if tables
            .likes
            .iter()
            .any(|l| l.post_id == event.post_id && l.user_id == event.user_id)
        {
            // Duplicate pair: the later event's id is discarded.
            return Ok(());
        }
        tables.likes.push(Like {
            id: event.id,
            post_id: event.post_id,
            user_id: event.user_id.clone(),
            created_at: event.timestamp,
        });
        Ok(())
    }

    async fn delete_like(&self, post_id: Uuid, user_id: &str) -> Result<u64, ShardError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let before = tables.likes.len();
        tables
            .likes
            .retain(|l| !(l.post_id == post_id && l.user_id == user_id));
        Ok((before - tables.likes.len()) as u64)
    }

    async fn posts_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, ShardError> {
        self.check_available()?;
        let tables = self.tables.read();
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>, ShardError> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables.posts.iter().find(|p| p.id == post_id).cloned())
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>, ShardError> {
        self.check_available()?;
        let tables = self.tables.read();
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn likes_for_post(&self, post_id: Uuid) -> Result<Vec<Like>, ShardError> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables
            .likes
            .iter()
            .filter(|l| l.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn recent_posts(&self, limit: i64) -> Result<Vec<Post>, ShardError> {
        self.check_available()?;
        let tables = self.tables.read();
        let mut posts = tables.posts.clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts.truncate(limit.max(0) as usize);
        Ok(posts)
    }

    async fn user_stats(&self, user_id: &str) -> Result<(i64, i64, i64), ShardError> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok((
            tables.posts.iter().filter(|p| p.user_id == user_id).count() as i64,
            tables.comments.iter().filter(|c| c.user_id == user_id).count() as i64,
            tables.likes.iter().filter(|l| l.user_id == user_id).count() as i64,
        ))
    }

    async fn ping(&self) -> Result<(), ShardError> {
        self.check_available()
    }
}
