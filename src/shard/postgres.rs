// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Postgres shard backend.
//!
//! One bounded connection pool per shard. The write statements carry
//! their idempotence in SQL:
//!
//! ```sql
//! INSERT ... ON CONFLICT (id) DO NOTHING            -- posts, comments
//! INSERT ... ON CONFLICT (post_id, user_id) DO NOTHING  -- likes
//! DELETE FROM likes WHERE post_id = $1 AND user_id = $2 -- unlike
//! ```
//!
//! Rows are created with `created_at = updated_at = event.timestamp`;
//! nothing in the current API mutates a row afterwards, so the
//! `updated_at >= created_at` invariant holds by construction and is
//! checked in the schema anyway.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{ShardError, ShardStore};
use crate::event::{CommentEvent, LikeEvent, PostEvent};
use crate::model::{Comment, Like, Post};
use crate::registry::ShardDescriptor;
use crate::resilience::retry::{retry, RetryConfig};

pub struct PgShardStore {
    shard_id: u32,
    pool: PgPool,
}

impl PgShardStore {
    /// Connect to one shard and ensure its schema exists.
    ///
    /// Connection uses the startup retry preset and pings before
    /// returning, so a dead shard fails process init rather than the
    /// first request.
    pub async fn connect(
        descriptor: &ShardDescriptor,
        max_connections: u32,
    ) -> Result<Self, ShardError> {
        let url = descriptor.connection_url();
        let shard_id = descriptor.shard_id as u32;

        let pool = retry("shard_connect", &RetryConfig::startup(), || async {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .min_connections(max_connections.min(5))
                .max_lifetime(Duration::from_secs(3600))
                .acquire_timeout(Duration::from_secs(10))
                .connect(&url)
                .await
                .map_err(ShardError::from_sqlx)
        })
        .await?;

        let store = Self { shard_id, pool };
        store.init_schema().await?;
        info!(shard_id, host = %descriptor.host, port = descriptor.port, "Connected to shard");
        Ok(store)
    }

    /// Shard id this store writes to (used for metric labels).
    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    async fn init_schema(&self) -> Result<(), ShardError> {
        // The content bound is validated at ingestion; the shard keeps
        // the same check defensively.
        const DDL: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL CHECK (char_length(content) BETWEEN 1 AND 280),
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CHECK (updated_at >= created_at)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_user_created
                ON posts (user_id, created_at DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id UUID PRIMARY KEY,
                post_id UUID NOT NULL,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL CHECK (char_length(content) BETWEEN 1 AND 280),
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CHECK (updated_at >= created_at)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_comments_post_created
                ON comments (post_id, created_at DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS likes (
                id UUID PRIMARY KEY,
                post_id UUID NOT NULL,
                user_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (post_id, user_id)
            )
            "#,
        ];

        for statement in DDL {
            retry("shard_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(ShardError::from_sqlx)
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ShardStore for PgShardStore {
    // Write statements are not retried here: a failed apply leaves the
    // offset uncommitted and redelivery is the retry path.

    async fn insert_post(&self, event: &PostEvent) -> Result<(), ShardError> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(&event.user_id)
        .bind(&event.content)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(ShardError::from_sqlx)?;

        debug!(shard_id = self.shard_id, post_id = %event.id, inserted = result.rows_affected(), "Applied post");
        Ok(())
    }

    async fn insert_comment(&self, event: &CommentEvent) -> Result<(), ShardError> {
        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, user_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(event.post_id)
        .bind(&event.user_id)
        .bind(&event.content)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(ShardError::from_sqlx)?;

        debug!(shard_id = self.shard_id, comment_id = %event.id, inserted = result.rows_affected(), "Applied comment");
        Ok(())
    }

    async fn insert_like(&self, event: &LikeEvent) -> Result<(), ShardError> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (id, post_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (post_id, user_id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(event.post_id)
        .bind(&event.user_id)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(ShardError::from_sqlx)?;

        debug!(shard_id = self.shard_id, like_id = %event.id, inserted = result.rows_affected(), "Applied like");
        Ok(())
    }

    async fn delete_like(&self, post_id: Uuid, user_id: &str) -> Result<u64, ShardError> {
        let result = sqlx::query("DELETE FROM likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(ShardError::from_sqlx)?;

        debug!(shard_id = self.shard_id, %post_id, user_id, rows_affected = result.rows_affected(), "Applied unlike");
        Ok(result.rows_affected())
    }

    async fn posts_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, ShardError> {
        let user_id = user_id.to_string();

        retry("posts_by_user", &RetryConfig::query(), || async {
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, user_id, content, created_at, updated_at
                FROM posts
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(&user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(ShardError::from_sqlx)
        })
        .await
    }

    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>, ShardError> {
        retry("find_post", &RetryConfig::query(), || async {
            sqlx::query_as::<_, Post>(
                "SELECT id, user_id, content, created_at, updated_at FROM posts WHERE id = $1",
            )
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShardError::from_sqlx)
        })
        .await
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>, ShardError> {
        retry("comments_for_post", &RetryConfig::query(), || async {
            sqlx::query_as::<_, Comment>(
                r#"
                SELECT id, post_id, user_id, content, created_at, updated_at
                FROM comments
                WHERE post_id = $1
                ORDER BY created_at ASC
                "#,
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ShardError::from_sqlx)
        })
        .await
    }

    async fn likes_for_post(&self, post_id: Uuid) -> Result<Vec<Like>, ShardError> {
        retry("likes_for_post", &RetryConfig::query(), || async {
            sqlx::query_as::<_, Like>(
                "SELECT id, post_id, user_id, created_at FROM likes WHERE post_id = $1",
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ShardError::from_sqlx)
        })
        .await
    }

    async fn recent_posts(&self, limit: i64) -> Result<Vec<Post>, ShardError> {
        retry("recent_posts", &RetryConfig::query(), || async {
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, user_id, content, created_at, updated_at
                FROM posts
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ShardError::from_sqlx)
        })
        .await
    }

    async fn user_stats(&self, user_id: &str) -> Result<(i64, i64, i64), ShardError> {
        let user_id = user_id.to_string();

        retry("user_stats", &RetryConfig::query(), || async {
            let posts: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE user_id = $1")
                .bind(&user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ShardError::from_sqlx)?;
            let comments: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM comments WHERE user_id = $1")
                    .bind(&user_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(ShardError::from_sqlx)?;
            let likes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM likes WHERE user_id = $1")
                .bind(&user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ShardError::from_sqlx)?;
            Ok((posts.0, comments.0, likes.0))
        })
        .await
    }

    async fn ping(&self) -> Result<(), ShardError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(ShardError::from_sqlx)?;
        Ok(())
    }
}
