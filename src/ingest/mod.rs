// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ingestion: validate a write request, synthesize an event, publish it.
//!
//! This tier is stateless. It owns event synthesis (fresh ids and the
//! event-occurrence timestamp are assigned here, never by the consumer)
//! and it does not deduplicate: a client retry after a timeout produces
//! a second event with a distinct id, and the consumer's idempotent
//! statements absorb it.

pub mod http;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::event::{CommentEvent, Event, LikeAction, LikeEvent, PostEvent};
use crate::log::{EventSink, LogError};
use crate::metrics;

/// Content bounds, in Unicode code points.
const CONTENT_MIN: usize = 1;
const CONTENT_MAX: usize = 280;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Request failed validation; surfaced as 400, never published.
    #[error("{0}")]
    Validation(String),
    /// The log rejected the event after retries; surfaced as 500. No
    /// partial state exists and the client may retry.
    #[error("publish failed: {0}")]
    Publish(#[from] LogError),
}

pub struct IngestService {
    sink: Arc<dyn EventSink>,
}

impl IngestService {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Validate and publish a `PostCreated` event. Returns the assigned
    /// post id.
    #[tracing::instrument(skip(self, content))]
    pub async fn create_post(&self, user_id: &str, content: &str) -> Result<Uuid, IngestError> {
        require_non_empty("user_id", user_id)?;
        validate_content(content)?;

        let event = Event::Post(PostEvent {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        self.publish(&event).await
    }

    /// Validate and publish a `CommentCreated` event. Returns the
    /// assigned comment id.
    #[tracing::instrument(skip(self, content))]
    pub async fn create_comment(
        &self,
        post_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<Uuid, IngestError> {
        let post_id = require_id("post_id", post_id)?;
        require_non_empty("user_id", user_id)?;
        validate_content(content)?;

        let event = Event::Comment(CommentEvent {
            id: Uuid::new_v4(),
            post_id,
            user_id: user_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        self.publish(&event).await
    }

    /// Validate and publish a like or unlike event. Returns the assigned
    /// like id (discarded by the consumer when the pair already exists).
    #[tracing::instrument(skip(self))]
    pub async fn like(
        &self,
        post_id: &str,
        user_id: &str,
        action: &str,
    ) -> Result<Uuid, IngestError> {
        let post_id = require_id("post_id", post_id)?;
        require_non_empty("user_id", user_id)?;
        let action = match action {
            "like" => LikeAction::Like,
            "unlike" => LikeAction::Unlike,
            _ => {
                return Err(IngestError::Validation(
                    "action must be 'like' or 'unlike'".into(),
                ))
            }
        };

        let event = Event::Like(LikeEvent {
            id: Uuid::new_v4(),
            post_id,
            user_id: user_id.to_string(),
            action,
            timestamp: Utc::now(),
        });
        self.publish(&event).await
    }

    /// Publish an event keyed by its routing key and return its id.
    async fn publish(&self, event: &Event) -> Result<Uuid, IngestError> {
        let topic = event.topic();
        let payload = event
            .to_payload()
            .map_err(|e| LogError::Publish(e.to_string()))?;

        match self.sink.publish(topic, event.routing_key(), &payload).await {
            Ok(()) => {
                metrics::record_event_published(topic, "success");
                let id = event_id(event);
                info!(topic, key = event.routing_key(), %id, "Event published");
                Ok(id)
            }
            Err(e) => {
                metrics::record_event_published(topic, "error");
                error!(topic, key = event.routing_key(), error = %e, "Publish failed");
                Err(e.into())
            }
        }
    }
}

fn event_id(event: &Event) -> Uuid {
    match event {
        Event::Post(e) => e.id,
        Event::Comment(e) => e.id,
        Event::Like(e) => e.id,
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), IngestError> {
    if value.is_empty() {
        Err(IngestError::Validation(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn require_id(field: &str, value: &str) -> Result<Uuid, IngestError> {
    require_non_empty(field, value)?;
    value
        .parse()
        .map_err(|_| IngestError::Validation(format!("{} must be a valid id", field)))
}

/// Content must be 1..=280 Unicode code points.
fn validate_content(content: &str) -> Result<(), IngestError> {
    let length = content.chars().count();
    if (CONTENT_MIN..=CONTENT_MAX).contains(&length) {
        Ok(())
    } else {
        Err(IngestError::Validation(format!(
            "content must be between {} and {} characters",
            CONTENT_MIN, CONTENT_MAX
        )))
    }
}
