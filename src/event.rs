//! Wire events carried on the log.
//!
//! Events mirror the entity fields plus a `timestamp` authored by the
//! ingestion tier at synthesis time. Payloads are UTF-8 JSON; unknown
//! fields are tolerated on read and never emitted on write. The message
//! key is always the acting user's id (the same byte string the
//! [`Router`](crate::router::Router) hashes), so one actor's events share
//! a partition and arrive at the consumer in publication order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic carrying [`PostEvent`]s.
pub const TOPIC_POSTS: &str = "posts";
/// Topic carrying [`CommentEvent`]s.
pub const TOPIC_COMMENTS: &str = "comments";
/// Topic carrying [`LikeEvent`]s.
pub const TOPIC_LIKES: &str = "likes";

/// All topics the write applier subscribes to.
pub const ALL_TOPICS: [&str; 3] = [TOPIC_POSTS, TOPIC_COMMENTS, TOPIC_LIKES];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEvent {
    pub id: Uuid,
    pub user_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Whether a like event adds or removes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl std::fmt::Display for LikeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Like => write!(f, "like"),
            Self::Unlike => write!(f, "unlike"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeEvent {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: String,
    pub action: LikeAction,
    pub timestamp: DateTime<Utc>,
}

/// An event decoded from a topic's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Post(PostEvent),
    Comment(CommentEvent),
    Like(LikeEvent),
}

impl Event {
    /// Topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Post(_) => TOPIC_POSTS,
            Self::Comment(_) => TOPIC_COMMENTS,
            Self::Like(_) => TOPIC_LIKES,
        }
    }

    /// Routing key: the acting user's id for every event kind.
    ///
    /// Comments and likes deliberately key on the *actor*, not the post,
    /// so a user's own activity is co-located on one shard. The cost is a
    /// scatter-gather for "all comments on a post".
    #[must_use]
    pub fn routing_key(&self) -> &str {
        match self {
            Self::Post(e) => &e.user_id,
            Self::Comment(e) => &e.user_id,
            Self::Like(e) => &e.user_id,
        }
    }

    /// Serialize the event payload for publication.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Post(e) => serde_json::to_vec(e),
            Self::Comment(e) => serde_json::to_vec(e),
            Self::Like(e) => serde_json::to_vec(e),
        }
    }

    /// Decode a payload according to the topic it arrived on.
    ///
    /// The topic implies the event kind; a payload that does not parse as
    /// that kind (or an unknown topic) is a poison record the consumer
    /// skips.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        match topic {
            TOPIC_POSTS => Ok(Self::Post(serde_json::from_slice(payload)?)),
            TOPIC_COMMENTS => Ok(Self::Comment(serde_json::from_slice(payload)?)),
            TOPIC_LIKES => Ok(Self::Like(serde_json::from_slice(payload)?)),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }
}

/// Why a payload could not be decoded into an event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like_event(action: LikeAction) -> LikeEvent {
        LikeEvent {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            user_id: "bob".into(),
            action,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_like_action_wire_format() {
        let event = like_event(LikeAction::Unlike);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "unlike");
    }

    #[test]
    fn test_decode_by_topic() {
        let event = Event::Like(like_event(LikeAction::Like));
        let payload = event.to_payload().unwrap();
        let decoded = Event::decode(TOPIC_LIKES, &payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_unknown_topic() {
        let err = Event::decode("retweets", b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTopic(_)));
    }

    #[test]
    fn test_decode_malformed_payload() {
        let err = Event::decode(TOPIC_POSTS, b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "user_id": "alice",
            "content": "hi",
            "timestamp": Utc::now(),
            "shadow_banned": true,
        });
        let payload = serde_json::to_vec(&json).unwrap();
        let decoded = Event::decode(TOPIC_POSTS, &payload).unwrap();
        assert!(matches!(decoded, Event::Post(_)));
    }

    #[test]
    fn test_routing_key_is_actor_for_all_kinds() {
        let comment = Event::Comment(CommentEvent {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            user_id: "carol".into(),
            content: "nice".into(),
            timestamp: Utc::now(),
        });
        assert_eq!(comment.routing_key(), "carol");

        let like = Event::Like(like_event(LikeAction::Like));
        assert_eq!(like.routing_key(), "bob");
    }
}
