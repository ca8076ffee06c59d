//! # Shardline
//!
//! An event-sourced, horizontally-sharded social-activity store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Ingestion Tier                          │
//! │  • Validates writes (posts, comments, likes)                │
//! │  • Synthesizes events: fresh id + timestamp                 │
//! │  • Publishes to the log, keyed by the actor's user_id       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               (partitioned log: posts/comments/likes)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Consumer Tier (db-writer-group)             │
//! │  • Routes each event: shard = fnv1a(user_id) % N            │
//! │  • Applies with idempotent statements                       │
//! │  • Commits offsets only after a successful apply            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                      (N Postgres shards)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Query Tier                            │
//! │  • User-keyed reads: single owning shard                    │
//! │  • Post-keyed reads: scatter to all shards, merge           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Correctness in one paragraph
//!
//! Every event's routing key is the acting user's id, so the log
//! partition and the owning shard are derived from the same bytes: one
//! actor's events arrive in publication order at one shard. Every apply
//! statement is a no-op on replay, so the log's at-least-once delivery
//! produces exactly-once effect. The scatter-gather reads and the
//! partial-failure handling are arranged around those two facts.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shardline::{Config, IngestService, KafkaEventSink};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env();
//!     let sink = KafkaEventSink::connect(&config.kafka_bootstrap_servers)
//!         .expect("producer config");
//!     let ingest = Arc::new(IngestService::new(Arc::new(sink)));
//!
//!     let app = shardline::ingest::http::router(ingest);
//!     let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.ingestion_port))
//!         .await
//!         .expect("bind");
//!     axum::serve(listener, app).await.expect("serve");
//! }
//! ```
//!
//! ## Modules
//!
//! - [`router`]: the FNV-1a routing rule shared by every tier
//! - [`registry`]: shard registry bootstrap
//! - [`shard`]: shard storage traits, Postgres backend, fleet pool
//! - [`log`]: event sink trait, Kafka client, in-memory log
//! - [`ingest`]: validation, event synthesis, publication
//! - [`consumer`]: the idempotent write applier and its group loop
//! - [`query`]: single-shard and scatter-gather read planning

pub mod config;
pub mod consumer;
pub mod event;
pub mod ingest;
pub mod log;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod resilience;
pub mod response;
pub mod router;
pub mod query;
pub mod shard;

pub use config::Config;
pub use consumer::{Applier, ApplierState, ApplyOutcome, ConsumerStatus, KafkaApplier};
pub use event::{CommentEvent, Event, LikeAction, LikeEvent, PostEvent};
pub use ingest::{IngestError, IngestService};
pub use log::{EventSink, KafkaEventSink, LogError, MemoryLog};
pub use model::{Comment, Like, Post, PostDetail, UserStats};
pub use query::QueryPlanner;
pub use registry::{ShardDescriptor, ShardRegistry};
pub use response::ApiResponse;
pub use router::Router;
pub use shard::{InMemoryShard, PgShardStore, ShardError, ShardSet, ShardStore};
