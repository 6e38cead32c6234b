//! Aletheia Answer Feed Server Library
//!
//! Serves the outbox as a live feed: trust-annotated listing, artifact
//! views and downloads, and a server-sent change stream.

pub mod config;
pub mod feed_api;
pub mod health;
pub mod live_events;
pub mod render;
pub mod verify_pool;

pub use config::{expand_home, FeedConfig, ServerArgs};
pub use feed_api::{feed_router, ApiError, AppState, FeedResponse, SharedState, MAX_FEED_LIMIT};
pub use health::{check_health, HealthResponse};
pub use live_events::{spawn_change_feed, ChangeDetector, OutboxWatcher};
pub use verify_pool::VerifyPool;
