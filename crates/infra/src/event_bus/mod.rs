//! Infrastructure event bus implementations.
//!
//! The event bus abstraction lives in `pricewatch-events` as pure mechanics.
//! This module provides infrastructure-backed implementations (Redis).

/// Stream every pipeline event is appended to; its dead-letter stream is
/// `<key>:dlq`.
pub const DEFAULT_STREAM_KEY: &str = "pricewatch:events";

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsEventBus};
