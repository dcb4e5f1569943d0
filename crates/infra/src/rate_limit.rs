//! Shared rate-limit counters.

#[cfg(feature = "redis")]
pub use redis_store::RedisRateLimitStore;

#[cfg(feature = "redis")]
mod redis_store {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tracing::instrument;

    use pricewatch_notify::{RateLimitError, RateLimitStore};

    /// Counters as plain Redis keys: `INCR` plus `EXPIRE` in one pipeline.
    #[derive(Debug, Clone)]
    pub struct RedisRateLimitStore {
        client: Arc<redis::Client>,
    }

    impl RedisRateLimitStore {
        pub fn new(redis_url: impl AsRef<str>) -> Result<Self, RateLimitError> {
            let client = redis::Client::open(redis_url.as_ref()).map_err(backend)?;
            Ok(Self {
                client: Arc::new(client),
            })
        }

        async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, RateLimitError> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(backend)
        }
    }

    fn backend(err: redis::RedisError) -> RateLimitError {
        RateLimitError::Backend(err.to_string())
    }

    #[async_trait]
    impl RateLimitStore for RedisRateLimitStore {
        #[instrument(skip(self), err)]
        async fn get(&self, key: &str) -> Result<u32, RateLimitError> {
            let mut conn = self.connection().await?;
            let count: Option<u32> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            Ok(count.unwrap_or(0))
        }

        #[instrument(skip(self), err)]
        async fn increment(&self, key: &str, ttl: Duration) -> Result<u32, RateLimitError> {
            let mut conn = self.connection().await?;
            let (count, _): (u32, i64) = redis::pipe()
                .atomic()
                .cmd("INCR")
                .arg(key)
                .cmd("EXPIRE")
                .arg(key)
                .arg(ttl.as_secs())
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            Ok(count)
        }
    }
}
