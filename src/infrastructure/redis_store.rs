//! Redis-backed window store.
//!
//! Lets several server processes share one set of admission counters.
//!
//! ## Layout
//!
//! - Keys: `{prefix}:{category}:{client}` as built by the limiter
//! - Values: sorted set of admitted requests scored by Redis server time in
//!   milliseconds; members carry a random suffix so two requests in the same
//!   millisecond stay distinct
//! - TTL: refreshed to the window length on every check, so idle keys vanish
//!
//! ## Atomicity
//!
//! Purge, count, conditional insert and expiry run in one Lua script. Redis
//! executes scripts serially, so concurrent checks on a key from any number
//! of processes never admit more than the threshold. Timestamps come from
//! `TIME` on the server, not from the calling process.
//!
//! ## Example
//!
//! ```rust,ignore
//! use relay_throttle::{RateLimiterBuilder, RedisWindowStore, WindowPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisWindowStore::connect("redis://127.0.0.1/")
//!         .await
//!         .expect("Failed to connect to Redis");
//!
//!     let limiter = RateLimiterBuilder::new()
//!         .with_policy("signup", WindowPolicy::from_spec(5, "1h").unwrap())
//!         .build(store)
//!         .unwrap();
//! }
//! ```

use crate::application::ports::{StoreError, WindowStore};
use crate::domain::window::{window_millis, WindowOutcome};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const CHECK_AND_RECORD: &str = r#"
redis.replicate_commands()
local key = KEYS[1]
local window_ms = tonumber(ARGV[1])
local max_requests = tonumber(ARGV[2])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window_ms)
local count = redis.call('ZCARD', key)
local admitted = 0
if count < max_requests then
  redis.call('ZADD', key, now, now .. ':' .. ARGV[3])
  count = count + 1
  admitted = 1
end
if count > 0 then
  redis.call('PEXPIRE', key, window_ms)
end

local oldest = -1
local head = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if head[2] then
  oldest = tonumber(head[2])
end
return {admitted, count, oldest, now}
"#;

/// Configuration for the Redis store.
#[derive(Debug, Clone, Default)]
pub struct RedisWindowStoreConfig {
    /// Prepended to every key the limiter passes in (default: empty)
    pub namespace: String,
}

/// Shared sliding-log store on Redis.
#[derive(Clone)]
pub struct RedisWindowStore {
    connection: ConnectionManager,
    script: Arc<Script>,
    config: RedisWindowStoreConfig,
}

impl fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisWindowStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisWindowStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisWindowStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    /// * `config` - Store configuration
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisWindowStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!(namespace = %config.namespace, "connected to redis window store");

        Ok(Self {
            connection,
            script: Arc::new(Script::new(CHECK_AND_RECORD)),
            config,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.namespace, key)
    }

    /// Remove every counter for `key`.
    pub async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

impl WindowStore for RedisWindowStore {
    fn check_and_record(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
    ) -> impl Future<Output = Result<WindowOutcome, StoreError>> + Send {
        let key = self.key(key);
        let script = Arc::clone(&self.script);
        let mut conn = self.connection.clone();
        let member = format!("{:016x}", rand::random::<u64>());

        async move {
            let reply: Vec<i64> = script
                .key(&key)
                .arg(window_millis(window))
                .arg(max_requests)
                .arg(member)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| {
                    tracing::warn!(error = %e, key = %key, "redis window check failed");
                    store_error(e)
                })?;

            parse_reply(&reply)
        }
    }
}

fn store_error(error: RedisError) -> StoreError {
    if error.is_timeout() {
        StoreError::Unavailable(format!("redis timeout: {}", error))
    } else if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal()
    {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::Protocol(error.to_string())
    }
}

fn parse_reply(reply: &[i64]) -> Result<WindowOutcome, StoreError> {
    let [admitted, count, oldest, now] = reply else {
        return Err(StoreError::Protocol(format!(
            "expected 4 integers, got {}",
            reply.len()
        )));
    };

    let now_ms = u64::try_from(*now)
        .map_err(|_| StoreError::Protocol(format!("negative server time {}", now)))?;

    Ok(WindowOutcome {
        admitted: *admitted == 1,
        count: u32::try_from(*count).unwrap_or(u32::MAX),
        oldest_ms: u64::try_from(*oldest).ok(),
        now_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        let outcome = parse_reply(&[1, 3, 1_000, 2_000]).unwrap();
        assert!(outcome.admitted);
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.oldest_ms, Some(1_000));
        assert_eq!(outcome.now_ms, 2_000);

        let empty = parse_reply(&[0, 0, -1, 2_000]).unwrap();
        assert!(!empty.admitted);
        assert_eq!(empty.oldest_ms, None);
    }

    #[test]
    fn test_parse_reply_rejects_malformed() {
        assert!(matches!(
            parse_reply(&[1, 2]),
            Err(StoreError::Protocol(_))
        ));
        assert!(matches!(
            parse_reply(&[1, 1, 0, -5]),
            Err(StoreError::Protocol(_))
        ));
    }
}
