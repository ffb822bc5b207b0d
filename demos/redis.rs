//! Redis-backed rate limiting shared across processes.
//!
//! Start Redis, then run this example in two terminals at once:
//! ```bash
//! docker run -p 6379:6379 redis:7-alpine
//! cargo run --example redis --features redis-store
//! ```
//!
//! Both processes count against the same sorted set, so together they admit
//! at most 5 signups per client per hour. Counters are timestamped with the
//! Redis server clock, so the processes need not agree on time.

use relay_throttle::{
    LimiterError, RateLimiterBuilder, RedisWindowStore, RedisWindowStoreConfig,
    StoreFailureMode, WindowPolicy,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RedisWindowStoreConfig {
        namespace: "relay_throttle_demo:".to_string(),
    };
    let store = RedisWindowStore::connect_with_config("redis://127.0.0.1:6379", config).await?;

    let limiter = RateLimiterBuilder::new()
        .with_policy("signup", WindowPolicy::from_spec(5, "1h")?)
        .with_policy(
            "search",
            WindowPolicy::from_spec(30, "1m")?.with_store_failure_mode(StoreFailureMode::FailOpen),
        )
        .with_store_timeout(Duration::from_millis(500))
        .build(store)?;

    info!("=== Signup Test (fail closed) ===");
    for attempt in 1..=7 {
        match limiter.check_and_record("signup", "203.0.113.7").await {
            Ok(decision) if decision.admitted => {
                info!(attempt, remaining = decision.remaining, "signup admitted");
            }
            Ok(decision) => {
                warn!(attempt, reset_at = decision.reset_at_epoch_secs, "signup rejected");
            }
            Err(LimiterError::StoreUnavailable { source, .. }) => {
                warn!(attempt, error = %source, "store down, signup refused");
            }
            Err(error) => return Err(error.into()),
        }
    }

    info!("=== Search Test (fail open) ===");
    for attempt in 1..=3 {
        let decision = limiter.check_and_record("search", "203.0.113.7").await?;
        info!(attempt, degraded = decision.degraded, "search admitted");
    }

    info!("Run again within the hour to see the shared counters");
    Ok(())
}
