//! Basic example: an in-process rate limiter in front of a fan-out hub.
//!
//! A client may post 3 messages per minute. Admitted messages are delivered
//! to every connection of the recipient; the fourth is rejected with the
//! headers an HTTP layer would return alongside a 429.

use relay_throttle::{
    EventKind, FanOutHub, Frame, MemoryWindowStore, MpscChannel, OutboundEvent,
    RateLimiterBuilder, SystemClock, UserId, WindowPolicy,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clock = Arc::new(SystemClock::new());
    let limiter = RateLimiterBuilder::new()
        .with_policy("messages", WindowPolicy::from_spec(3, "1m")?)
        .build(MemoryWindowStore::new(clock))?;

    let hub: FanOutHub<MpscChannel> = FanOutHub::new();
    let bob = UserId::from("bob");
    let (laptop, mut laptop_rx) = MpscChannel::new();
    let (phone, mut phone_rx) = MpscChannel::new();
    hub.on_connect(bob.clone(), laptop);
    hub.on_connect(bob.clone(), phone);

    println!("=== Basic Example ===\n");
    println!("Policy: 3 messages per minute per sender\n");

    for n in 1..=4 {
        let decision = limiter.check_and_record("messages", "alice").await?;
        if !decision.admitted {
            println!("message {n}: rejected");
            for (name, value) in decision.rate_limit_headers() {
                println!("  {name}: {value}");
            }
            continue;
        }

        let event = OutboundEvent::new(
            EventKind::NEW_MESSAGE,
            json!({ "senderId": "alice", "content": format!("hello #{n}") }),
        );
        let delivered = hub.send_to_user(&bob, event);
        println!(
            "message {n}: admitted, {} left, delivered to {delivered} connections",
            decision.remaining
        );
    }

    hub.shutdown();
    for (device, rx) in [("laptop", &mut laptop_rx), ("phone", &mut phone_rx)] {
        while let Ok(frame) = rx.try_recv() {
            if let Frame::Event(_) = frame {
                if let Some(text) = frame.into_text() {
                    info!(device, %text, "frame received");
                }
            }
        }
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
