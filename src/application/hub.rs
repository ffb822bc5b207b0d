//! Realtime fan-out hub.
//!
//! The hub owns the registry of live connections, keyed by user. Business
//! logic hands it events after committing its own state and the hub writes
//! them to the right channels.
//!
//! ## Guarantees
//!
//! - Registry mutation for one user is serialised by the user's map entry,
//!   so concurrent connects and disconnects never lose an update.
//! - Deliveries run under the same entry's read lock and only to `Open`
//!   connections. Once `on_disconnect` returns, no in-flight `send_to_user`
//!   can still reach that connection.
//! - Each event is written at most once per connection. A failed write
//!   closes that connection and the fan-out continues with the rest.
//! - A user with no connections has no registry entry.
//!
//! The registry is process-local. Deployments with several server processes
//! need a cluster-aware delivery layer in front of it.

use crate::application::bus::{EventBus, Subscription};
use crate::application::metrics::HubMetrics;
use crate::application::ports::{Channel, ChannelError, Clock};
use crate::domain::connection::{ConnectionId, ConnectionState, StateCell, UserId};
use crate::domain::event::{EventKind, InboundMessage, OutboundEvent};
use crate::infrastructure::clock::SystemClock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// How often every connection is pinged
    pub heartbeat_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The network layer reported the channel closed
    Closed,
    /// A write to the channel failed
    DeliveryFailed,
    /// No pong arrived before the next heartbeat
    HeartbeatTimeout,
    /// The hub was shut down
    Shutdown,
}

/// Outcome of one heartbeat pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Connections that were sent a ping
    pub pinged: usize,
    /// Connections removed because they never answered the previous ping
    pub timed_out: usize,
    /// Connections removed because the ping could not be written
    pub failed: usize,
}

struct Connection<C> {
    id: ConnectionId,
    channel: C,
    state: StateCell,
    alive: AtomicBool,
    last_heartbeat_ms: AtomicU64,
}

struct HubInner<C> {
    users: DashMap<UserId, Vec<Arc<Connection<C>>>, ahash::RandomState>,
    owners: DashMap<ConnectionId, UserId, ahash::RandomState>,
    bus: EventBus,
    metrics: HubMetrics,
    clock: Arc<dyn Clock>,
    config: HubConfig,
}

/// Registry of live connections with targeted and broadcast delivery.
///
/// Cloning is cheap and every clone addresses the same registry. Create one
/// per process and inject it where it is needed.
pub struct FanOutHub<C: Channel> {
    inner: Arc<HubInner<C>>,
}

impl<C: Channel> Clone for FanOutHub<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel> fmt::Debug for FanOutHub<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutHub")
            .field("users", &self.inner.users.len())
            .field("connections", &self.inner.owners.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<C: Channel> Default for FanOutHub<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Channel> FanOutHub<C> {
    /// Create a hub with the default configuration (30 s heartbeat).
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub that stamps heartbeats with the system clock.
    pub fn with_config(config: HubConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a hub that stamps heartbeats with `clock`.
    pub fn with_clock(config: HubConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                users: DashMap::with_hasher(ahash::RandomState::new()),
                owners: DashMap::with_hasher(ahash::RandomState::new()),
                bus: EventBus::new(),
                metrics: HubMetrics::new(),
                clock,
                config,
            }),
        }
    }

    /// Register a channel for an authenticated user.
    ///
    /// The connection is `Open` and addressable when this returns.
    pub fn on_connect(&self, user: UserId, channel: C) -> ConnectionId {
        let id = ConnectionId::next();
        let connection = Arc::new(Connection {
            id,
            channel,
            state: StateCell::new(),
            alive: AtomicBool::new(true),
            last_heartbeat_ms: AtomicU64::new(self.inner.clock.now_millis()),
        });

        {
            // Held across both inserts so a removal sees the connection in
            // both maps or in neither.
            let mut set = self.inner.users.entry(user.clone()).or_default();
            connection.state.open();
            set.push(connection);
            self.inner.owners.insert(id, user.clone());
        }

        self.inner.metrics.record_connect();
        tracing::info!(user_id = %user, connection_id = %id, "realtime connection opened");
        id
    }

    /// Remove a connection after its channel closed.
    ///
    /// Returns `true` if this call removed it; repeated or unknown ids are a
    /// no-op.
    pub fn on_disconnect(&self, id: ConnectionId) -> bool {
        self.remove(id, DisconnectReason::Closed)
    }

    /// Deliver `event` to every open connection of `user`.
    ///
    /// Returns the number of channels written. A user without connections
    /// is not an error.
    pub fn send_to_user(&self, user: &UserId, event: OutboundEvent) -> usize {
        let event = Arc::new(event);
        let mut failed = Vec::new();

        let delivered = match self.inner.users.get(user) {
            Some(set) => deliver(set.value(), &event, &mut failed),
            None => 0,
        };

        self.finish_delivery(&event, delivered, failed);
        delivered
    }

    /// Deliver `event` to every open connection of every user.
    pub fn broadcast(&self, event: OutboundEvent) -> usize {
        let event = Arc::new(event);
        let mut failed = Vec::new();

        let delivered = self
            .inner
            .users
            .iter()
            .map(|entry| deliver(entry.value(), &event, &mut failed))
            .sum::<usize>();

        self.finish_delivery(&event, delivered, failed);
        delivered
    }

    fn finish_delivery(
        &self,
        event: &OutboundEvent,
        delivered: usize,
        failed: Vec<(ConnectionId, ChannelError)>,
    ) {
        self.inner.metrics.record_deliveries(delivered);
        tracing::debug!(kind = %event.kind, delivered, failed = failed.len(), "event fanned out");

        for (id, error) in failed {
            tracing::warn!(connection_id = %id, error = %error, "realtime write failed, closing connection");
            self.inner.metrics.record_delivery_failure();
            self.remove(id, DisconnectReason::DeliveryFailed);
        }
    }

    /// Register an in-process handler for events of `kind`.
    ///
    /// Handlers run synchronously inside `publish_local`.
    pub fn subscribe<F>(&self, kind: impl Into<EventKind>, handler: F) -> Subscription
    where
        F: Fn(&OutboundEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, handler)
    }

    /// Hand `event` to local subscribers. Returns the number of handlers run.
    pub fn publish_local(&self, event: &OutboundEvent) -> usize {
        self.inner.bus.publish(event)
    }

    /// Local event bus shared by this hub.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Record a pong from the peer of `id`.
    pub fn on_pong(&self, id: ConnectionId) {
        let Some(user) = self.owner(id) else {
            return;
        };
        if let Some(set) = self.inner.users.get(&user) {
            if let Some(conn) = set.iter().find(|c| c.id == id) {
                conn.alive.store(true, Ordering::Release);
                conn.last_heartbeat_ms
                    .store(self.inner.clock.now_millis(), Ordering::Release);
            }
        }
    }

    /// Ping every open connection once.
    ///
    /// A connection that has not answered the previous ping is closed and
    /// removed, so a dead peer occupies the registry for at most two
    /// heartbeat intervals.
    pub fn heartbeat_tick(&self) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        let mut expired = Vec::new();
        let mut unreachable = Vec::new();

        for entry in self.inner.users.iter() {
            for conn in entry.value() {
                if conn.state.get() != ConnectionState::Open {
                    continue;
                }
                if !conn.alive.swap(false, Ordering::AcqRel) {
                    expired.push(conn.id);
                    continue;
                }
                match conn.channel.ping() {
                    Ok(()) => report.pinged += 1,
                    Err(_) => unreachable.push(conn.id),
                }
            }
        }

        for id in expired {
            if self.remove(id, DisconnectReason::HeartbeatTimeout) {
                self.inner.metrics.record_heartbeat_timeout();
                report.timed_out += 1;
            }
        }
        for id in unreachable {
            if self.remove(id, DisconnectReason::DeliveryFailed) {
                report.failed += 1;
            }
        }
        report
    }

    /// Spawn a task that runs `heartbeat_tick` on the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_heartbeat(&self) -> HeartbeatHandle {
        let hub = self.clone();
        // tokio intervals panic on a zero period.
        let period = self
            .inner
            .config
            .heartbeat_interval
            .max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = hub.heartbeat_tick();
                        if report.timed_out + report.failed > 0 {
                            tracing::debug!(
                                pinged = report.pinged,
                                timed_out = report.timed_out,
                                failed = report.failed,
                                "heartbeat pruned connections"
                            );
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        HeartbeatHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Interpret a text frame received from connection `id`.
    ///
    /// Typing frames are relayed to the recipient. Read frames are published
    /// locally as read receipts, and submitted messages as
    /// `EventKind::MESSAGE_SUBMITTED` for the persistence layer. Anything
    /// else is ignored.
    pub fn handle_inbound(&self, id: ConnectionId, text: &str) {
        let Some(sender) = self.owner(id) else {
            tracing::debug!(connection_id = %id, "frame from unregistered connection ignored");
            return;
        };

        match InboundMessage::parse(text) {
            Ok(InboundMessage::Typing {
                recipient_id,
                conversation_id,
            }) => {
                let event = OutboundEvent::new(
                    EventKind::TYPING_INDICATOR,
                    json!({ "senderId": sender.as_str(), "conversationId": conversation_id }),
                );
                self.send_to_user(&UserId::from(recipient_id), event);
            }
            Ok(InboundMessage::Read { conversation_id }) => {
                let event = OutboundEvent::new(
                    EventKind::READ_RECEIPT,
                    json!({ "readerId": sender.as_str(), "conversationId": conversation_id }),
                );
                self.publish_local(&event);
            }
            Ok(InboundMessage::SendMessage {
                recipient_id,
                conversation_id,
                content,
            }) => {
                let event = OutboundEvent::new(
                    EventKind::MESSAGE_SUBMITTED,
                    json!({
                        "senderId": sender.as_str(),
                        "recipientId": recipient_id,
                        "conversationId": conversation_id,
                        "content": content,
                    }),
                );
                self.publish_local(&event);
            }
            Err(error) => {
                tracing::debug!(connection_id = %id, error = %error, "malformed frame ignored");
            }
        }
    }

    /// Close and remove every connection.
    pub fn shutdown(&self) {
        let ids: Vec<ConnectionId> = self.inner.owners.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.remove(id, DisconnectReason::Shutdown);
        }
    }

    /// Open connections held by `user`.
    pub fn connection_count(&self, user: &UserId) -> usize {
        self.inner.users.get(user).map_or(0, |set| set.len())
    }

    /// Connection ids held by `user`.
    pub fn connections(&self, user: &UserId) -> Vec<ConnectionId> {
        self.inner
            .users
            .get(user)
            .map(|set| set.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }

    /// Whether `user` has at least one registered connection.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.inner.users.contains_key(user)
    }

    /// Users with at least one connection.
    pub fn user_count(&self) -> usize {
        self.inner.users.len()
    }

    /// Registered connections across all users.
    pub fn total_connections(&self) -> usize {
        self.inner.owners.len()
    }

    /// Owner of a registered connection.
    pub fn owner(&self, id: ConnectionId) -> Option<UserId> {
        self.inner.owners.get(&id).map(|e| e.value().clone())
    }

    /// Epoch milliseconds of the last pong (or the connect time).
    pub fn last_heartbeat(&self, id: ConnectionId) -> Option<u64> {
        let user = self.owner(id)?;
        let set = self.inner.users.get(&user)?;
        set.iter()
            .find(|c| c.id == id)
            .map(|c| c.last_heartbeat_ms.load(Ordering::Acquire))
    }

    /// Connection and delivery counters shared by every clone of this hub.
    pub fn metrics(&self) -> &HubMetrics {
        &self.inner.metrics
    }

    /// Configuration the hub was created with.
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Single removal path. The `owners` entry decides which caller wins.
    fn remove(&self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let Some((_, user)) = self.inner.owners.remove(&id) else {
            return false;
        };

        if let Entry::Occupied(mut entry) = self.inner.users.entry(user.clone()) {
            let set = entry.get_mut();
            if let Some(pos) = set.iter().position(|c| c.id == id) {
                let conn = set.swap_remove(pos);
                conn.state.begin_close();
                conn.channel.close();
                conn.state.finish_close();
            }
            if set.is_empty() {
                entry.remove();
            }
        }

        self.inner.metrics.record_disconnect();
        tracing::info!(user_id = %user, connection_id = %id, reason = ?reason, "realtime connection closed");
        true
    }
}

/// Write `event` to each open connection in `set`, collecting failures.
fn deliver<C: Channel>(
    set: &[Arc<Connection<C>>],
    event: &Arc<OutboundEvent>,
    failed: &mut Vec<(ConnectionId, ChannelError)>,
) -> usize {
    let mut delivered = 0;
    for conn in set {
        if conn.state.get() != ConnectionState::Open {
            continue;
        }
        match conn.channel.send(event) {
            Ok(()) => delivered += 1,
            Err(error) => {
                // No further writes until the removal below completes.
                conn.state.begin_close();
                failed.push((conn.id, error));
            }
        }
    }
    delivered
}

/// Handle to the heartbeat task.
#[derive(Debug)]
pub struct HeartbeatHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Stop the heartbeat and wait for the task to finish.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.task).await
    }

    /// Whether the heartbeat task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{MockChannel, MockClock};

    fn hub() -> FanOutHub<MockChannel> {
        FanOutHub::new()
    }

    fn event(n: u32) -> OutboundEvent {
        OutboundEvent::new(EventKind::NEW_MESSAGE, json!({ "n": n }))
    }

    #[test]
    fn test_connect_and_disconnect_leave_no_residue() {
        let hub = hub();
        let user = UserId::from("u1");
        let a = hub.on_connect(user.clone(), MockChannel::new());
        let b = hub.on_connect(user.clone(), MockChannel::new());
        assert_eq!(hub.connection_count(&user), 2);

        assert!(hub.on_disconnect(a));
        assert_eq!(hub.connection_count(&user), 1);
        assert!(hub.on_disconnect(b));
        assert!(!hub.is_online(&user));
        assert_eq!(hub.user_count(), 0);
        assert_eq!(hub.total_connections(), 0);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let hub = hub();
        let channel = MockChannel::new();
        let id = hub.on_connect(UserId::from("u1"), channel.clone());

        assert!(hub.on_disconnect(id));
        assert!(!hub.on_disconnect(id));
        assert_eq!(channel.close_count(), 1);
        assert_eq!(hub.metrics().disconnects(), 1);
    }

    #[test]
    fn test_send_preserves_order_per_connection() {
        let hub = hub();
        let channel = MockChannel::new();
        let user = UserId::from("u1");
        hub.on_connect(user.clone(), channel.clone());

        for n in 0..5 {
            hub.send_to_user(&user, event(n));
        }
        let seen: Vec<u64> = channel
            .sent()
            .iter()
            .map(|e| e.data["n"].as_u64().unwrap())
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_failed_write_closes_only_that_connection() {
        let hub = hub();
        let user = UserId::from("u1");
        let healthy = MockChannel::new();
        let broken = MockChannel::new();
        broken.fail_sends(ChannelError::Full);

        hub.on_connect(user.clone(), healthy.clone());
        let broken_id = hub.on_connect(user.clone(), broken.clone());

        assert_eq!(hub.send_to_user(&user, event(1)), 1);
        assert_eq!(healthy.sent().len(), 1);
        assert_eq!(broken.close_count(), 1);
        assert!(hub.owner(broken_id).is_none());
        assert_eq!(hub.connection_count(&user), 1);
        assert_eq!(hub.metrics().delivery_failures(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_user() {
        let hub = hub();
        let channels: Vec<MockChannel> = (0..4).map(|_| MockChannel::new()).collect();
        for (i, channel) in channels.iter().enumerate() {
            hub.on_connect(UserId::new(format!("u{}", i % 2)), channel.clone());
        }

        assert_eq!(hub.broadcast(event(7)), 4);
        assert!(channels.iter().all(|c| c.sent().len() == 1));
    }

    #[test]
    fn test_heartbeat_prunes_silent_connections() {
        let hub = hub();
        let user = UserId::from("u1");
        let responsive = MockChannel::new();
        let silent = MockChannel::new();
        let responsive_id = hub.on_connect(user.clone(), responsive.clone());
        let silent_id = hub.on_connect(user.clone(), silent.clone());

        let first = hub.heartbeat_tick();
        assert_eq!(first.pinged, 2);
        assert_eq!(responsive.ping_count(), 1);

        hub.on_pong(responsive_id);
        let second = hub.heartbeat_tick();
        assert_eq!(second.timed_out, 1);
        assert_eq!(second.pinged, 1);
        assert!(hub.owner(silent_id).is_none());
        assert_eq!(silent.close_count(), 1);

        assert_eq!(hub.send_to_user(&user, event(1)), 1);
        assert!(silent.sent().is_empty());
        assert_eq!(hub.metrics().heartbeat_timeouts(), 1);
    }

    #[test]
    fn test_failed_ping_removes_connection() {
        let hub = hub();
        let channel = MockChannel::new();
        channel.fail_pings(ChannelError::Closed);
        hub.on_connect(UserId::from("u1"), channel.clone());

        let report = hub.heartbeat_tick();
        assert_eq!(report.failed, 1);
        assert_eq!(hub.total_connections(), 0);
    }

    #[test]
    fn test_pong_updates_last_heartbeat() {
        let clock = MockClock::new(1_000);
        let hub: FanOutHub<MockChannel> =
            FanOutHub::with_clock(HubConfig::default(), Arc::new(clock.clone()));
        let id = hub.on_connect(UserId::from("u1"), MockChannel::new());
        assert_eq!(hub.last_heartbeat(id), Some(1_000));

        clock.advance(Duration::from_secs(30));
        hub.on_pong(id);
        assert_eq!(hub.last_heartbeat(id), Some(31_000));
    }

    #[test]
    fn test_typing_frame_is_relayed() {
        let hub = hub();
        let sender = hub.on_connect(UserId::from("alice"), MockChannel::new());
        let recipient = MockChannel::new();
        hub.on_connect(UserId::from("bob"), recipient.clone());

        hub.handle_inbound(
            sender,
            r#"{"type":"typing","recipientId":"bob","conversationId":"c1"}"#,
        );

        let sent = recipient.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, EventKind::TYPING_INDICATOR);
        assert_eq!(sent[0].data["senderId"], "alice");
        assert_eq!(sent[0].data["conversationId"], "c1");
    }

    #[test]
    fn test_read_frame_is_published_locally() {
        let hub = hub();
        let receipts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&receipts);
        let _sub = hub.subscribe(EventKind::READ_RECEIPT, move |event| {
            sink.lock().unwrap().push(event.data.clone());
        });

        let reader = hub.on_connect(UserId::from("bob"), MockChannel::new());
        hub.handle_inbound(reader, r#"{"type":"read","conversationId":"c1"}"#);
        hub.handle_inbound(reader, "garbage");

        let receipts = receipts.lock().unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0]["readerId"], "bob");
    }

    #[test]
    fn test_send_message_frame_is_published_locally() {
        let hub = hub();
        let submitted = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&submitted);
        let _sub = hub.subscribe(EventKind::MESSAGE_SUBMITTED, move |event| {
            sink.lock().unwrap().push(event.data.clone());
        });

        let recipient = MockChannel::new();
        hub.on_connect(UserId::from("bob"), recipient.clone());
        let sender = hub.on_connect(UserId::from("alice"), MockChannel::new());
        hub.handle_inbound(
            sender,
            r#"{"type":"send_message","receiverId":"bob","conversationId":"c1","content":"hey"}"#,
        );

        let submitted = submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0]["senderId"], "alice");
        assert_eq!(submitted[0]["recipientId"], "bob");
        assert_eq!(submitted[0]["content"], "hey");
        // Delivery waits for the persistence subscriber
        assert!(recipient.sent().is_empty());
    }

    #[test]
    fn test_typing_frame_accepts_receiver_id() {
        let hub = hub();
        let sender = hub.on_connect(UserId::from("alice"), MockChannel::new());
        let recipient = MockChannel::new();
        hub.on_connect(UserId::from("bob"), recipient.clone());

        hub.handle_inbound(
            sender,
            r#"{"type":"typing","receiverId":"bob","conversationId":"c1"}"#,
        );
        assert_eq!(recipient.sent().len(), 1);
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let hub = hub();
        let channels: Vec<MockChannel> = (0..3).map(|_| MockChannel::new()).collect();
        for channel in &channels {
            hub.on_connect(UserId::from("u1"), channel.clone());
        }
        hub.shutdown();
        assert_eq!(hub.user_count(), 0);
        assert!(channels.iter().all(|c| c.close_count() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_task_prunes_and_stops() {
        let hub: FanOutHub<MockChannel> = FanOutHub::with_config(HubConfig {
            heartbeat_interval: Duration::from_secs(30),
        });
        let channel = MockChannel::new();
        hub.on_connect(UserId::from("u1"), channel.clone());

        let handle = hub.start_heartbeat();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(channel.ping_count(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(hub.total_connections(), 0);

        handle.shutdown().await.unwrap();
    }
}
