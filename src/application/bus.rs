//! In-process publish/subscribe for locally generated events.
//!
//! Handlers run synchronously on the publishing thread, in registration
//! order. The handler list is copied out before any handler runs, so a
//! handler may subscribe or cancel without deadlocking the bus.

use crate::domain::event::{EventKind, OutboundEvent};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Handler = Arc<dyn Fn(&OutboundEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    handlers: DashMap<EventKind, Vec<(u64, Handler)>, ahash::RandomState>,
    next_id: AtomicU64,
}

/// Local event bus keyed by event kind.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.inner.handlers.len())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    ///
    /// The handler stays registered until the returned `Subscription` is
    /// cancelled or dropped.
    pub fn subscribe<F>(&self, kind: impl Into<EventKind>, handler: F) -> Subscription
    where
        F: Fn(&OutboundEvent) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .entry(kind.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Invoke every handler registered for the event's kind.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, event: &OutboundEvent) -> usize {
        let handlers: Vec<Handler> = match self.inner.handlers.get(&event.kind) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Handlers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: &EventKind) -> usize {
        self.inner.handlers.get(kind).map_or(0, |entry| entry.len())
    }
}

/// Handle to a registered handler.
///
/// Cancelling consumes the handle, so a subscription is removed exactly
/// once. Dropping the handle cancels as well.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Remove the handler from the bus.
    pub fn cancel(self) {
        drop(self);
    }

    /// Kind this subscription listens to.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let entry = bus.handlers.entry(self.kind.clone());
        if let Entry::Occupied(mut entry) = entry {
            entry.get_mut().retain(|(id, _)| *id != self.id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn notification() -> OutboundEvent {
        OutboundEvent::new(EventKind::NEW_NOTIFICATION, json!({"id": 1}))
    }

    #[test]
    fn test_publish_reaches_matching_kind_only() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&seen);
        let _sub = bus.subscribe(EventKind::NEW_NOTIFICATION, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(&notification()), 1);
        let other = OutboundEvent::new(EventKind::NEW_MESSAGE, json!({}));
        assert_eq!(bus.publish(&other), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_removes_handler() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::NEW_NOTIFICATION, |_| {});
        assert_eq!(bus.subscriber_count(&EventKind::NEW_NOTIFICATION), 1);

        sub.cancel();
        assert_eq!(bus.subscriber_count(&EventKind::NEW_NOTIFICATION), 0);
        assert_eq!(bus.publish(&notification()), 0);
    }

    #[test]
    fn test_duplicate_subscriptions_are_distinct() {
        let bus = EventBus::new();
        let first = bus.subscribe(EventKind::NEW_NOTIFICATION, |_| {});
        let _second = bus.subscribe(EventKind::NEW_NOTIFICATION, |_| {});
        assert_eq!(bus.publish(&notification()), 2);

        first.cancel();
        assert_eq!(bus.publish(&notification()), 1);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<Subscription> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                bus.subscribe(EventKind::NEW_NOTIFICATION, move |_| {
                    order.lock().unwrap().push(i);
                })
            })
            .collect();

        bus.publish(&notification());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_handler_may_subscribe_during_publish() {
        let bus = EventBus::new();
        let nested = Arc::new(Mutex::new(Vec::new()));

        let bus_clone = bus.clone();
        let nested_clone = Arc::clone(&nested);
        let _sub = bus.subscribe(EventKind::NEW_NOTIFICATION, move |_| {
            let sub = bus_clone.subscribe(EventKind::NEW_NOTIFICATION, |_| {});
            nested_clone.lock().unwrap().push(sub);
        });

        assert_eq!(bus.publish(&notification()), 1);
        assert_eq!(bus.subscriber_count(&EventKind::NEW_NOTIFICATION), 2);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::NEW_NOTIFICATION, |_| {});
        drop(bus);
        sub.cancel();
    }
}
