//! Structural change notifications.
//!
//! Handlers are called synchronously on the thread that changed the network,
//! after the change is complete. A handler runs without the registry lock
//! held, so it may subscribe or drop subscriptions itself.

use super::connection::Connection;
use super::id::ProcessorId;
use super::property::PropertyLink;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    ProcessorAdded {
        id: ProcessorId,
        identifier: String,
    },
    ProcessorRemoved {
        id: ProcessorId,
        identifier: String,
    },
    ConnectionAdded(Connection),
    ConnectionRemoved(Connection),
    LinkAdded(PropertyLink),
    LinkRemoved(PropertyLink),
    /// The outermost lock was released.
    Unlocked,
}

pub type NetworkEventHandler = Arc<dyn Fn(&NetworkEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: BTreeMap<u64, NetworkEventHandler>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

#[derive(Default, Clone)]
pub struct ObserverRegistry {
    inner: SharedRegistry,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handler stays registered until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&NetworkEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.insert(id, Arc::new(handler));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every handler in subscription order.
    pub fn notify(&self, event: &NetworkEvent) {
        let handlers: Vec<NetworkEventHandler> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .values()
            .cloned()
            .collect();

        tracing::trace!("Notifying {} observers of {:?}", handlers.len(), event);
        for handler in handlers {
            handler(event);
        }
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Unsubscribe now. Same as dropping.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handlers
                .remove(&self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_subscribers_until_dropped() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let subscription = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.notify(&NetworkEvent::Unlocked);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        drop(subscription);
        registry.notify(&NetworkEvent::Unlocked);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handler_may_subscribe_during_notify() {
        let registry = ObserverRegistry::new();
        let inner = registry.clone();
        let added = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&added);

        let _outer = registry.subscribe(move |_| {
            sink.lock().unwrap().push(inner.subscribe(|_| {}));
        });
        registry.notify(&NetworkEvent::Unlocked);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_subscription_outliving_registry() {
        let registry = ObserverRegistry::new();
        let subscription = registry.subscribe(|_| {});
        drop(registry);
        subscription.cancel();
    }
}
