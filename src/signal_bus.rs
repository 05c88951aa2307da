//! In-process publish/subscribe for quota and identity changes.
//!
//! Independent surfaces learn about quota consumption and identity
//! transitions through here without holding references to each other.
//! Delivery is synchronous and stays inside the process.

use crate::quota::types::{Identity, QuotaView};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Everything that can travel over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Authoritative quota after a reconcile (never a delta).
    QuotaChanged(QuotaView),
    /// Login or logout. Subscribers drop all local quota and mutation state.
    IdentityChanged(Identity),
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::QuotaChanged(_) => SignalKind::QuotaChanged,
            Self::IdentityChanged(_) => SignalKind::IdentityChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalKind {
    QuotaChanged,
    IdentityChanged,
}

type Handler = Arc<dyn Fn(&Signal) + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: BTreeMap<u64, (SignalKind, Handler)>,
}

/// Cheap to clone; clones share one subscriber registry.
#[derive(Clone, Default)]
pub struct SignalBus {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `signal` to every current subscriber of its kind.
    ///
    /// Handlers run after the registry lock is released, so a handler may
    /// publish or drop subscriptions itself.
    pub fn publish(&self, signal: Signal) {
        let kind = signal.kind();
        let handlers: Vec<Handler> = match self.registry.lock() {
            Ok(registry) => registry
                .handlers
                .values()
                .filter(|(k, _)| *k == kind)
                .map(|(_, h)| Arc::clone(h))
                .collect(),
            Err(_) => {
                tracing::warn!("Signal registry poisoned, dropping {:?}", signal);
                return;
            }
        };

        tracing::debug!("Publishing {:?} to {} subscriber(s)", signal, handlers.len());
        for handler in handlers {
            handler(&signal);
        }
    }

    /// Registers `handler` for signals of `kind`.
    ///
    /// The handler stays registered for as long as the returned
    /// [`Subscription`] lives.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, kind: SignalKind, handler: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut registry) = self.registry.lock() {
            registry.handlers.insert(id, (kind, Arc::new(handler)));
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of live subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: SignalKind) -> usize {
        self.registry
            .lock()
            .map(|r| r.handlers.values().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }
}

/// Handle for one registered handler. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut registry) = registry.lock() {
                registry.handlers.remove(&self.id);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[path = "tests/signal_bus_tests.rs"]
mod tests;
