//! Quota reconciler.
//!
//! Keeps the local counter in step with the remote quota service. Reads are
//! served from the counter store; remote checks are throttled by
//! `reconcile_interval`, and any successful remote answer overwrites the
//! local guess.

use super::types::{Identity, QuotaState, QuotaView};
use crate::counter_store::CounterStore;
use crate::remote::{RemoteError, RemoteQuota, RemoteQuotaService};
use crate::services::SharedClock;
use crate::signal_bus::{Signal, SignalBus, SignalKind, Subscription};
use crate::structured_logger::StructuredLogger;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Throttle between remote checks unless configured otherwise.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: i64 = 5;

/// What a quota-consuming action reports back on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse<T> {
    pub value: T,
    /// Remaining allowance, when the server includes it in the response.
    pub remaining: Option<u32>,
}

struct IdentityState {
    identity: Identity,
    /// Bumped on every identity reset. Remote answers from an older epoch
    /// are dropped.
    epoch: u64,
}

pub struct QuotaReconciler {
    store: Arc<CounterStore>,
    remote: Arc<dyn RemoteQuotaService>,
    bus: SignalBus,
    clock: SharedClock,
    reconcile_interval: chrono::Duration,
    identity: Mutex<IdentityState>,
    journal: Option<Arc<StructuredLogger>>,
    _identity_subscription: Subscription,
}

impl QuotaReconciler {
    /// Creates the reconciler and subscribes it to identity changes, which
    /// clear the counter.
    pub fn new(
        store: Arc<CounterStore>,
        remote: Arc<dyn RemoteQuotaService>,
        bus: SignalBus,
        clock: SharedClock,
        reconcile_interval: chrono::Duration,
        journal: Option<Arc<StructuredLogger>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let subscription = bus.subscribe(SignalKind::IdentityChanged, move |signal| {
                if let (Some(reconciler), Signal::IdentityChanged(identity)) =
                    (weak.upgrade(), signal)
                {
                    reconciler.reset_identity(*identity);
                }
            });
            Self {
                store,
                remote,
                bus,
                clock,
                reconcile_interval,
                identity: Mutex::new(IdentityState {
                    identity: Identity::Anonymous,
                    epoch: 0,
                }),
                journal,
                _identity_subscription: subscription,
            }
        })
    }

    pub fn max_count(&self) -> u32 {
        self.store.max_count()
    }

    fn lock_identity(&self) -> MutexGuard<'_, IdentityState> {
        self.identity.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn identity(&self) -> Identity {
        self.lock_identity().identity
    }

    fn epoch(&self) -> u64 {
        self.lock_identity().epoch
    }

    pub fn state(&self) -> QuotaState {
        self.store.read()
    }

    /// Remaining allowance from the local counter. No network access.
    pub fn get_cached_remaining(&self) -> u32 {
        self.store.read().remaining()
    }

    /// Cached view, `Unlimited` while the actor is authenticated.
    pub fn cached_view(&self) -> QuotaView {
        match self.identity() {
            Identity::Authenticated => QuotaView::Unlimited,
            Identity::Anonymous => self.store.read().view(),
        }
    }

    /// True when the last successful reconcile is missing or older than the
    /// interval. Authenticated actors have nothing to reconcile.
    pub fn should_reconcile(&self) -> bool {
        if self.identity() == Identity::Authenticated {
            return false;
        }
        match self.store.read().last_sync_at {
            None => true,
            Some(last) => self.clock.now() - last > self.reconcile_interval,
        }
    }

    /// Pulls the authoritative quota unless throttled.
    ///
    /// Failures are absorbed: the cached view comes back and nothing is
    /// published.
    pub async fn reconcile(&self, force: bool) -> QuotaView {
        if !force && !self.should_reconcile() {
            return self.cached_view();
        }

        let epoch = self.epoch();
        match self.remote.fetch_remaining().await {
            Ok(remote) => self.apply_remote(remote, force, epoch),
            Err(e) => {
                tracing::warn!("Quota reconcile failed, keeping cached state: {}", e);
                let view = self.cached_view();
                if let Some(journal) = &self.journal {
                    journal.log_reconcile(force, &view, Some(&e.to_string()));
                }
                view
            }
        }
    }

    /// Optimistically records one quota-consuming action.
    pub fn consume_one(&self) -> QuotaView {
        if self.identity() == Identity::Authenticated {
            return QuotaView::Unlimited;
        }
        let state = self.store.increment();
        tracing::debug!("Consumed quota: {}/{}", state.count, state.max_count);
        if let Some(journal) = &self.journal {
            journal.log_quota_consumed(state.count, state.max_count);
        }
        state.view()
    }

    /// Records a remaining count the server returned with an action.
    pub fn apply_remote_remaining(&self, remaining: u32) -> QuotaView {
        self.apply_remote(RemoteQuota::limited(remaining), false, self.epoch())
    }

    /// Whether a quota-consuming action may start, reconciling first when
    /// the cache is stale. Advisory only: the server still decides.
    pub async fn is_allowed(&self) -> bool {
        self.reconcile(false).await.allows_action()
    }

    /// Runs one quota-consuming action.
    ///
    /// The counter is bumped before the call. A remaining count in the
    /// response is applied; an authoritative rejection forces a reconcile
    /// since the optimistic bump may now be wrong in either direction.
    pub async fn perform<T, F, Fut>(&self, action: F) -> Result<T, RemoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ActionResponse<T>, RemoteError>>,
    {
        self.consume_one();
        let epoch = self.epoch();
        match action().await {
            Ok(response) => {
                if let Some(remaining) = response.remaining {
                    self.apply_remote(RemoteQuota::limited(remaining), false, epoch);
                }
                Ok(response.value)
            }
            Err(e) if e.is_authoritative_rejection() => {
                self.reconcile(true).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Applies an authoritative answer obtained during `epoch`.
    ///
    /// The identity lock is held across the store update so an identity
    /// reset cannot interleave with it.
    fn apply_remote(&self, remote: RemoteQuota, forced: bool, epoch: u64) -> QuotaView {
        let applied = {
            let mut identity = self.lock_identity();
            if identity.epoch != epoch {
                tracing::debug!("Identity changed during reconcile, dropping remote quota");
                None
            } else if remote.unlimited {
                self.store.clear();
                identity.identity = Identity::Authenticated;
                Some(QuotaView::Unlimited)
            } else if let Some(remaining) = remote.remaining {
                let max_count = self.store.max_count();
                let state = self
                    .store
                    .write(max_count.saturating_sub(remaining.min(max_count)));
                identity.identity = Identity::Anonymous;
                Some(state.view())
            } else {
                tracing::warn!("Remote quota without remaining count; keeping cached state");
                None
            }
        };

        let Some(view) = applied else {
            return self.cached_view();
        };
        if let Some(journal) = &self.journal {
            journal.log_reconcile(forced, &view, None);
        }
        self.bus.publish(Signal::QuotaChanged(view));
        view
    }

    fn reset_identity(&self, identity: Identity) {
        {
            let mut state = self.lock_identity();
            state.epoch += 1;
            state.identity = identity;
            self.store.clear();
        }
        if let Some(journal) = &self.journal {
            journal.increment_run_id();
            journal.log_identity_changed(identity);
        }
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
