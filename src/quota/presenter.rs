//! Quota presenter: the read-only remaining-count view of one UI surface.
//!
//! Paints the cached count immediately, corrects it with one forced
//! reconcile, and follows the signal bus for as long as it is mounted.
//! Unmounting is dropping the [`MountedPresenter`]; its subscriptions go
//! with it and late reconcile results are discarded.

use super::reconciler::QuotaReconciler;
use super::types::{Identity, QuotaView};
use crate::signal_bus::{Signal, SignalBus, SignalKind, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

struct PresenterInner {
    view: Mutex<QuotaView>,
    max_count: u32,
    /// Cleared on unmount. Results arriving afterwards are dropped.
    alive: AtomicBool,
    /// Cleared while the actor is authenticated.
    reconciling: AtomicBool,
}

impl PresenterInner {
    fn set_view(&self, view: QuotaView) {
        if let Ok(mut current) = self.view.lock() {
            *current = view;
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Applies a reconcile result this presenter asked for.
    fn apply_reconciled(&self, view: QuotaView) {
        if !self.is_alive() {
            tracing::debug!("Presenter unmounted, dropping reconcile result");
            return;
        }
        if self.reconciling.load(Ordering::SeqCst) {
            self.set_view(view);
        }
    }

    fn on_signal(&self, signal: &Signal) {
        if !self.is_alive() {
            return;
        }
        match signal {
            Signal::QuotaChanged(view) => {
                // An unlimited answer means the server sees a signed-in actor.
                self.reconciling.store(!view.is_unlimited(), Ordering::SeqCst);
                self.set_view(*view);
            }
            Signal::IdentityChanged(Identity::Authenticated) => {
                self.reconciling.store(false, Ordering::SeqCst);
                self.set_view(QuotaView::Unlimited);
            }
            Signal::IdentityChanged(Identity::Anonymous) => {
                self.reconciling.store(true, Ordering::SeqCst);
                self.set_view(QuotaView::Limited {
                    remaining: self.max_count,
                    max_count: self.max_count,
                });
            }
        }
    }
}

pub struct MountedPresenter {
    inner: Arc<PresenterInner>,
    reconciler: Arc<QuotaReconciler>,
    initial_sync: Mutex<Option<JoinHandle<()>>>,
    _subscriptions: [Subscription; 2],
}

impl MountedPresenter {
    /// Mounts a presenter. Must be called inside a tokio runtime; the
    /// initial forced reconcile runs as a background task.
    pub fn mount(reconciler: Arc<QuotaReconciler>, bus: &SignalBus) -> Self {
        let cached = reconciler.cached_view();
        let inner = Arc::new(PresenterInner {
            view: Mutex::new(cached),
            max_count: reconciler.max_count(),
            alive: AtomicBool::new(true),
            reconciling: AtomicBool::new(!cached.is_unlimited()),
        });

        let quota_inner = Arc::clone(&inner);
        let identity_inner = Arc::clone(&inner);
        let subscriptions = [
            bus.subscribe(SignalKind::QuotaChanged, move |signal| {
                quota_inner.on_signal(signal)
            }),
            bus.subscribe(SignalKind::IdentityChanged, move |signal| {
                identity_inner.on_signal(signal)
            }),
        ];

        let task_inner = Arc::clone(&inner);
        let task_reconciler = Arc::clone(&reconciler);
        let initial_sync = tokio::spawn(async move {
            let view = task_reconciler.reconcile(true).await;
            task_inner.apply_reconciled(view);
        });

        Self {
            inner,
            reconciler,
            initial_sync: Mutex::new(Some(initial_sync)),
            _subscriptions: subscriptions,
        }
    }

    /// Waits for the on-mount reconcile to finish.
    pub async fn initial_sync(&self) {
        let handle = self.initial_sync.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Initial quota sync task failed: {}", e);
            }
        }
    }

    pub fn view(&self) -> QuotaView {
        self.inner
            .view
            .lock()
            .map(|v| *v)
            .unwrap_or(QuotaView::Unlimited)
    }

    pub fn render(&self) -> String {
        self.view().to_string()
    }

    pub fn is_reconciling(&self) -> bool {
        self.inner.reconciling.load(Ordering::SeqCst)
    }

    /// Forces a reconcile, unless the actor is authenticated.
    pub async fn refresh(&self) -> QuotaView {
        if self.is_reconciling() {
            let view = self.reconciler.reconcile(true).await;
            self.inner.apply_reconciled(view);
        }
        self.view()
    }
}

impl Drop for MountedPresenter {
    fn drop(&mut self) {
        self.inner.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "tests/presenter_tests.rs"]
mod tests;
