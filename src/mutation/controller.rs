//! Optimistic mutation controller.
//!
//! Flips a record's membership in the local collection before the remote
//! call resolves, keeps at most one in-flight change per subject, and puts
//! the collection back when the remote call fails. Every feature surface
//! (experts, trials, publications) shares this one implementation.

use super::types::{
    CollectionState, MembershipRecord, MutationDirection, MutationIntent, MutationStatus,
    SubjectKey,
};
use crate::remote::RemoteError;
use crate::signal_bus::{Signal, SignalBus, SignalKind, Subscription};
use crate::structured_logger::StructuredLogger;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Why a toggle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another change for the same subject is still in flight.
    AlreadyPending,
    /// The identity changed while the request was in flight; the response
    /// belongs to state that no longer exists.
    Stale,
}

/// Result of one `toggle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Committed {
        direction: MutationDirection,
    },
    /// The optimistic change was undone. The caller owns the notification.
    RolledBack {
        direction: MutationDirection,
        error: RemoteError,
    },
    Skipped(SkipReason),
}

impl ToggleOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

struct ControllerState<T> {
    collection: CollectionState<T>,
    /// Bumped on every change to `collection`, never decreases.
    revision: u64,
    /// Bumped on identity reset.
    epoch: u64,
    /// Pending intents by subject. Presence here is the pending guard.
    intents: HashMap<SubjectKey, MutationIntent<T>>,
}

pub struct MutationController<T: MembershipRecord> {
    state: Mutex<ControllerState<T>>,
    view_tx: watch::Sender<CollectionState<T>>,
    journal: Option<Arc<StructuredLogger>>,
    _identity_subscription: Subscription,
}

impl<T: MembershipRecord> MutationController<T> {
    /// Creates a controller that resets itself on `IdentityChanged`.
    pub fn new(bus: &SignalBus, journal: Option<Arc<StructuredLogger>>) -> Arc<Self> {
        let (view_tx, _) = watch::channel(CollectionState::default());
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let subscription = bus.subscribe(SignalKind::IdentityChanged, move |signal| {
                if let (Some(controller), Signal::IdentityChanged(_)) = (weak.upgrade(), signal) {
                    controller.reset();
                }
            });
            Self {
                state: Mutex::new(ControllerState {
                    collection: CollectionState::default(),
                    revision: 0,
                    epoch: 0,
                    intents: HashMap::new(),
                }),
                view_tx,
                journal,
                _identity_subscription: subscription,
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current local view of the collection.
    pub fn snapshot(&self) -> CollectionState<T> {
        self.lock().collection.clone()
    }

    /// Receives every new local view, optimistic or settled.
    pub fn subscribe_view(&self) -> watch::Receiver<CollectionState<T>> {
        self.view_tx.subscribe()
    }

    pub fn contains(&self, record: &T) -> bool {
        self.lock().collection.contains(record)
    }

    pub fn is_pending(&self, subject: &SubjectKey) -> bool {
        self.lock().intents.contains_key(subject)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().intents.len()
    }

    /// Replaces the local view with the server's collection.
    ///
    /// Skipped while any change is in flight, since the server copy would
    /// not yet include it. Returns whether the view was replaced.
    pub fn replace_collection(&self, items: Vec<T>) -> bool {
        let mut state = self.lock();
        if !state.intents.is_empty() {
            tracing::debug!("Skipping collection refresh: changes still in flight");
            return false;
        }
        state.collection = CollectionState::new(items);
        state.revision += 1;
        self.publish(&state);
        true
    }

    /// Drops the collection and every pending intent. Responses for the
    /// dropped intents are ignored when they arrive.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.intents.clear();
        state.collection = CollectionState::default();
        state.revision += 1;
        self.publish(&state);
    }

    /// Flips membership of `record` optimistically and settles it with the
    /// matching remote operation.
    pub async fn toggle<A, FA, R, FR>(
        &self,
        subject: SubjectKey,
        record: T,
        currently_member: bool,
        add: A,
        remove: R,
    ) -> ToggleOutcome
    where
        A: FnOnce() -> FA,
        FA: Future<Output = Result<(), RemoteError>>,
        R: FnOnce() -> FR,
        FR: Future<Output = Result<(), RemoteError>>,
    {
        let direction = MutationDirection::from_membership(currently_member);
        let Some(epoch) = self.begin(&subject, record, direction) else {
            return ToggleOutcome::Skipped(SkipReason::AlreadyPending);
        };

        let result = match direction {
            MutationDirection::Add => add().await,
            MutationDirection::Remove => remove().await,
        };

        self.settle(&subject, epoch, result)
    }

    /// Like [`toggle`](Self::toggle), then re-reads the authoritative
    /// collection after a commit to pick up server-side enrichment.
    ///
    /// A failed refresh leaves the committed optimistic state in place.
    pub async fn toggle_with_refresh<A, FA, R, FR, F, FF>(
        &self,
        subject: SubjectKey,
        record: T,
        currently_member: bool,
        add: A,
        remove: R,
        refresh: F,
    ) -> ToggleOutcome
    where
        A: FnOnce() -> FA,
        FA: Future<Output = Result<(), RemoteError>>,
        R: FnOnce() -> FR,
        FR: Future<Output = Result<(), RemoteError>>,
        F: FnOnce() -> FF,
        FF: Future<Output = Result<Vec<T>, RemoteError>>,
    {
        let outcome = self
            .toggle(subject, record, currently_member, add, remove)
            .await;
        if outcome.is_committed() {
            match refresh().await {
                Ok(items) => {
                    self.replace_collection(items);
                }
                Err(e) => tracing::debug!("Best-effort refresh failed: {}", e),
            }
        }
        outcome
    }

    /// Applies the optimistic change and registers the pending intent.
    /// Returns `None` when the subject already has a pending intent.
    fn begin(&self, subject: &SubjectKey, record: T, direction: MutationDirection) -> Option<u64> {
        let mut state = self.lock();
        if state.intents.contains_key(subject) {
            tracing::debug!("Ignoring toggle for {}: already pending", subject);
            return None;
        }

        let previous_snapshot = state.collection.clone();
        match direction {
            MutationDirection::Add => {
                state.collection.insert(record.clone());
            }
            MutationDirection::Remove => {
                state.collection.remove_matching(&record);
            }
        }
        state.revision += 1;

        let epoch = state.epoch;
        let intent = MutationIntent {
            subject: subject.clone(),
            direction,
            record,
            previous_snapshot,
            status: MutationStatus::Pending,
            applied_revision: state.revision,
            epoch,
        };
        state.intents.insert(subject.clone(), intent);
        self.publish(&state);
        Some(epoch)
    }

    fn settle(
        &self,
        subject: &SubjectKey,
        epoch: u64,
        result: Result<(), RemoteError>,
    ) -> ToggleOutcome {
        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::debug!("Dropping response for {}: identity changed", subject);
            return ToggleOutcome::Skipped(SkipReason::Stale);
        }
        let Some(mut intent) = state.intents.remove(subject) else {
            tracing::warn!("No pending intent for {}; ignoring settlement", subject);
            return ToggleOutcome::Skipped(SkipReason::Stale);
        };

        let outcome = match result {
            Ok(()) => {
                intent.status = MutationStatus::Committed;
                ToggleOutcome::Committed {
                    direction: intent.direction,
                }
            }
            Err(error) => {
                intent.status = MutationStatus::RolledBack;
                tracing::warn!(
                    "Rolling back {:?} of {}: {}",
                    intent.direction,
                    subject,
                    error
                );
                Self::roll_back(&mut state, &intent);
                self.publish(&state);
                ToggleOutcome::RolledBack {
                    direction: intent.direction,
                    error,
                }
            }
        };

        if let Some(journal) = &self.journal {
            journal.log_mutation_settled(subject.as_str(), intent.direction, intent.status);
        }
        outcome
    }

    fn roll_back(state: &mut ControllerState<T>, intent: &MutationIntent<T>) {
        if state.revision == intent.applied_revision {
            // Nothing else touched the collection since our change.
            state.collection = intent.previous_snapshot.clone();
        } else {
            // Other subjects changed meanwhile; only undo our own record.
            match intent.direction {
                MutationDirection::Add => {
                    if !intent.previous_snapshot.contains(&intent.record) {
                        state.collection.remove_matching(&intent.record);
                    }
                }
                MutationDirection::Remove => {
                    let keys = intent.record.identity_keys();
                    if let Some(index) = intent.previous_snapshot.position(&keys) {
                        let original = intent.previous_snapshot.items()[index].clone();
                        state.collection.insert_at(index, original);
                    }
                }
            }
        }
        state.revision += 1;
    }

    fn publish(&self, state: &ControllerState<T>) {
        self.view_tx.send_replace(state.collection.clone());
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
