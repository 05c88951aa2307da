//! Favorites: one optimistic collection per item type.
//!
//! Binds a [`MutationController`] to the remote collection service. Experts,
//! trials and publications each get a `Favorites<T>`; they differ only in
//! the record type and how it identifies itself.

use crate::mutation::controller::{MutationController, SkipReason, ToggleOutcome};
use crate::mutation::types::{IdentityKey, MembershipRecord, MutationDirection, SubjectKey};
use crate::remote::{RemoteCollectionService, RemoteError};
use crate::signal_bus::SignalBus;
use crate::structured_logger::StructuredLogger;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A record that can be saved as a favorite.
pub trait FavoriteItem: MembershipRecord + Serialize + DeserializeOwned {
    /// Identifier the server deletes by.
    fn remote_id(&self) -> String;
}

/// An untyped favorite: a server id plus whatever fields came with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl FavoriteRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fields: Map::new(),
        }
    }
}

impl MembershipRecord for FavoriteRecord {
    fn identity_keys(&self) -> Vec<IdentityKey> {
        vec![IdentityKey::new("id", &self.id)]
    }
}

impl FavoriteItem for FavoriteRecord {
    fn remote_id(&self) -> String {
        self.id.clone()
    }
}

pub struct Favorites<T: FavoriteItem> {
    item_type: String,
    remote: Arc<dyn RemoteCollectionService>,
    controller: Arc<MutationController<T>>,
}

impl<T: FavoriteItem> Favorites<T> {
    pub fn new(
        item_type: &str,
        remote: Arc<dyn RemoteCollectionService>,
        bus: &SignalBus,
        journal: Option<Arc<StructuredLogger>>,
    ) -> Self {
        Self {
            item_type: item_type.to_string(),
            remote,
            controller: MutationController::new(bus, journal),
        }
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn controller(&self) -> &Arc<MutationController<T>> {
        &self.controller
    }

    pub fn subject_for(&self, record: &T) -> SubjectKey {
        SubjectKey::new(&self.item_type, &record.remote_id())
    }

    pub fn is_favorite(&self, record: &T) -> bool {
        self.controller.contains(record)
    }

    pub fn items(&self) -> Vec<T> {
        self.controller.snapshot().items().to_vec()
    }

    /// Replaces the local collection with the server's.
    ///
    /// Returns the number of items now held. While a toggle is in flight
    /// the local view is kept and the current length is returned.
    pub async fn load(&self) -> Result<usize, RemoteError> {
        let items = decode(self.remote.list(&self.item_type).await?);
        self.controller.replace_collection(items);
        Ok(self.controller.snapshot().len())
    }

    /// Adds or removes `record` depending on whether it is currently a
    /// favorite. The local view flips immediately.
    pub async fn toggle(&self, record: T) -> ToggleOutcome {
        let currently_member = self.is_favorite(&record);
        let subject = self.subject_for(&record);
        let remote = self.remote.as_ref();
        let item_type = self.item_type.as_str();
        let id = record.remote_id();
        let payload = record.clone();

        self.controller
            .toggle_with_refresh(
                subject,
                record,
                currently_member,
                move || async move {
                    let item = serde_json::to_value(&payload)
                        .map_err(|e| RemoteError::parse(e.to_string()))?;
                    remote.add(item_type, item).await.map(|_| ())
                },
                move || async move { remote.remove(item_type, &id).await.map(|_| ()) },
                move || async move { remote.list(item_type).await.map(decode) },
            )
            .await
    }

    /// User-facing notification for a toggle outcome. Skipped toggles are
    /// silent.
    pub fn notice_for(&self, outcome: &ToggleOutcome) -> Option<String> {
        match outcome {
            ToggleOutcome::Committed {
                direction: MutationDirection::Add,
            } => Some(format!("Added {} to favorites", self.item_type)),
            ToggleOutcome::Committed {
                direction: MutationDirection::Remove,
            } => Some(format!("Removed {} from favorites", self.item_type)),
            ToggleOutcome::RolledBack { direction, error } => {
                let action = match direction {
                    MutationDirection::Add => "add",
                    MutationDirection::Remove => "remove",
                };
                Some(match error {
                    RemoteError::Rejected { reason } => {
                        format!("Couldn't {} {}: {}", action, self.item_type, reason)
                    }
                    _ => format!(
                        "Couldn't {} {}. Please try again.",
                        action, self.item_type
                    ),
                })
            }
            ToggleOutcome::Skipped(SkipReason::AlreadyPending | SkipReason::Stale) => None,
        }
    }
}

/// Decodes server items, dropping the ones that don't fit `T`.
fn decode<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping unreadable favorite: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/favorites_tests.rs"]
mod tests;
