//! Data types for optimistic collection-membership changes.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Stable identity of an item's membership record, e.g. `expert-Jane Doe`.
///
/// Distinct from the item's own identity: the same logical item may be
/// keyed by its name, a numeric id or a site id depending on the feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectKey(pub String);

impl SubjectKey {
    pub fn new(item_type: &str, identifier: &str) -> Self {
        Self(format!("{}-{}", item_type, identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One identifying field of a record, qualified by the field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(pub String);

impl IdentityKey {
    pub fn new(field: &str, value: &str) -> Self {
        Self(format!("{}:{}", field, value.trim()))
    }
}

/// A record that can be a member of a collection.
pub trait MembershipRecord: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Identity keys in priority order: primary natural identifier first,
    /// then fallbacks such as a numeric or site-specific id.
    fn identity_keys(&self) -> Vec<IdentityKey>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationDirection {
    Add,
    Remove,
}

impl MutationDirection {
    /// The transition that flips the given membership.
    pub fn from_membership(currently_member: bool) -> Self {
        if currently_member {
            Self::Remove
        } else {
            Self::Add
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Committed,
    RolledBack,
}

/// The local view of a remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T> {
    items: Vec<T>,
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: MembershipRecord> CollectionState<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finds the record matching `keys`.
    ///
    /// Keys are tried in priority order and the search stops at the first
    /// key that matches any record.
    pub fn position(&self, keys: &[IdentityKey]) -> Option<usize> {
        keys.iter().find_map(|key| {
            self.items
                .iter()
                .position(|item| item.identity_keys().contains(key))
        })
    }

    pub fn contains(&self, record: &T) -> bool {
        self.position(&record.identity_keys()).is_some()
    }

    /// Appends `record` unless an equivalent record is already present.
    pub fn insert(&mut self, record: T) -> bool {
        if self.contains(&record) {
            return false;
        }
        self.items.push(record);
        true
    }

    /// Inserts `record` at `index` (clamped) unless already present.
    pub fn insert_at(&mut self, index: usize, record: T) -> bool {
        if self.contains(&record) {
            return false;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, record);
        true
    }

    /// Removes the record equivalent to `record`, returning it with its index.
    pub fn remove_matching(&mut self, record: &T) -> Option<(usize, T)> {
        let index = self.position(&record.identity_keys())?;
        Some((index, self.items.remove(index)))
    }
}

/// One in-flight optimistic change. Lives in memory for one request.
#[derive(Debug, Clone)]
pub struct MutationIntent<T> {
    pub subject: SubjectKey,
    pub direction: MutationDirection,
    pub record: T,
    /// Collection exactly as it was before the optimistic change.
    pub previous_snapshot: CollectionState<T>,
    pub status: MutationStatus,
    /// Collection revision right after the optimistic change was applied.
    pub applied_revision: u64,
    /// Identity epoch the intent was created in.
    pub epoch: u64,
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
