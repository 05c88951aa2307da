//! Optimistic membership mutations with rollback.

pub mod controller;
pub mod types;

pub use controller::{MutationController, SkipReason, ToggleOutcome};
pub use types::{
    CollectionState, IdentityKey, MembershipRecord, MutationDirection, SubjectKey,
};
