//! Anonymous quota: local counter view, reconciliation, presentation.

pub mod presenter;
pub mod reconciler;
pub mod types;

pub use presenter::MountedPresenter;
pub use reconciler::{ActionResponse, QuotaReconciler};
pub use types::{Identity, QuotaState, QuotaView};
