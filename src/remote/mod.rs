//! Contracts of the remote services this crate reconciles against.
//!
//! The quota counter and the favorites store are owned by the server; this
//! module only describes what the client consumes from them.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::errors::RemoteError;

/// Response of `GET remaining-quota`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteQuota {
    pub unlimited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

impl RemoteQuota {
    pub fn limited(remaining: u32) -> Self {
        Self {
            unlimited: false,
            remaining: Some(remaining),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            unlimited: true,
            remaining: None,
        }
    }
}

/// Authoritative quota counter.
#[async_trait]
pub trait RemoteQuotaService: Send + Sync {
    async fn fetch_remaining(&self) -> Result<RemoteQuota, RemoteError>;
}

/// Authoritative membership collection (favorites).
///
/// Items travel as JSON so one client serves every item type.
#[async_trait]
pub trait RemoteCollectionService: Send + Sync {
    /// `POST` `{ type, item }`; returns the updated collection.
    async fn add(
        &self,
        item_type: &str,
        item: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, RemoteError>;

    /// `DELETE` keyed by `{ type, id }`; returns the updated collection.
    async fn remove(&self, item_type: &str, id: &str)
        -> Result<Vec<serde_json::Value>, RemoteError>;

    /// Current collection for one item type.
    async fn list(&self, item_type: &str) -> Result<Vec<serde_json::Value>, RemoteError>;
}
