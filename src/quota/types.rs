//! Data types for quota tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local copy of the anonymous actor's quota usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub count: u32,
    pub max_count: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl QuotaState {
    /// State before anything has been recorded.
    pub fn fresh(max_count: u32) -> Self {
        Self {
            count: 0,
            max_count,
            last_sync_at: None,
        }
    }

    /// Remaining allowance, clamped to `[0, max_count]`.
    pub fn remaining(&self) -> u32 {
        self.max_count.saturating_sub(self.count.min(self.max_count))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn view(&self) -> QuotaView {
        QuotaView::Limited {
            remaining: self.remaining(),
            max_count: self.max_count,
        }
    }
}

/// What a presenter shows, and what `quota-changed` carries.
///
/// Always the authoritative value, never a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum QuotaView {
    Limited { remaining: u32, max_count: u32 },
    Unlimited,
}

impl QuotaView {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Remaining allowance, `None` when there is no limit.
    pub fn remaining(&self) -> Option<u32> {
        match self {
            Self::Limited { remaining, .. } => Some(*remaining),
            Self::Unlimited => None,
        }
    }

    pub fn allows_action(&self) -> bool {
        match self {
            Self::Limited { remaining, .. } => *remaining > 0,
            Self::Unlimited => true,
        }
    }
}

impl std::fmt::Display for QuotaView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited {
                remaining,
                max_count,
            } => write!(f, "{} of {} free actions remaining", remaining, max_count),
            Self::Unlimited => write!(f, "Unlimited"),
        }
    }
}

/// Who the actor currently is, as far as quota is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated,
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
