//! Error types for remote quota and collection calls.

use std::fmt::{Display, Formatter};

/// Errors from a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network unreachable, timeout, or a server fault. Never fatal.
    Transport { message: String },
    /// The server refused the action (quota exhausted, membership conflict).
    Rejected { reason: String },
    /// The response could not be understood.
    Parse { message: String },
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// True for authoritative refusals, which call for a forced reconcile.
    pub fn is_authoritative_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { message } => write!(f, "transport failure: {}", message),
            Self::Rejected { reason } => write!(f, "rejected: {}", reason),
            Self::Parse { message } => write!(f, "unreadable response: {}", message),
        }
    }
}

impl std::error::Error for RemoteError {}

#[cfg(test)]
#[path = "tests/errors_tests.rs"]
mod tests;
