//! Domain error types and the shared error-kind taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid voice identity: {0}")]
    InvalidIdentity(String),

    #[error("Checkpoint is corrupted: {0}")]
    CorruptCheckpoint(String),

    #[error("Quality score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

/// Category of a voice failure.
///
/// Used both as the key of per-identity error histograms and to choose
/// the healing strategy when a voice turns critical: transient kinds
/// lead to retry tuning, structural kinds to a fallback switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    EmptyResponse,
    Protocol,
    CapabilityMissing,
    Connection,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::Protocol => "protocol",
            ErrorKind::CapabilityMissing => "capability_missing",
            ErrorKind::Connection => "connection",
            ErrorKind::Other => "other",
        }
    }

    /// Transient failures: the same request may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::EmptyResponse
        )
    }

    /// Structural failures: the endpoint does not speak the shape we
    /// expect, so retrying the same identity is pointless.
    pub fn is_structural(&self) -> bool {
        matches!(self, ErrorKind::Protocol | ErrorKind::CapabilityMissing)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancelled_check() {
        assert!(DomainError::Cancelled.is_cancelled());
        assert!(!DomainError::InvalidIdentity("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_error_kind_classification() {
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::EmptyResponse.is_transient());
        assert!(ErrorKind::CapabilityMissing.is_structural());
        assert!(!ErrorKind::Connection.is_transient());
        assert!(!ErrorKind::Connection.is_structural());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(ErrorKind::CapabilityMissing.to_string(), "capability_missing");
    }
}
