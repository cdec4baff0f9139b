// 🚨 Error taxonomy for the integration pipeline
//
// Only InvalidFormat and the internal-fault variants ever reach a caller.
// UpstreamUnavailable lives inside the providers and is always absorbed
// by the synthetic fallback.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// PIPELINE ERRORS (visible to callers)
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    /// User input error - never retried, never reaches a provider
    #[error("invalid MST format {input:?}: {reason}")]
    InvalidFormat { input: String, reason: String },

    /// A generated or reconciled record broke its consistency invariant
    #[error("referential integrity violation in {dataset}: {record_id} references unknown employee {employee_id}")]
    ReferentialIntegrityViolation {
        dataset: String,
        record_id: String,
        employee_id: String,
    },

    /// The static field-mapping table failed validation
    #[error("field mapping table is corrupt: {0}")]
    MappingTableCorrupt(String),

    /// A pipeline worker panicked; reported for that identifier only
    #[error("internal fault: {0}")]
    Internal(String),
}

impl IntegrationError {
    pub fn invalid_format(input: &str, reason: impl Into<String>) -> Self {
        IntegrationError::InvalidFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self, IntegrationError::InvalidFormat { .. })
    }

    /// Process exit code for this failure (see `exit_codes`)
    pub fn exit_code(&self) -> u8 {
        if self.is_user_error() {
            exit_codes::EXIT_INVALID_INPUT
        } else {
            exit_codes::EXIT_INTERNAL_FAULT
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IntegrationError::InvalidFormat { .. } => "invalid_format",
            IntegrationError::ReferentialIntegrityViolation { .. } => {
                "referential_integrity_violation"
            }
            IntegrationError::MappingTableCorrupt(_) => "mapping_table_corrupt",
            IntegrationError::Internal(_) => "internal",
        }
    }
}

// ============================================================================
// UPSTREAM ERRORS (internal to providers)
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamUnavailable {
    #[error("live access disabled")]
    Disabled,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("incomplete payload: {0}")]
    Incomplete(String),
}

impl UpstreamUnavailable {
    /// Network trouble, throttling and server errors are worth another try.
    /// Everything else fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamUnavailable::Timeout(_) | UpstreamUnavailable::Transport(_) => true,
            UpstreamUnavailable::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// PERSISTENCE WARNINGS
// ============================================================================

/// A persistence failure. Attached to the outcome, never fails the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceWarning {
    pub sink: String,
    pub message: String,
}

impl std::fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.sink, self.message)
    }
}

// ============================================================================
// EXIT CODES
// ============================================================================

pub mod exit_codes {
    /// Every identifier processed, possibly degraded to synthetic data
    pub const EXIT_SUCCESS: u8 = 0;

    /// At least one identifier failed InvalidFormat
    pub const EXIT_INVALID_INPUT: u8 = 1;

    /// Unrecoverable internal fault (mapping table, integrity, config)
    pub const EXIT_INTERNAL_FAULT: u8 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(UpstreamUnavailable::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(UpstreamUnavailable::Transport("reset".into()).is_retryable());
        assert!(UpstreamUnavailable::Status(503).is_retryable());
        assert!(UpstreamUnavailable::Status(429).is_retryable());

        assert!(!UpstreamUnavailable::Status(404).is_retryable());
        assert!(!UpstreamUnavailable::Disabled.is_retryable());
        assert!(!UpstreamUnavailable::Incomplete("name".into()).is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        let invalid = IntegrationError::invalid_format("12", "too short");
        assert!(invalid.is_user_error());
        assert_eq!(invalid.exit_code(), exit_codes::EXIT_INVALID_INPUT);

        let corrupt = IntegrationError::MappingTableCorrupt("dup".into());
        assert!(!corrupt.is_user_error());
        assert_eq!(corrupt.exit_code(), exit_codes::EXIT_INTERNAL_FAULT);
    }
}
