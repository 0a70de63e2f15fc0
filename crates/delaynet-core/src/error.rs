//! Error types for chunkwise integration
//!
//! All failures surface synchronously from [`crate::runner::ChunkwiseRunner::run`].
//! Nothing is retried: chunk integration is deterministic given its inputs, so a
//! retry without a state change would reproduce the same failure.

use thiserror::Error;

/// Errors raised by the chunking controller and its collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// A configuration value is out of range (detected before the loop starts)
    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// The stepper failed or produced an invalid trajectory
    #[error("Integration failed in chunk {chunk} at t={elapsed_ms}ms: {reason}")]
    IntegrationFailure {
        /// Zero-based chunk index
        chunk: usize,
        /// Simulated time already finalized when the chunk started (ms)
        elapsed_ms: f64,
        /// Failure description
        reason: String,
    },

    /// A chunk returned too few samples to carry history forward
    #[error("Insufficient history in chunk {chunk}: got {got} samples, need at least {need}")]
    InsufficientHistory {
        /// Zero-based chunk index
        chunk: usize,
        /// Samples returned by the stepper
        got: usize,
        /// Minimum sample count (`delay horizon + 1`)
        need: usize,
    },

    /// A history window does not match the delay horizon
    #[error("History window width {actual} does not match delay horizon {expected}")]
    HistoryWidth {
        /// Delay horizon in steps
        expected: usize,
        /// Width found
        actual: usize,
    },
}

impl SimError {
    /// Shorthand for [`SimError::InvalidParameter`]
    pub fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors detected before any chunk was integrated
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidParameter { .. })
    }
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::IntegrationFailure {
            chunk: 3,
            elapsed_ms: 150.0,
            reason: "non-finite x".into(),
        };
        assert_eq!(
            err.to_string(),
            "Integration failed in chunk 3 at t=150ms: non-finite x"
        );

        let err = SimError::InsufficientHistory { chunk: 0, got: 2, need: 4 };
        assert!(err.to_string().contains("need at least 4"));
    }

    #[test]
    fn test_configuration_error_classification() {
        assert!(SimError::invalid("dt_ms", "must be positive").is_configuration_error());
        assert!(!SimError::HistoryWidth { expected: 2, actual: 1 }.is_configuration_error());
    }
}
