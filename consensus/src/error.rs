//! Error taxonomy for submission evaluation.
//!
//! | Error                           | Scope       | Retriable |
//! |---------------------------------|-------------|-----------|
//! | `Validation`                    | submission  | no        |
//! | `NoAgentsAvailable`             | submission  | yes       |
//! | `AggregationInvariantViolation` | submission  | no (bug)  |
//! | `InvalidScoreVector`            | single agent| no        |
//! | `Cancelled`                     | submission  | yes       |
//! | `Store`                         | submission  | yes       |
//! | `InvalidConfiguration`          | engine      | no        |
//!
//! Errors are `Clone` because the result cache hands the same failure to every
//! caller waiting on one in-flight computation.

use thiserror::Error;

use crate::criteria::Criterion;
use crate::score::AgentId;

/// A raw submission failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    /// Offending field of the raw record
    pub field: String,
    /// Human-readable explanation
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Submission-level evaluation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("No agents available for submission {submission_id}: all {attempted} dispatched agents failed")]
    NoAgentsAvailable {
        submission_id: String,
        attempted: usize,
    },

    #[error("Aggregation invariant violated for {criterion}: composite {composite} outside observed range [{min}, {max}]")]
    AggregationInvariantViolation {
        criterion: Criterion,
        composite: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid score vector from {agent}: {reason}")]
    InvalidScoreVector { agent: AgentId, reason: String },

    #[error("Evaluation of submission {submission_id} was cancelled")]
    Cancelled { submission_id: String },

    #[error("Decision store error: {0}")]
    Store(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfiguration(String),
}

impl ConsensusError {
    /// Machine-readable code for callers that branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NoAgentsAvailable { .. } => "NO_AGENTS_AVAILABLE",
            Self::AggregationInvariantViolation { .. } => "AGGREGATION_INVARIANT",
            Self::InvalidScoreVector { .. } => "INVALID_SCORE_VECTOR",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Store(_) => "STORE",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
        }
    }

    /// Whether a later attempt for the same submission may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NoAgentsAvailable { .. } | Self::Cancelled { .. } | Self::Store(_)
        )
    }
}

/// Result type for evaluation operations
pub type JuryResult<T> = Result<T, ConsensusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("title", "must not be empty");
        assert_eq!(err.to_string(), "invalid title: must not be empty");
        let wrapped: ConsensusError = err.into();
        assert_eq!(wrapped.code(), "VALIDATION");
        assert!(!wrapped.is_retriable());
    }

    #[test]
    fn test_no_agents_is_retriable() {
        let err = ConsensusError::NoAgentsAvailable {
            submission_id: "s1".into(),
            attempted: 4,
        };
        assert!(err.is_retriable());
        assert!(err.to_string().contains("all 4 dispatched agents failed"));
    }

    #[test]
    fn test_invariant_violation_is_terminal() {
        let err = ConsensusError::AggregationInvariantViolation {
            criterion: Criterion::Craft,
            composite: 101.0,
            min: 40.0,
            max: 60.0,
        };
        assert!(!err.is_retriable());
        assert_eq!(err.code(), "AGGREGATION_INVARIANT");
    }

    #[test]
    fn test_invalid_configuration_is_terminal() {
        let err = ConsensusError::InvalidConfiguration("weight 0 outside (0, 1]".into());
        assert!(!err.is_retriable());
        assert_eq!(err.code(), "INVALID_CONFIGURATION");
    }
}
