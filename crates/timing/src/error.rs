//! Error types for timing evaluation.

use thiserror::Error;

use crate::tree::NodeId;

/// Errors that can occur while validating, resolving, or sampling timing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimingError {
    #[error("Invalid timing: {reason}")]
    InvalidTiming { reason: String },

    #[error("Key times cannot be resolved before the total duration is known")]
    UnresolvedDuration,

    #[error("Slip propagation into {node} did not converge within {passes} passes")]
    InconsistentSlip { node: NodeId, passes: u32 },

    #[error("Unknown timing node: {0}")]
    UnknownNode(NodeId),

    #[error("Easing curve not registered: {0}")]
    UnknownCurve(String),
}

impl TimingError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidTiming {
            reason: reason.into(),
        }
    }
}

/// Convenience Result type for timing operations.
pub type TimingResult<T> = Result<T, TimingError>;
