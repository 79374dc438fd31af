//! Error types for the RSM cell.
//!
//! Every error here is a configuration or shape error raised before any state
//! is touched. Numeric degeneracy (flat potentials, empty memory) is handled
//! inside the algorithm and never surfaces as an error.

/// Errors raised by the RSM cell and its sub-layers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RsmError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown activation function: {0}")]
    UnknownActivation(String),

    #[error("Unknown boost strategy: {0}")]
    UnknownBoostStrategy(String),
}

impl RsmError {
    pub(crate) fn mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Returns `Ok(())` when `actual == expected`.
    pub(crate) fn check(what: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::mismatch(what, expected, actual))
        }
    }
}

pub type Result<T> = std::result::Result<T, RsmError>;
