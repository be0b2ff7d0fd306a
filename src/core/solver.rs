use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Reason why a solve call returned.
///
/// Only [`SolverStatus::Converged`] means that the requested tolerance was
/// reached. All other variants still come with the best iterate found and
/// fully populated statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// The stopping criterion was satisfied.
    Converged,
    /// Maximum number of iterations exceeded.
    MaxIterations,
    /// Time budget exceeded.
    MaxTime,
    /// The iterates stopped changing (inner solver) or the constraint
    /// violation stopped decreasing (outer solver).
    NoProgress,
    /// A problem evaluation produced a non-finite value or failed.
    NumericalError,
}

impl SolverStatus {
    /// Determines whether the status is [`SolverStatus::Converged`].
    pub fn is_converged(&self) -> bool {
        matches!(self, SolverStatus::Converged)
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::Converged => write!(f, "converged"),
            SolverStatus::MaxIterations => write!(f, "maximum number of iterations exceeded"),
            SolverStatus::MaxTime => write!(f, "time budget exceeded"),
            SolverStatus::NoProgress => write!(f, "no progress"),
            SolverStatus::NumericalError => write!(f, "numerical error"),
        }
    }
}

/// Error returned when a solver is misconfigured or called with vectors of
/// wrong dimensions. It is always raised before the first iteration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The length of a vector does not match the dimensions of the problem.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which vector has the wrong length.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// A parameter has an invalid value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// What is wrong with the value.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: &'static str) -> Self {
        ConfigError::InvalidParameter { name, reason }
    }

    pub(crate) fn check_dim(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(ConfigError::DimensionMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

/// Options of a single inner solve that change from one outer iteration to
/// the next.
#[derive(Debug, Clone, Copy)]
pub struct InnerSolveOptions<T> {
    /// Tolerance on the stopping criterion.
    pub tolerance: T,
    /// Time budget of this call. `None` uses the solver's own limit.
    pub max_time: Option<Duration>,
}
