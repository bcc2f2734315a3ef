use ifkit::OracleError;
use thiserror::Error;

use crate::result::TerminationReason;

/// Errors raised while configuring or running a rootfinder.
///
/// Everything except [`Error::Convergence`], [`Error::InfeasibleGuess`] and oracle
/// failures during evaluation is raised at construction time and leaves no instance
/// behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// No plugin of this name is registered in the family.
    #[error("unknown {family} plugin '{name}'")]
    UnknownPlugin { family: &'static str, name: String },

    /// Shapes of the unknown, residual, or Jacobian disagree.
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    /// The constraint vector is neither empty nor of length `n`.
    #[error("constraint vector has length {len}, expected 0 or {n}")]
    ConstraintLength { len: usize, n: usize },

    /// The Jacobian pattern cannot be made invertible by any numeric values.
    #[error("jacobian is structurally singular: structural rank {rank} < {n}")]
    StructuralSingularity { rank: usize, n: usize },

    /// The numeric solve did not reach the tolerance.
    #[error("rootfinder failed ({reason}) after {iterations} iterations, |r| = {residual_norm:e}")]
    Convergence {
        reason: TerminationReason,
        iterations: usize,
        residual_norm: f64,
    },

    /// An input/output index option is out of range.
    #[error("{what} index {index} out of range (have {len})")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// An option key is not recognized.
    #[error("unknown option '{name}'")]
    UnknownOption { name: String },

    /// An option value has the wrong type or an invalid value.
    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    /// Numeric factorization hit a zero pivot.
    #[error("matrix is numerically singular")]
    SingularMatrix,

    /// `solve` was called before `factorize`.
    #[error("linear solver used before factorization")]
    NotFactorized,

    /// The initial guess violates a sign constraint.
    #[error("initial guess violates the constraint on component {index}")]
    InfeasibleGuess { index: usize },

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Result alias for rootfinder operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
