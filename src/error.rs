use thiserror::Error;

/// Errors raised by an [`Oracle`](crate::Oracle) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// An input or output index is out of range.
    #[error("{what} index {index} out of range (have {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A buffer has the wrong length.
    #[error("{what}: expected length {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    /// Two inputs or two outputs share a name.
    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    /// The oracle does not provide this capability.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// Result alias for oracle calls.
pub type Result<T, E = OracleError> = std::result::Result<T, E>;
