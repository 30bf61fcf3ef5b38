use thiserror::Error;

/// Errors raised by the guard clauses of the library.
#[derive(Debug, Error)]
pub enum LowRankError {
    /// Two inputs that must agree in size do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An index falls outside the matrix it addresses.
    #[error("index {index} out of range for bound {bound}")]
    IndexOutOfRange { index: usize, bound: usize },

    /// Requested number of singular triplets is not achievable.
    #[error("invalid rank {k} for a {rows}x{cols} matrix")]
    InvalidRank { k: usize, rows: usize, cols: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A dense factorization failed to produce the requested factors.
    #[error("decomposition failed: {0}")]
    Decomposition(String),
}

pub type Result<T> = std::result::Result<T, LowRankError>;
