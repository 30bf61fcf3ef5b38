//! # lowrank
//!
//! Utilities for sparse low-rank matrices as they show up in matrix completion
//! experiments:
//!
//! - [`generate`]: random low-rank factors and sparse, noisy partial observations
//! - [`reconstruct`]: partial reconstruction of `U diag(s) Vᵀ` / `P Qᵀ` at chosen entries
//! - [`operator`]: matrix-free operators, including the implicit "sparse + low-rank" sum
//! - [`lanczos`]: Krylov solvers for the leading singular triplets
//! - [`svd`]: partial and soft-thresholded SVD entry points
//! - [`center`]: row/column centering of the stored entries of a sparse matrix
//! - [`sparse`]: sampling, pruning and shared CSC packing for parallel workers
//!
//! Sparse storage is `sprs::CsMat<f64>`; dense factors are `nalgebra` matrices.

pub mod center;
pub mod error;
pub mod factors;
pub mod generate;
pub mod lanczos;
pub mod operator;
pub mod reconstruct;
pub mod sparse;
pub mod svd;

pub use error::{LowRankError, Result};
pub use factors::SvdTriplets;
pub use svd::{SvdConfig, SvdSolver, KMAX_MULTIPLIER};

#[cfg(test)]
mod tests;
