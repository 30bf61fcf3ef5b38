//! Partial and soft-thresholded SVD entry points.
//!
//! These wrap the Krylov solvers in [`crate::lanczos`] with the defaults used
//! throughout the matrix completion experiments: `k = None` asks for every
//! singular triplet (`min(m, n)`) and `kmax = None` allows a Krylov subspace of
//! [`KMAX_MULTIPLIER`]` · k` vectors.

use log::{debug, info};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::error::{LowRankError, Result};
use crate::factors::SvdTriplets;
use crate::lanczos::{bidiagonal_svd, normal_eigen_svd, KrylovSvd, LanczosOptions};
use crate::operator::{LinearOperator, SparseLowRankOp};

/// Default ratio between the Krylov subspace size and the number of triplets.
pub const KMAX_MULTIPLIER: usize = 15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvdSolver {
    /// Golub-Kahan-Lanczos bidiagonalization.
    #[default]
    Propack,
    /// Lanczos eigen-solver on `AᵀA`.
    Arpack,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvdConfig {
    /// Number of triplets; `None` for all of them.
    pub k: Option<usize>,
    /// Krylov subspace size; `None` for `KMAX_MULTIPLIER * k`.
    pub kmax: Option<usize>,
    pub solver: SvdSolver,
    pub lanczos: LanczosOptions,
}

impl SvdConfig {
    pub fn new() -> Self {
        debug!("Creating SvdConfig with default parameters");
        Self::default()
    }

    pub fn with_rank(mut self, k: usize) -> Self {
        info!("Setting number of singular triplets: {}", k);
        self.k = Some(k);
        self
    }

    pub fn with_kmax(mut self, kmax: usize) -> Self {
        info!("Setting Krylov subspace size: {}", kmax);
        self.kmax = Some(kmax);
        self
    }

    pub fn with_solver(mut self, solver: SvdSolver) -> Self {
        info!("Setting SVD solver: {:?}", solver);
        self.solver = solver;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        info!("Setting Lanczos tolerance: {:e}", tol);
        self.lanczos.tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        info!("Setting Lanczos seed: {}", seed);
        self.lanczos.seed = seed;
        self
    }

    /// Resolve `(k, kmax)` for an operator of the given shape.
    pub fn resolve(&self, shape: (usize, usize)) -> (usize, usize) {
        resolve_dims(shape, self.k, self.kmax)
    }

    /// Run the configured solver on `op`.
    pub fn decompose<O: LinearOperator + ?Sized>(&self, op: &O) -> Result<KrylovSvd> {
        let (k, kmax) = self.resolve(op.shape());
        match self.solver {
            SvdSolver::Propack => bidiagonal_svd(op, k, kmax, &self.lanczos),
            SvdSolver::Arpack => normal_eigen_svd(op, k, kmax, &self.lanczos),
        }
    }
}

fn resolve_dims(shape: (usize, usize), k: Option<usize>, kmax: Option<usize>) -> (usize, usize) {
    let k = k.unwrap_or_else(|| shape.0.min(shape.1));
    let kmax = kmax.unwrap_or(KMAX_MULTIPLIER * k);
    (k, kmax)
}

/// Largest `k` singular triplets of `op` by bidiagonalization.
pub fn svd_propack<O: LinearOperator + ?Sized>(
    op: &O,
    k: Option<usize>,
    kmax: Option<usize>,
) -> Result<SvdTriplets> {
    let (k, kmax) = resolve_dims(op.shape(), k, kmax);
    Ok(bidiagonal_svd(op, k, kmax, &LanczosOptions::default())?.triplets)
}

/// Largest `k` singular triplets of `op` through the eigenpairs of `AᵀA`.
pub fn svd_arpack<O: LinearOperator + ?Sized>(
    op: &O,
    k: Option<usize>,
    kmax: Option<usize>,
) -> Result<SvdTriplets> {
    let (k, kmax) = resolve_dims(op.shape(), k, kmax);
    Ok(normal_eigen_svd(op, k, kmax, &LanczosOptions::default())?.triplets)
}

/// Partial SVD of `X + U diag(s) Vᵀ` with `X` sparse, never forming the sum.
pub fn svd_sparse_low_rank(
    x: &CsMat<f64>,
    low_rank: &SvdTriplets,
    config: &SvdConfig,
) -> Result<SvdTriplets> {
    let op = SparseLowRankOp::new(x, low_rank)?;
    let out = config.decompose(&op)?;
    debug!(
        "Sparse + low-rank SVD: {} triplets after {} steps ({:?})",
        out.triplets.rank(),
        out.steps,
        out.info
    );
    Ok(out.triplets)
}

/// Input to [`svd_soft`].
#[derive(Clone, Copy, Debug)]
pub enum MatrixInput<'a> {
    Sparse(&'a CsMat<f64>),
    Dense(&'a DMatrix<f64>),
}

/// Dense thin SVD with singular values in decreasing order.
pub fn svd_dense(x: &DMatrix<f64>) -> Result<SvdTriplets> {
    let svd = x.clone().svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| LowRankError::Decomposition("dense SVD returned no U".to_string()))?;
    let v = svd
        .v_t
        .ok_or_else(|| LowRankError::Decomposition("dense SVD returned no Vᵀ".to_string()))?
        .transpose();
    Ok(SvdTriplets::new(u, svd.singular_values, v)?.sorted_descending())
}

/// SVD restricted to singular values `>= lambda`, which are then shrunk by
/// `lambda` and clipped at zero. Sparse input goes through the Krylov solver
/// with every triplet requested (`config.k` is ignored).
pub fn svd_soft(input: MatrixInput<'_>, lambda: f64, config: &SvdConfig) -> Result<SvdTriplets> {
    let full = match input {
        MatrixInput::Sparse(x) => {
            let config = SvdConfig {
                k: Some(x.rows().min(x.cols())),
                ..config.clone()
            };
            config.decompose(x)?.triplets
        }
        MatrixInput::Dense(x) => svd_dense(x)?,
    };

    let kept: Vec<usize> = full
        .descending_order()
        .into_iter()
        .filter(|&i| full.s[i] >= lambda)
        .collect();
    debug!(
        "Soft threshold {}: {} of {} singular values kept",
        lambda,
        kept.len(),
        full.rank()
    );
    Ok(full.select(&kept)?.soft_threshold(lambda))
}

/// SVD of `X + U diag(s) Vᵀ` with every singular value shrunk by `lambda` and
/// clipped at zero.
pub fn svd_soft2(
    x: &CsMat<f64>,
    low_rank: &SvdTriplets,
    lambda: f64,
    config: &SvdConfig,
) -> Result<SvdTriplets> {
    Ok(svd_sparse_low_rank(x, low_rank, config)?.soft_threshold(lambda))
}
