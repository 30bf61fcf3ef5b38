//! # Krylov solvers for leading singular triplets
//!
//! Two matrix-free solvers, both driven only through [`LinearOperator`] products:
//!
//! 1. **Golub-Kahan-Lanczos bidiagonalization** ([`bidiagonal_svd`]), the scheme
//!    PROPACK implements. Starting from a random unit vector `v₁` it builds
//!    orthonormal bases `U_j`, `V_j` and an upper bidiagonal `B_j` with
//!    `A V_j = U_j B_j` and `Aᵀ U_j = V_j B_jᵀ + β_j v_{j+1} e_jᵀ`.
//!    The SVD `B_j = P Σ Qᵀ` gives Ritz triplets `(U_j P, Σ, V_j Q)` whose residual
//!    norm is `|β_j · P[j, i]|`.
//! 2. **Lanczos on the normal operator** ([`normal_eigen_svd`]), the ARPACK route:
//!    eigen-decompose the tridiagonal projection of `AᵀA`, take square roots of
//!    the eigenvalues and recover the left vectors as `U = A V / s`.
//!
//! Both keep the bases fully reorthogonalized (two passes of classical
//! Gram-Schmidt), which is affordable for the subspace sizes matrix completion
//! uses and keeps spurious copies of converged values away.
//!
//! A breakdown (`α` or `β` numerically zero) means an invariant subspace was hit.
//! The iteration then continues from a fresh random vector orthogonal to the
//! current basis with the coupling coefficient set to zero, so rank-deficient
//! operators still return the requested number of triplets (the trailing ones
//! with zero singular values) and the remaining copies of a repeated singular
//! value are picked up. A breakdown counts as convergence only once the basis
//! spans the whole space.

use log::{debug, info, trace, warn};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{LowRankError, Result};
use crate::factors::SvdTriplets;
use crate::operator::{LinearOperator, NormalOp, Transposed};

/// Relative size below which a Lanczos coefficient counts as a breakdown.
const BREAKDOWN_TOL: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanczosOptions {
    /// Relative residual tolerance for accepting a Ritz triplet.
    pub tol: f64,
    /// Seed for the random start (and restart) vectors.
    pub seed: u64,
}

impl Default for LanczosOptions {
    fn default() -> Self {
        Self {
            tol: 1e-10,
            seed: 42,
        }
    }
}

/// How a Krylov run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KrylovInfo {
    Converged,
    /// An invariant subspace of this dimension was found; the triplets it
    /// supports are exact.
    InvariantSubspace(usize),
    /// The leading triplets did not reach the tolerance within `kmax` steps.
    NotConverged,
}

impl KrylovInfo {
    /// PROPACK-style status code: `0`, the subspace dimension, or `-1`.
    pub fn code(&self) -> i64 {
        match self {
            KrylovInfo::Converged => 0,
            KrylovInfo::InvariantSubspace(d) => *d as i64,
            KrylovInfo::NotConverged => -1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KrylovSvd {
    /// Leading triplets, singular values in decreasing order.
    pub triplets: SvdTriplets,
    pub info: KrylovInfo,
    /// Dimension of the Krylov subspace that was built.
    pub steps: usize,
}

/// Orthonormal basis stored as a list of columns.
struct Basis {
    dim: usize,
    cols: Vec<Vec<f64>>,
}

impl Basis {
    fn new(dim: usize) -> Self {
        Self { dim, cols: Vec::new() }
    }

    fn len(&self) -> usize {
        self.cols.len()
    }

    /// Two passes of classical Gram-Schmidt against every stored column.
    fn orthogonalize(&self, w: &mut [f64]) {
        for _ in 0..2 {
            for q in &self.cols {
                let c = dot(q, w);
                axpy(-c, q, w);
            }
        }
    }

    /// A random unit vector orthogonal to the basis, or `None` once the basis
    /// spans the whole space.
    fn fresh_vector(&self, rng: &mut ChaCha8Rng) -> Option<Vec<f64>> {
        if self.len() >= self.dim {
            return None;
        }
        for _ in 0..3 {
            let mut w: Vec<f64> = (0..self.dim).map(|_| -> f64 { StandardNormal.sample(&mut *rng) }).collect();
            let before = norm(&w);
            self.orthogonalize(&mut w);
            let after = norm(&w);
            if after > BREAKDOWN_TOL * before.max(1.0) {
                scale(&mut w, 1.0 / after);
                return Some(w);
            }
        }
        None
    }

    fn push(&mut self, q: Vec<f64>) {
        debug_assert_eq!(q.len(), self.dim);
        self.cols.push(q);
    }

    fn to_matrix(&self, ncols: usize) -> DMatrix<f64> {
        DMatrix::from_fn(self.dim, ncols, |i, j| self.cols[j][i])
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    y.iter_mut().zip(x).for_each(|(yi, xi)| *yi += alpha * xi);
}

#[inline]
fn scale(x: &mut [f64], alpha: f64) {
    x.iter_mut().for_each(|xi| *xi *= alpha);
}

/// Validate `k` and derive the largest Krylov dimension allowed.
fn krylov_bounds(shape: (usize, usize), k: usize, kmax: usize, space: usize) -> Result<usize> {
    let (m, n) = shape;
    if k == 0 || k > m.min(n) {
        return Err(LowRankError::InvalidRank { k, rows: m, cols: n });
    }
    Ok(kmax.max(k).min(space))
}

/// Whether the convergence test should run at this subspace dimension.
fn should_check(dim: usize, k: usize, max_dim: usize) -> bool {
    let every = (k / 2).max(1);
    dim == max_dim || (dim >= k && (dim - k) % every == 0)
}

/// Leading `k` singular triplets of `op` by Golub-Kahan-Lanczos
/// bidiagonalization with at most `kmax` Krylov vectors.
///
/// Wide operators are bidiagonalized through their transpose so the right
/// basis always lives in the smaller space.
pub fn bidiagonal_svd<O: LinearOperator + ?Sized>(
    op: &O,
    k: usize,
    kmax: usize,
    opts: &LanczosOptions,
) -> Result<KrylovSvd> {
    let (m, n) = op.shape();
    if m < n {
        debug!("Wide {}x{} operator: bidiagonalizing the transpose", m, n);
        let mut out = golub_kahan(&Transposed::new(op), k, kmax, opts)?;
        let SvdTriplets { u, s, v } = out.triplets;
        out.triplets = SvdTriplets::new(v, s, u)?;
        return Ok(out);
    }
    golub_kahan(op, k, kmax, opts)
}

fn golub_kahan<O: LinearOperator + ?Sized>(
    op: &O,
    k: usize,
    kmax: usize,
    opts: &LanczosOptions,
) -> Result<KrylovSvd> {
    let (m, n) = op.shape();
    let max_dim = krylov_bounds((m, n), k, kmax, n)?;
    info!(
        "Lanczos bidiagonalization of {}x{} operator: k={}, max dimension={}",
        m, n, k, max_dim
    );

    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let mut us = Basis::new(m);
    let mut vs = Basis::new(n);
    let mut alphas: Vec<f64> = Vec::with_capacity(max_dim);
    let mut betas: Vec<f64> = Vec::with_capacity(max_dim);
    let mut invariant: Option<usize> = None;

    let mut v = vs
        .fresh_vector(&mut rng)
        .ok_or_else(|| LowRankError::Decomposition("operator has no columns".to_string()))?;
    let mut ritz: Option<(DMatrix<f64>, DVector<f64>, DMatrix<f64>, bool)> = None;

    for j in 0..max_dim {
        // u_j = A v_j - β_{j-1} u_{j-1}
        let mut u = op.matvec(&v);
        let scale_ref = norm(&u).max(f64::MIN_POSITIVE);
        if let (Some(prev), Some(&beta)) = (us.cols.last(), betas.last()) {
            axpy(-beta, prev, &mut u);
        }
        us.orthogonalize(&mut u);
        let mut alpha = norm(&u);
        if alpha <= BREAKDOWN_TOL * scale_ref.max(1.0) {
            trace!("Alpha breakdown at step {}", j);
            match us.fresh_vector(&mut rng) {
                Some(fresh) => {
                    u = fresh;
                    alpha = 0.0;
                }
                None => break,
            }
        } else {
            scale(&mut u, 1.0 / alpha);
        }
        vs.push(v);
        us.push(u);
        alphas.push(alpha);

        // v_{j+1} = Aᵀ u_j - α_j v_j
        let mut w = op.rmatvec(&us.cols[j]);
        let w_ref = norm(&w).max(f64::MIN_POSITIVE);
        axpy(-alpha, &vs.cols[j], &mut w);
        vs.orthogonalize(&mut w);
        let beta = norm(&w);
        let dim = j + 1;

        let broke_down = beta <= BREAKDOWN_TOL * w_ref.max(1.0);
        if broke_down {
            if invariant.is_none() && dim < n {
                debug!("An invariant subspace of dimension {} was found.", dim);
                invariant = Some(dim);
            }
            betas.push(0.0);
        } else {
            scale(&mut w, 1.0 / beta);
            betas.push(beta);
        }
        trace!("Step {}: alpha={:.6e}, beta={:.6e}", dim, alpha, betas[j]);

        if should_check(dim, k, max_dim) {
            let (p, sigma, q) = bidiagonal_factors(&alphas, &betas)?;
            let converged = ritz_converged(&p, &sigma, betas[j], k, n, opts.tol);
            debug!("Dimension {}: leading {} triplets converged = {}", dim, k, converged);
            ritz = Some((p, sigma, q, converged));
            if converged {
                break;
            }
        } else {
            ritz = None;
        }

        if dim == max_dim {
            break;
        }
        v = if broke_down {
            match vs.fresh_vector(&mut rng) {
                Some(fresh) => fresh,
                None => break,
            }
        } else {
            w
        };
    }

    let dim = alphas.len();
    if dim == 0 {
        return Err(LowRankError::Decomposition(
            "Lanczos bidiagonalization produced no vectors".to_string(),
        ));
    }
    let (p, sigma, q, converged) = match ritz {
        Some(r) => r,
        None => {
            let (p, sigma, q) = bidiagonal_factors(&alphas, &betas)?;
            let converged = ritz_converged(&p, &sigma, betas[dim - 1], k, n, opts.tol);
            (p, sigma, q, converged)
        }
    };

    let keep = k.min(dim);
    let order = descending(&sigma);
    let top: Vec<usize> = order[..keep].to_vec();
    let u = us.to_matrix(dim) * p.select_columns(top.iter());
    let v = vs.to_matrix(dim) * q.select_columns(top.iter());
    let s = DVector::from_iterator(keep, top.iter().map(|&i| sigma[i]));
    let triplets = SvdTriplets::new(u, s, v)?;

    let info = if !converged {
        warn!(
            "{} singular triplets did not converge within {} iterations",
            k, kmax
        );
        KrylovInfo::NotConverged
    } else if let Some(d) = invariant {
        KrylovInfo::InvariantSubspace(d)
    } else {
        KrylovInfo::Converged
    };

    Ok(KrylovSvd {
        triplets,
        info,
        steps: dim,
    })
}

/// SVD of the upper bidiagonal matrix with `alphas` on the diagonal and
/// `betas[..len-1]` above it: returns `(P, σ, Q)` with `B = P diag(σ) Qᵀ`.
fn bidiagonal_factors(
    alphas: &[f64],
    betas: &[f64],
) -> Result<(DMatrix<f64>, DVector<f64>, DMatrix<f64>)> {
    let d = alphas.len();
    let b = DMatrix::from_fn(d, d, |i, j| {
        if i == j {
            alphas[i]
        } else if j == i + 1 {
            betas[i]
        } else {
            0.0
        }
    });
    let svd = b.svd(true, true);
    let p = svd
        .u
        .ok_or_else(|| LowRankError::Decomposition("missing left factors of B".to_string()))?;
    let q = svd
        .v_t
        .ok_or_else(|| LowRankError::Decomposition("missing right factors of B".to_string()))?
        .transpose();
    Ok((p, svd.singular_values, q))
}

fn descending(values: &DVector<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
    order
}

/// Residual test `|β · P[last, i]| <= tol · σ_max` on the leading `k` Ritz values.
///
/// A breakdown (`β == 0`) only certifies them once the basis spans all `space`
/// dimensions: an invariant subspace reached from a single start vector holds one
/// copy of each repeated singular value.
fn ritz_converged(
    p: &DMatrix<f64>,
    sigma: &DVector<f64>,
    beta: f64,
    k: usize,
    space: usize,
    tol: f64,
) -> bool {
    let d = sigma.len();
    if beta == 0.0 {
        return d >= space;
    }
    if d < k {
        return false;
    }
    let sigma_max = sigma.iter().cloned().fold(0.0, f64::max);
    descending(sigma)
        .into_iter()
        .take(k)
        .all(|i| (beta * p[(d - 1, i)]).abs() <= tol * sigma_max)
}

/// Leading `k` singular triplets of `op` from the eigenpairs of `AᵀA`, using a
/// Lanczos basis of at most `kmax` vectors.
pub fn normal_eigen_svd<O: LinearOperator + ?Sized>(
    op: &O,
    k: usize,
    kmax: usize,
    opts: &LanczosOptions,
) -> Result<KrylovSvd> {
    let (m, n) = op.shape();
    let ncv = krylov_bounds((m, n), k, kmax, n)?;
    info!(
        "Lanczos on the normal operator of a {}x{} operator: k={}, ncv={}",
        m, n, k, ncv
    );

    let normal = NormalOp::new(op);
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let mut qs = Basis::new(n);
    let mut alphas: Vec<f64> = Vec::with_capacity(ncv);
    let mut betas: Vec<f64> = Vec::with_capacity(ncv);
    let mut invariant: Option<usize> = None;
    let mut converged = false;

    let mut q = qs
        .fresh_vector(&mut rng)
        .ok_or_else(|| LowRankError::Decomposition("operator has no columns".to_string()))?;

    for j in 0..ncv {
        let mut w = normal.matvec(&q);
        let w_ref = norm(&w).max(f64::MIN_POSITIVE);
        let alpha = dot(&q, &w);
        axpy(-alpha, &q, &mut w);
        if let (Some(prev), Some(&beta)) = (qs.cols.last(), betas.last()) {
            axpy(-beta, prev, &mut w);
        }
        qs.push(q);
        qs.orthogonalize(&mut w);
        alphas.push(alpha);

        let beta = norm(&w);
        let dim = j + 1;
        let broke_down = beta <= BREAKDOWN_TOL * w_ref.max(1.0);
        betas.push(if broke_down { 0.0 } else { beta });
        if broke_down && invariant.is_none() && dim < n {
            debug!("An invariant subspace of dimension {} was found.", dim);
            invariant = Some(dim);
        }
        trace!("Step {}: alpha={:.6e}, beta={:.6e}", dim, alpha, betas[j]);

        if should_check(dim, k, ncv) {
            let (evals, evecs) = tridiagonal_eigen(&alphas, &betas);
            converged = eigen_converged(&evals, &evecs, betas[j], k, n, opts.tol);
            debug!("Dimension {}: leading {} eigenpairs converged = {}", dim, k, converged);
            if converged {
                break;
            }
        }
        if dim == ncv {
            break;
        }
        q = if broke_down {
            match qs.fresh_vector(&mut rng) {
                Some(fresh) => fresh,
                None => break,
            }
        } else {
            scale(&mut w, 1.0 / beta);
            w
        };
    }

    let dim = alphas.len();
    let (evals, evecs) = tridiagonal_eigen(&alphas, &betas);
    if !converged {
        converged = eigen_converged(&evals, &evecs, betas[dim - 1], k, n, opts.tol);
    }

    let keep = k.min(dim);
    let order = descending(&evals);
    let top: Vec<usize> = order[..keep].to_vec();
    let v = qs.to_matrix(dim) * evecs.select_columns(top.iter());
    let s = DVector::from_iterator(keep, top.iter().map(|&i| evals[i].max(0.0).sqrt()));

    let mut u = op.matmat(&v);
    let s_max = s.iter().cloned().fold(0.0, f64::max);
    for (j, mut col) in u.column_iter_mut().enumerate() {
        if s[j] > BREAKDOWN_TOL * s_max.max(f64::MIN_POSITIVE) {
            col /= s[j];
        } else {
            col.fill(0.0);
        }
    }
    let triplets = SvdTriplets::new(u, s, v)?.sorted_descending();

    let info = if !converged {
        warn!(
            "{} singular triplets did not converge within {} iterations",
            k, kmax
        );
        KrylovInfo::NotConverged
    } else if let Some(d) = invariant {
        KrylovInfo::InvariantSubspace(d)
    } else {
        KrylovInfo::Converged
    };

    Ok(KrylovSvd {
        triplets,
        info,
        steps: dim,
    })
}

/// Eigen-decomposition of the symmetric tridiagonal matrix with `alphas` on the
/// diagonal and `betas[..len-1]` beside it.
fn tridiagonal_eigen(alphas: &[f64], betas: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
    let d = alphas.len();
    let t = DMatrix::from_fn(d, d, |i, j| {
        if i == j {
            alphas[i]
        } else if j == i + 1 {
            betas[i]
        } else if i == j + 1 {
            betas[j]
        } else {
            0.0
        }
    });
    let eig = SymmetricEigen::new(t);
    (eig.eigenvalues, eig.eigenvectors)
}

/// Same acceptance rule as [`ritz_converged`], on the eigenpairs of `T`.
fn eigen_converged(
    evals: &DVector<f64>,
    evecs: &DMatrix<f64>,
    beta: f64,
    k: usize,
    space: usize,
    tol: f64,
) -> bool {
    let d = evals.len();
    if beta == 0.0 {
        return d >= space;
    }
    if d < k {
        return false;
    }
    let lambda_max = evals.iter().cloned().fold(0.0, f64::max);
    descending(evals)
        .into_iter()
        .take(k)
        .all(|i| (beta * evecs[(d - 1, i)]).abs() <= tol * lambda_max)
}
