//! # Random low-rank test matrices
//!
//! Two generative models for matrix completion experiments:
//!
//! - [`generate_low_rank`] / [`generate_sparse_low_rank`]: orthonormal factors from
//!   the QR decomposition of uniform random matrices with uniform singular values,
//!   optionally scaled so the full matrix stays within `[-1, 1]`, observed at random
//!   entries with additive Gaussian noise.
//! - [`generate_sparse_low_rank2`]: the Gaussian model of Mazumder, Hastie and
//!   Tibshirani (2010), `Z = U Vᵀ + E`, with the noise level set by a signal to
//!   noise ratio.
//!
//! [`LowRankGenerator`] bundles the parameters with a seeded `ChaCha8Rng` so an
//! experiment can be replayed exactly.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use sprs::CsMat;

use crate::error::{LowRankError, Result};
use crate::factors::SvdTriplets;
use crate::reconstruct::{
    flat_len, partial_reconstruct_pq, reconstruct_low_rank, sample_flat_indices, unravel_index,
    Observed,
};

/// Rows sampled from each factor when estimating the normalising scale.
pub const DEFAULT_SAMPLE_VALS: usize = 500;

fn uniform_matrix<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.random::<f64>())
}

fn gaussian_matrix<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| StandardNormal.sample(&mut *rng))
}

fn distinct_rows<R: Rng + ?Sized>(rng: &mut R, n: usize, draws: usize) -> Vec<usize> {
    let mut rows: Vec<usize> = (0..draws).map(|_| rng.random_range(0..n)).collect();
    rows.sort_unstable();
    rows.dedup();
    rows
}

/// Random singular triplets of an `n × m` matrix of rank `min(n, m, r)`.
///
/// With `normalise`, `s` is scaled by `1 / max(|min X|, max X)` where `X` is the
/// product restricted to `sample_vals` randomly drawn rows of each factor, so the
/// entries of the full matrix lie (approximately) within `[-1, 1]`.
pub fn generate_low_rank<R: Rng + ?Sized>(
    shape: (usize, usize),
    r: usize,
    sample_vals: usize,
    normalise: bool,
    rng: &mut R,
) -> Result<SvdTriplets> {
    let (n, m) = shape;
    let r = n.min(m).min(r);
    if r == 0 {
        return Err(LowRankError::InvalidRank { k: r, rows: n, cols: m });
    }
    debug!("Generating rank-{} factors for a {}x{} matrix", r, n, m);

    let u = uniform_matrix(rng, n, r).qr().q();
    let v = uniform_matrix(rng, m, r).qr().q();

    let s = if normalise {
        let rows_u = distinct_rows(rng, n, sample_vals);
        let rows_v = distinct_rows(rng, m, sample_vals);
        let x = u.select_rows(rows_u.iter()) * v.select_rows(rows_v.iter()).transpose();
        let spread = x.min().abs().max(x.max());
        let scaling = if spread > 0.0 { 1.0 / spread } else { 1.0 };
        debug!("Normalising singular values by {:.6}", scaling);
        DVector::from_fn(r, |_, _| rng.random::<f64>() * scaling)
    } else {
        DVector::from_fn(r, |_, _| rng.random::<f64>())
    };

    SvdTriplets::new(u, s, v)
}

/// A sparse observation of a low-rank matrix together with the factors it
/// was drawn from.
#[derive(Clone, Debug)]
pub struct SparseLowRank {
    pub matrix: CsMat<f64>,
    pub factors: SvdTriplets,
}

fn add_noise<R: Rng + ?Sized>(x: &mut CsMat<f64>, scale: f64, rng: &mut R) {
    if scale == 0.0 {
        return;
    }
    for v in x.data_mut() {
        let e: f64 = StandardNormal.sample(&mut *rng);
        *v += e * scale;
    }
}

/// Rank-`r` matrix observed at (up to) `k` random entries, each perturbed by
/// `N(0, 1) * noise`.
pub fn generate_sparse_low_rank<R: Rng + ?Sized>(
    shape: (usize, usize),
    r: usize,
    k: usize,
    noise: f64,
    rng: &mut R,
) -> Result<SparseLowRank> {
    let factors = generate_low_rank(shape, r, DEFAULT_SAMPLE_VALS, true, rng)?;
    let mut matrix = reconstruct_low_rank(&factors, &Observed::Count(k), rng)?;
    add_noise(&mut matrix, noise, rng);
    info!(
        "Generated sparse low-rank matrix {:?}: rank {}, {} observed entries, noise {}",
        shape,
        factors.rank(),
        matrix.nnz(),
        noise
    );
    Ok(SparseLowRank { matrix, factors })
}

/// Sample of the Mazumder et al. model: the observed matrix and its Gaussian
/// factors (`s` is implicitly all ones).
#[derive(Clone, Debug)]
pub struct MazumderSample {
    pub matrix: CsMat<f64>,
    pub u: DMatrix<f64>,
    pub v: DMatrix<f64>,
}

/// `Z = U Vᵀ + E` with Gaussian `U` (`m × r`), `V` (`n × r`) and `E`, observed at
/// (up to) `k` random entries. The noise is scaled by `r / snr²`.
pub fn generate_sparse_low_rank2<R: Rng + ?Sized>(
    shape: (usize, usize),
    r: usize,
    k: usize,
    snr: f64,
    rng: &mut R,
) -> Result<MazumderSample> {
    if snr <= 0.0 {
        return Err(LowRankError::InvalidArgument(format!(
            "signal to noise ratio must be positive, got {}",
            snr
        )));
    }
    let (m, n) = shape;
    let entries = flat_len(shape)?;
    let u = gaussian_matrix(rng, m, r);
    let v = gaussian_matrix(rng, n, r);

    let inds = sample_flat_indices(rng, entries, k);
    let (rows, cols) = unravel_index(&inds, shape)?;
    let mut matrix = partial_reconstruct_pq(&rows, &cols, &u, &v)?;

    let noise = r as f64 / (snr * snr);
    add_noise(&mut matrix, noise, rng);
    info!(
        "Generated Mazumder sample {:?}: rank {}, {} observed entries, snr {} (noise {})",
        shape,
        r,
        matrix.nnz(),
        snr,
        noise
    );
    Ok(MazumderSample { matrix, u, v })
}

/// Seeded, reusable configuration for the generators above.
#[derive(Clone, Debug)]
pub struct LowRankGenerator {
    shape: (usize, usize),
    rank: usize,
    sample_vals: usize,
    normalise: bool,
    noise: f64,
    rng: ChaCha8Rng,
}

impl LowRankGenerator {
    pub fn new(shape: (usize, usize)) -> Self {
        info!("Initializing LowRankGenerator for shape {:?}", shape);
        Self {
            shape,
            rank: 10,
            sample_vals: DEFAULT_SAMPLE_VALS,
            normalise: true,
            noise: 0.0,
            rng: ChaCha8Rng::seed_from_u64(rand::random()),
        }
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        debug!("Generator rank: {}", rank);
        self.rank = rank;
        self
    }

    pub fn with_sample_vals(mut self, sample_vals: usize) -> Self {
        debug!("Generator normalisation sample size: {}", sample_vals);
        self.sample_vals = sample_vals;
        self
    }

    pub fn with_normalise(mut self, normalise: bool) -> Self {
        debug!("Generator normalisation: {}", normalise);
        self.normalise = normalise;
        self
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        debug!("Generator noise level: {}", noise);
        self.noise = noise;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        debug!("Generator seed: {}", seed);
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn low_rank(&mut self) -> Result<SvdTriplets> {
        generate_low_rank(self.shape, self.rank, self.sample_vals, self.normalise, &mut self.rng)
    }

    /// Draw factors and observe `k` random entries of their product.
    pub fn sparse(&mut self, k: usize) -> Result<SparseLowRank> {
        let factors = self.low_rank()?;
        let mut matrix = reconstruct_low_rank(&factors, &Observed::Count(k), &mut self.rng)?;
        add_noise(&mut matrix, self.noise, &mut self.rng);
        Ok(SparseLowRank { matrix, factors })
    }

    /// Mazumder et al. sample with the configured rank.
    pub fn mazumder(&mut self, k: usize, snr: f64) -> Result<MazumderSample> {
        generate_sparse_low_rank2(self.shape, self.rank, k, snr, &mut self.rng)
    }
}
