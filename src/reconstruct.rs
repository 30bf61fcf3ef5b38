//! # Partial reconstruction of low-rank products
//!
//! Matrix completion only ever needs `P Qᵀ` at the observed entries, so the
//! product is evaluated entry by entry (`P[i,:]·Q[j,:]`) and packed straight into
//! a CSC matrix. The per-entry dot products are independent and run on rayon.
//!
//! Entries are addressed either by explicit `(row, col)` coordinates or by flat
//! row-major indices in `[0, m·n)`, which are unravelled against the shape.

use log::{debug, info, trace};
use nalgebra::DMatrix;
use rand::Rng;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use crate::error::{LowRankError, Result};
use crate::factors::SvdTriplets;

/// Which entries of the product to evaluate.
#[derive(Clone, Debug, PartialEq)]
pub enum Observed {
    /// Draw this many flat indices uniformly (with replacement) and keep the distinct ones.
    Count(usize),
    /// Flat row-major indices; duplicates are collapsed.
    Linear(Vec<usize>),
    /// Explicit coordinates, used as given (duplicates are summed).
    Coords(Vec<usize>, Vec<usize>),
}

/// Number of entries `m · n` of a matrix with `shape`, the bound on flat indices.
pub(crate) fn flat_len(shape: (usize, usize)) -> Result<usize> {
    shape.0.checked_mul(shape.1).ok_or_else(|| {
        LowRankError::InvalidArgument(format!(
            "{}x{} matrix has more entries than flat indices can address",
            shape.0, shape.1
        ))
    })
}

/// Map flat row-major indices onto `(rows, cols)` of a matrix with `shape`.
pub fn unravel_index(inds: &[usize], shape: (usize, usize)) -> Result<(Vec<usize>, Vec<usize>)> {
    let n = shape.1;
    let bound = flat_len(shape)?;
    let mut rows = Vec::with_capacity(inds.len());
    let mut cols = Vec::with_capacity(inds.len());
    for &ind in inds {
        if ind >= bound {
            return Err(LowRankError::IndexOutOfRange { index: ind, bound });
        }
        rows.push(ind / n);
        cols.push(ind % n);
    }
    Ok((rows, cols))
}

/// Sorted, deduplicated copy of `inds`.
fn unique(inds: &[usize]) -> Vec<usize> {
    let mut out = inds.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Draw `k` flat indices in `[0, bound)` and keep the distinct ones, sorted.
pub fn sample_flat_indices<R: Rng + ?Sized>(rng: &mut R, bound: usize, k: usize) -> Vec<usize> {
    if bound == 0 {
        return Vec::new();
    }
    let draws: Vec<usize> = (0..k).map(|_| rng.random_range(0..bound)).collect();
    unique(&draws)
}

fn check_coords(rows: &[usize], cols: &[usize], shape: (usize, usize)) -> Result<()> {
    if rows.len() != cols.len() {
        return Err(LowRankError::ShapeMismatch(format!(
            "{} row indices but {} column indices",
            rows.len(),
            cols.len()
        )));
    }
    if let Some(&r) = rows.iter().find(|&&r| r >= shape.0) {
        return Err(LowRankError::IndexOutOfRange { index: r, bound: shape.0 });
    }
    if let Some(&c) = cols.iter().find(|&&c| c >= shape.1) {
        return Err(LowRankError::IndexOutOfRange { index: c, bound: shape.1 });
    }
    Ok(())
}

/// `vals[t] = P[rows[t], :] · Q[cols[t], :]`.
pub fn partial_reconstruct_values(
    rows: &[usize],
    cols: &[usize],
    p: &DMatrix<f64>,
    q: &DMatrix<f64>,
) -> Result<Vec<f64>> {
    if p.ncols() != q.ncols() {
        return Err(LowRankError::ShapeMismatch(format!(
            "P has {} columns but Q has {}",
            p.ncols(),
            q.ncols()
        )));
    }
    check_coords(rows, cols, (p.nrows(), q.nrows()))?;

    let vals = rows
        .par_iter()
        .zip(cols.par_iter())
        .map(|(&i, &j)| p.row(i).dot(&q.row(j)))
        .collect();
    Ok(vals)
}

/// Evaluate `P Qᵀ` at the given coordinates and return a CSC matrix of shape
/// `(P.nrows(), Q.nrows())`.
pub fn partial_reconstruct_pq(
    rows: &[usize],
    cols: &[usize],
    p: &DMatrix<f64>,
    q: &DMatrix<f64>,
) -> Result<CsMat<f64>> {
    let shape = (p.nrows(), q.nrows());
    debug!(
        "Partial reconstruction of a {}x{} product (rank {}) at {} entries",
        shape.0,
        shape.1,
        p.ncols(),
        rows.len()
    );
    let vals = partial_reconstruct_values(rows, cols, p, q)?;
    let triplets = TriMat::from_triplets(shape, rows.to_vec(), cols.to_vec(), vals);
    let x: CsMat<f64> = triplets.to_csc();
    trace!("Reconstructed matrix has {} stored entries", x.nnz());
    Ok(x)
}

/// `vals[t] = u[rows[t]] * v[cols[t]]`: the entries of the outer product `u vᵀ`
/// at the given coordinates.
pub fn partial_outer_product(rows: &[usize], cols: &[usize], u: &[f64], v: &[f64]) -> Result<Vec<f64>> {
    check_coords(rows, cols, (u.len(), v.len()))?;
    Ok(rows
        .par_iter()
        .zip(cols.par_iter())
        .map(|(&i, &j)| u[i] * v[j])
        .collect())
}

fn resolve<R: Rng + ?Sized>(
    observed: &Observed,
    shape: (usize, usize),
    rng: Option<&mut R>,
) -> Result<(Vec<usize>, Vec<usize>)> {
    match observed {
        Observed::Count(k) => {
            let rng = rng.ok_or_else(|| {
                LowRankError::InvalidArgument(
                    "sampling a number of entries needs a random source".to_string(),
                )
            })?;
            let inds = sample_flat_indices(rng, flat_len(shape)?, *k);
            unravel_index(&inds, shape)
        }
        Observed::Linear(inds) => unravel_index(&unique(inds), shape),
        Observed::Coords(rows, cols) => Ok((rows.clone(), cols.clone())),
    }
}

/// Partially reconstruct `U diag(s) Vᵀ` at the selected entries.
pub fn reconstruct_low_rank<R: Rng + ?Sized>(
    triplets: &SvdTriplets,
    observed: &Observed,
    rng: &mut R,
) -> Result<CsMat<f64>> {
    let shape = triplets.shape();
    info!(
        "Reconstructing rank-{} {}x{} matrix at {:?}",
        triplets.rank(),
        shape.0,
        shape.1,
        match observed {
            Observed::Count(k) => format!("{} sampled entries", k),
            Observed::Linear(inds) => format!("{} flat indices", inds.len()),
            Observed::Coords(rows, _) => format!("{} coordinates", rows.len()),
        }
    );
    let (rows, cols) = resolve(observed, shape, Some(rng))?;
    partial_reconstruct_pq(&rows, &cols, &triplets.scaled_u(), &triplets.v)
}

/// Partially reconstruct `P Qᵀ`. Entries must be given explicitly.
pub fn reconstruct_low_rank_pq(
    p: &DMatrix<f64>,
    q: &DMatrix<f64>,
    observed: &Observed,
) -> Result<CsMat<f64>> {
    if matches!(observed, Observed::Count(_)) {
        return Err(LowRankError::InvalidArgument(
            "P Qᵀ reconstruction needs explicit indices".to_string(),
        ));
    }
    let (rows, cols) = resolve::<rand_chacha::ChaCha8Rng>(observed, (p.nrows(), q.nrows()), None)?;
    partial_reconstruct_pq(&rows, &cols, p, q)
}
