//! Centering of sparse matrices over their stored entries.
//!
//! Only observed entries move: a missing entry stays missing, so the "mean" of a
//! row or column is the mean of its stored values. Rows or columns without any
//! stored value get a mean of zero.

use log::{debug, trace};
use rayon::prelude::*;
use sprs::CsMat;

use crate::error::{LowRankError, Result};
use crate::reconstruct::partial_outer_product;
use crate::sparse::{bincount, nonzero};

/// Coordinates of the stored entries, in storage order.
pub type Coords<'a> = (&'a [usize], &'a [usize]);

/// Sum `vals` into `n` buckets keyed by `inds`.
pub fn sum_by_index(inds: &[usize], vals: &[f64], n: usize) -> Result<Vec<f64>> {
    if inds.len() != vals.len() {
        return Err(LowRankError::ShapeMismatch(format!(
            "{} indices for {} values",
            inds.len(),
            vals.len()
        )));
    }
    let mut sums = vec![0.0; n];
    for (&i, &v) in inds.iter().zip(vals) {
        if i >= n {
            return Err(LowRankError::IndexOutOfRange { index: i, bound: n });
        }
        sums[i] += v;
    }
    Ok(sums)
}

fn storage_coords(x: &CsMat<f64>, inds: Option<Coords<'_>>) -> Result<(Vec<usize>, Vec<usize>)> {
    match inds {
        None => Ok(nonzero(x)),
        Some((rows, cols)) => {
            if rows.len() != x.nnz() || cols.len() != x.nnz() {
                return Err(LowRankError::ShapeMismatch(format!(
                    "{} row / {} column indices for {} stored entries",
                    rows.len(),
                    cols.len(),
                    x.nnz()
                )));
            }
            Ok((rows.to_vec(), cols.to_vec()))
        }
    }
}

/// Mean of the stored values falling in each of `n` buckets.
fn stored_means(keys: &[usize], vals: &[f64], n: usize) -> Result<Vec<f64>> {
    let sums = sum_by_index(keys, vals, n)?;
    let counts = bincount(keys, n);
    Ok(sums
        .into_iter()
        .zip(counts)
        .map(|(s, c)| if c == 0 { 0.0 } else { s / c as f64 })
        .collect())
}

fn check_len(mu: &[f64], expected: usize, what: &str) -> Result<()> {
    if mu.len() != expected {
        return Err(LowRankError::ShapeMismatch(format!(
            "Invalid number of {}: got {} means for {}",
            what,
            mu.len(),
            expected
        )));
    }
    Ok(())
}

fn shift_stored(x: &mut CsMat<f64>, delta: &[f64], sign: f64) {
    x.data_mut()
        .par_iter_mut()
        .zip(delta.par_iter())
        .for_each(|(v, d)| *v += sign * d);
}

/// Subtract the row mean of the stored values from every stored value.
///
/// `mu` overrides the computed means; `inds` supplies the coordinates of the
/// stored values (storage order) instead of reading them off `x`.
/// Returns the means that were subtracted.
pub fn center_rows(
    x: &mut CsMat<f64>,
    mu: Option<&[f64]>,
    inds: Option<Coords<'_>>,
) -> Result<Vec<f64>> {
    let (rows, cols) = storage_coords(x, inds)?;
    let mu = match mu {
        Some(mu) => {
            check_len(mu, x.rows(), "rows")?;
            mu.to_vec()
        }
        None => stored_means(&rows, x.data(), x.rows())?,
    };
    debug!("Centering rows of {:?} matrix ({} stored)", x.shape(), x.nnz());

    let ones = vec![1.0; x.cols()];
    let vals = partial_outer_product(&rows, &cols, &mu, &ones)?;
    shift_stored(x, &vals, -1.0);
    trace!("Row means: {:?}", mu);
    Ok(mu)
}

/// Subtract the column mean of the stored values from every stored value.
/// Same conventions as [`center_rows`].
pub fn center_cols(
    x: &mut CsMat<f64>,
    mu: Option<&[f64]>,
    inds: Option<Coords<'_>>,
) -> Result<Vec<f64>> {
    let (rows, cols) = storage_coords(x, inds)?;
    let mu = match mu {
        Some(mu) => {
            check_len(mu, x.cols(), "columns")?;
            mu.to_vec()
        }
        None => stored_means(&cols, x.data(), x.cols())?,
    };
    debug!("Centering columns of {:?} matrix ({} stored)", x.shape(), x.nnz());

    let ones = vec![1.0; x.rows()];
    let vals = partial_outer_product(&rows, &cols, &ones, &mu)?;
    shift_stored(x, &vals, -1.0);
    trace!("Column means: {:?}", mu);
    Ok(mu)
}

/// Add row means `mu` back onto the stored values.
pub fn uncenter_rows(x: &mut CsMat<f64>, mu: &[f64]) -> Result<()> {
    check_len(mu, x.rows(), "rows")?;
    let (rows, cols) = nonzero(x);
    let ones = vec![1.0; x.cols()];
    let vals = partial_outer_product(&rows, &cols, mu, &ones)?;
    shift_stored(x, &vals, 1.0);
    Ok(())
}

/// Undo a row-then-column centering: add `mu_rows[i] + mu_cols[j]` to each
/// stored value at `(i, j)`.
pub fn uncenter(x: &mut CsMat<f64>, mu_rows: &[f64], mu_cols: &[f64]) -> Result<()> {
    check_len(mu_rows, x.rows(), "rows")?;
    check_len(mu_cols, x.cols(), "columns")?;
    let (rows, cols) = nonzero(x);
    let ones_cols = vec![1.0; x.cols()];
    let ones_rows = vec![1.0; x.rows()];
    let from_rows = partial_outer_product(&rows, &cols, mu_rows, &ones_cols)?;
    let from_cols = partial_outer_product(&rows, &cols, &ones_rows, mu_cols)?;
    let total: Vec<f64> = from_rows.iter().zip(&from_cols).map(|(a, b)| a + b).collect();
    shift_stored(x, &total, 1.0);
    Ok(())
}
