//! Bookkeeping on sparse matrices: coordinate listing, entry subsampling,
//! occupancy statistics, pruning and the shared CSC packing handed to
//! parallel workers.

use std::sync::Arc;

use log::{debug, info};
use rand::Rng;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use crate::error::{LowRankError, Result};
use crate::operator::LinearOperator;

/// Row and column index of every stored entry, in storage order (the order of
/// `x.data()`).
pub fn nonzero(x: &CsMat<f64>) -> (Vec<usize>, Vec<usize>) {
    let mut rows = Vec::with_capacity(x.nnz());
    let mut cols = Vec::with_capacity(x.nnz());
    let csc = x.is_csc();
    for (outer, lane) in x.outer_iterator().enumerate() {
        for (inner, _) in lane.iter() {
            if csc {
                rows.push(inner);
                cols.push(outer);
            } else {
                rows.push(outer);
                cols.push(inner);
            }
        }
    }
    (rows, cols)
}

/// Stored-entry counts per bucket, `minlength = n`.
pub(crate) fn bincount(inds: &[usize], n: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n];
    for &i in inds {
        counts[i] += 1;
    }
    counts
}

/// CSC copy of `x` (a plain clone if it already is CSC).
pub fn to_csc(x: &CsMat<f64>) -> CsMat<f64> {
    if x.is_csc() {
        x.clone()
    } else {
        x.to_other_storage()
    }
}

/// Which stored entries [`submatrix`] keeps.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// This many distinct stored entries, chosen uniformly at random (at most
    /// every stored entry).
    Count(usize),
    /// Positions into the storage order of the matrix.
    Indices(Vec<usize>),
}

/// Keep a subset of the stored entries of `x`. The result has the same shape
/// and is CSC.
pub fn submatrix<R: Rng + ?Sized>(
    x: &CsMat<f64>,
    selection: &Selection,
    rng: &mut R,
) -> Result<CsMat<f64>> {
    let nnz = x.nnz();
    let positions = match selection {
        Selection::Count(k) => {
            if *k > nnz {
                debug!("Asked for {} of {} stored entries, keeping all of them", k, nnz);
            }
            rand::seq::index::sample(rng, nnz, (*k).min(nnz)).into_vec()
        }
        Selection::Indices(inds) => {
            if let Some(&bad) = inds.iter().find(|&&i| i >= nnz) {
                return Err(LowRankError::IndexOutOfRange { index: bad, bound: nnz });
            }
            inds.clone()
        }
    };
    debug!("Submatrix keeps {} of {} stored entries", positions.len(), nnz);

    let (rows, cols) = nonzero(x);
    let data = x.data();
    let mut triplets = TriMat::with_capacity(x.shape(), positions.len());
    for &p in &positions {
        triplets.add_triplet(rows[p], cols[p], data[p]);
    }
    Ok(triplets.to_csc())
}

/// A CSC matrix unpacked into reference-counted arrays so that worker threads
/// can share it without copying.
#[derive(Clone, Debug)]
pub struct CscArrays {
    data: Arc<[f64]>,
    indices: Arc<[usize]>,
    indptr: Arc<[usize]>,
    shape: (usize, usize),
}

impl CscArrays {
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Row index of each value.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Column offsets into `data`/`indices`, length `cols + 1`.
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Rebuild an owned CSC matrix.
    pub fn to_csc(&self) -> CsMat<f64> {
        CsMat::new_csc(
            self.shape,
            self.indptr.to_vec(),
            self.indices.to_vec(),
            self.data.to_vec(),
        )
    }

    fn column(&self, j: usize) -> std::ops::Range<usize> {
        self.indptr[j]..self.indptr[j + 1]
    }
}

/// Pack `x` into shareable CSC arrays.
pub fn csc_to_arrays(x: &CsMat<f64>) -> CscArrays {
    let csc = to_csc(x);
    let mut indptr = Vec::with_capacity(csc.cols() + 1);
    let mut indices = Vec::with_capacity(csc.nnz());
    let mut data = Vec::with_capacity(csc.nnz());
    indptr.push(0);
    for lane in csc.outer_iterator() {
        for (row, &val) in lane.iter() {
            indices.push(row);
            data.push(val);
        }
        indptr.push(indices.len());
    }
    debug!(
        "Packed {:?} matrix into shared CSC arrays ({} values)",
        csc.shape(),
        data.len()
    );
    CscArrays {
        data: data.into(),
        indices: indices.into(),
        indptr: indptr.into(),
        shape: csc.shape(),
    }
}

impl LinearOperator for CscArrays {
    fn shape(&self) -> (usize, usize) {
        self.shape
    }

    fn matvec(&self, x: &[f64]) -> Vec<f64> {
        let (m, n) = self.shape;
        (0..n)
            .into_par_iter()
            .fold(
                || vec![0.0; m],
                |mut acc, j| {
                    let xj = x[j];
                    for p in self.column(j) {
                        acc[self.indices[p]] += self.data[p] * xj;
                    }
                    acc
                },
            )
            .reduce(
                || vec![0.0; m],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(ai, bi)| *ai += bi);
                    a
                },
            )
    }

    fn rmatvec(&self, y: &[f64]) -> Vec<f64> {
        let (_, n) = self.shape;
        (0..n)
            .into_par_iter()
            .map(|j| self.column(j).map(|p| self.data[p] * y[self.indices[p]]).sum::<f64>())
            .collect()
    }
}

/// Fraction of the stored entries that fall in each row (`u`) and each column (`v`).
pub fn nonzero_row_cols_probs(x: &CsMat<f64>) -> (Vec<f64>, Vec<f64>) {
    let (rows, cols) = nonzero(x);
    let nnz = x.nnz();
    let to_probs = |counts: Vec<usize>| -> Vec<f64> {
        if nnz == 0 {
            return vec![0.0; counts.len()];
        }
        counts.into_iter().map(|c| c as f64 / nnz as f64).collect()
    };
    (
        to_probs(bincount(&rows, x.rows())),
        to_probs(bincount(&cols, x.cols())),
    )
}

/// Result of [`prune_matrix`]: the reduced matrix and which original rows and
/// columns it keeps.
#[derive(Clone, Debug)]
pub struct PrunedMatrix {
    pub matrix: CsMat<f64>,
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
}

pub const DEFAULT_MIN_NNZ: usize = 5;

/// Drop rows with fewer than `min_nnz_rows` stored entries and columns with
/// fewer than `min_nnz_cols`. Both counts are taken on `x` before anything is
/// removed.
pub fn prune_matrix(x: &CsMat<f64>, min_nnz_rows: usize, min_nnz_cols: usize) -> PrunedMatrix {
    let (rows, cols) = nonzero(x);
    let row_counts = bincount(&rows, x.rows());
    let col_counts = bincount(&cols, x.cols());

    let kept_rows: Vec<usize> = (0..x.rows()).filter(|&i| row_counts[i] >= min_nnz_rows).collect();
    let kept_cols: Vec<usize> = (0..x.cols()).filter(|&j| col_counts[j] >= min_nnz_cols).collect();

    let mut row_map = vec![None; x.rows()];
    for (new, &old) in kept_rows.iter().enumerate() {
        row_map[old] = Some(new);
    }
    let mut col_map = vec![None; x.cols()];
    for (new, &old) in kept_cols.iter().enumerate() {
        col_map[old] = Some(new);
    }

    let mut triplets = TriMat::new((kept_rows.len(), kept_cols.len()));
    for ((&i, &j), &val) in rows.iter().zip(&cols).zip(x.data()) {
        if let (Some(ni), Some(nj)) = (row_map[i], col_map[j]) {
            triplets.add_triplet(ni, nj, val);
        }
    }
    let matrix: CsMat<f64> = triplets.to_csc();

    info!(
        "Pruned {:?} matrix to {:?} (min {} per row, {} per column), nnz {} -> {}",
        x.shape(),
        matrix.shape(),
        min_nnz_rows,
        min_nnz_cols,
        x.nnz(),
        matrix.nnz()
    );

    PrunedMatrix {
        matrix,
        rows: kept_rows,
        cols: kept_cols,
    }
}
