//! Singular triplets `U diag(s) Vᵀ` and the small set of manipulations
//! the solvers and soft-thresholding need.

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::error::{LowRankError, Result};

/// A (possibly partial) singular value decomposition `A ≈ U diag(s) Vᵀ`.
///
/// `u` is `m × r`, `s` has length `r` and `v` is `n × r`; columns of `v` are
/// right singular vectors, so `v` is *not* stored transposed.
#[derive(Clone, Debug, PartialEq)]
pub struct SvdTriplets {
    pub u: DMatrix<f64>,
    pub s: DVector<f64>,
    pub v: DMatrix<f64>,
}

impl SvdTriplets {
    pub fn new(u: DMatrix<f64>, s: DVector<f64>, v: DMatrix<f64>) -> Result<Self> {
        if u.ncols() != s.len() || v.ncols() != s.len() {
            return Err(LowRankError::ShapeMismatch(format!(
                "U has {} columns, s has {} values, V has {} columns",
                u.ncols(),
                s.len(),
                v.ncols()
            )));
        }
        Ok(Self { u, s, v })
    }

    /// Zero-rank triplets for an `m × n` matrix.
    pub fn empty(m: usize, n: usize) -> Self {
        Self {
            u: DMatrix::zeros(m, 0),
            s: DVector::zeros(0),
            v: DMatrix::zeros(n, 0),
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.s.len()
    }

    /// Shape of the represented matrix.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.u.nrows(), self.v.nrows())
    }

    /// Keep the triplets at `inds`, in that order.
    pub fn select(&self, inds: &[usize]) -> Result<Self> {
        if let Some(&bad) = inds.iter().find(|&&i| i >= self.rank()) {
            return Err(LowRankError::IndexOutOfRange {
                index: bad,
                bound: self.rank(),
            });
        }
        trace!("Selecting {} of {} singular triplets", inds.len(), self.rank());
        Ok(Self {
            u: self.u.select_columns(inds.iter()),
            s: DVector::from_iterator(inds.len(), inds.iter().map(|&i| self.s[i])),
            v: self.v.select_columns(inds.iter()),
        })
    }

    /// Indices of the singular values in decreasing order.
    pub fn descending_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rank()).collect();
        order.sort_by(|&a, &b| {
            self.s[b]
                .partial_cmp(&self.s[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        order
    }

    pub fn sorted_descending(&self) -> Self {
        let order = self.descending_order();
        Self {
            u: self.u.select_columns(order.iter()),
            s: DVector::from_iterator(order.len(), order.iter().map(|&i| self.s[i])),
            v: self.v.select_columns(order.iter()),
        }
    }

    /// Shrink every singular value by `lambda`, clipping at zero.
    pub fn soft_threshold(mut self, lambda: f64) -> Self {
        self.s.apply(|x| *x = (*x - lambda).max(0.0));
        self
    }

    /// `U diag(s)`.
    pub fn scaled_u(&self) -> DMatrix<f64> {
        let mut us = self.u.clone();
        for (j, mut col) in us.column_iter_mut().enumerate() {
            col *= self.s[j];
        }
        us
    }

    /// Dense `m × n` reconstruction. Only meant for small matrices.
    pub fn to_dense(&self) -> DMatrix<f64> {
        self.scaled_u() * self.v.transpose()
    }
}
