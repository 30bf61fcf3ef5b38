//! Matrix-free linear operators.
//!
//! The Krylov solvers only touch a matrix through `A x` and `Aᵀ y`, so anything
//! that can provide those two products can be decomposed: plain sparse or
//! dense matrices, the implicit sum `X + U diag(s) Vᵀ` used by soft-impute,
//! and the normal operator `AᵀA`.

use log::debug;
use nalgebra::{DMatrix, DVector};
use sprs::CsMat;

use crate::error::{LowRankError, Result};
use crate::factors::SvdTriplets;

pub trait LinearOperator {
    /// `(rows, cols)` of the operator.
    fn shape(&self) -> (usize, usize);

    /// `A x`, with `x.len() == cols`.
    fn matvec(&self, x: &[f64]) -> Vec<f64>;

    /// `Aᵀ y`, with `y.len() == rows`.
    fn rmatvec(&self, y: &[f64]) -> Vec<f64>;

    /// `A X`, column by column.
    fn matmat(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let (m, _) = self.shape();
        let mut out = DMatrix::zeros(m, x.ncols());
        for (j, col) in x.column_iter().enumerate() {
            let y = self.matvec(col.as_slice());
            out.set_column(j, &DVector::from_vec(y));
        }
        out
    }

    /// `Aᵀ Y`, column by column.
    fn rmatmat(&self, y: &DMatrix<f64>) -> DMatrix<f64> {
        let (_, n) = self.shape();
        let mut out = DMatrix::zeros(n, y.ncols());
        for (j, col) in y.column_iter().enumerate() {
            let x = self.rmatvec(col.as_slice());
            out.set_column(j, &DVector::from_vec(x));
        }
        out
    }
}

/// Accumulate `A x` (or `Aᵀ x` when `transpose`) over the stored entries of `a`,
/// whatever its storage order.
pub(crate) fn sparse_product(a: &CsMat<f64>, x: &[f64], transpose: bool) -> Vec<f64> {
    let (m, n) = a.shape();
    let out_len = if transpose { n } else { m };
    let mut y = vec![0.0; out_len];
    let csc = a.is_csc();
    for (outer, lane) in a.outer_iterator().enumerate() {
        for (inner, &val) in lane.iter() {
            let (row, col) = if csc { (inner, outer) } else { (outer, inner) };
            if transpose {
                y[col] += val * x[row];
            } else {
                y[row] += val * x[col];
            }
        }
    }
    y
}

impl LinearOperator for CsMat<f64> {
    fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    fn matvec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.cols());
        sparse_product(self, x, false)
    }

    fn rmatvec(&self, y: &[f64]) -> Vec<f64> {
        debug_assert_eq!(y.len(), self.rows());
        sparse_product(self, y, true)
    }
}

impl LinearOperator for DMatrix<f64> {
    fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn matvec(&self, x: &[f64]) -> Vec<f64> {
        let y = self * DVector::from_column_slice(x);
        y.as_slice().to_vec()
    }

    fn rmatvec(&self, y: &[f64]) -> Vec<f64> {
        let x = self.tr_mul(&DVector::from_column_slice(y));
        x.as_slice().to_vec()
    }

    fn matmat(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        self * x
    }

    fn rmatmat(&self, y: &DMatrix<f64>) -> DMatrix<f64> {
        self.tr_mul(y)
    }
}

/// The implicit operator `X + U diag(s) Vᵀ` with `X` sparse and the second term
/// kept in factored form.
#[derive(Debug)]
pub struct SparseLowRankOp<'a> {
    sparse: &'a CsMat<f64>,
    low_rank: &'a SvdTriplets,
}

impl<'a> SparseLowRankOp<'a> {
    pub fn new(sparse: &'a CsMat<f64>, low_rank: &'a SvdTriplets) -> Result<Self> {
        if sparse.shape() != low_rank.shape() {
            return Err(LowRankError::ShapeMismatch(format!(
                "sparse part is {:?} but low-rank part is {:?}",
                sparse.shape(),
                low_rank.shape()
            )));
        }
        debug!(
            "Sparse + low-rank operator: {:?}, nnz={}, rank={}",
            sparse.shape(),
            sparse.nnz(),
            low_rank.rank()
        );
        Ok(Self { sparse, low_rank })
    }
}

impl LinearOperator for SparseLowRankOp<'_> {
    fn shape(&self) -> (usize, usize) {
        self.sparse.shape()
    }

    fn matvec(&self, x: &[f64]) -> Vec<f64> {
        let mut y = sparse_product(self.sparse, x, false);
        let SvdTriplets { u, s, v } = self.low_rank;
        let coef = v.tr_mul(&DVector::from_column_slice(x)).component_mul(s);
        let dense = u * coef;
        y.iter_mut().zip(dense.iter()).for_each(|(a, b)| *a += b);
        y
    }

    fn rmatvec(&self, y: &[f64]) -> Vec<f64> {
        let mut x = sparse_product(self.sparse, y, true);
        let SvdTriplets { u, s, v } = self.low_rank;
        let coef = u.tr_mul(&DVector::from_column_slice(y)).component_mul(s);
        let dense = v * coef;
        x.iter_mut().zip(dense.iter()).for_each(|(a, b)| *a += b);
        x
    }
}

/// The normal operator `AᵀA`, symmetric positive semi-definite.
pub struct NormalOp<'a, O: LinearOperator + ?Sized> {
    inner: &'a O,
}

impl<'a, O: LinearOperator + ?Sized> NormalOp<'a, O> {
    pub fn new(inner: &'a O) -> Self {
        Self { inner }
    }
}

impl<O: LinearOperator + ?Sized> LinearOperator for NormalOp<'_, O> {
    fn shape(&self) -> (usize, usize) {
        let (_, n) = self.inner.shape();
        (n, n)
    }

    fn matvec(&self, x: &[f64]) -> Vec<f64> {
        self.inner.rmatvec(&self.inner.matvec(x))
    }

    fn rmatvec(&self, y: &[f64]) -> Vec<f64> {
        self.matvec(y)
    }
}

/// `Aᵀ` as an operator, without copying `A`.
pub struct Transposed<'a, O: LinearOperator + ?Sized> {
    inner: &'a O,
}

impl<'a, O: LinearOperator + ?Sized> Transposed<'a, O> {
    pub fn new(inner: &'a O) -> Self {
        Self { inner }
    }
}

impl<O: LinearOperator + ?Sized> LinearOperator for Transposed<'_, O> {
    fn shape(&self) -> (usize, usize) {
        let (m, n) = self.inner.shape();
        (n, m)
    }

    fn matvec(&self, x: &[f64]) -> Vec<f64> {
        self.inner.rmatvec(x)
    }

    fn rmatvec(&self, y: &[f64]) -> Vec<f64> {
        self.inner.matvec(y)
    }
}
