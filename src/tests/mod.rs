mod test_factors;
mod test_generate;
mod test_operator;

use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sprs::{CsMat, TriMat};

use crate::sparse::nonzero;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn seeded(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// CSC matrix holding the non-zero entries of `dense`.
pub fn csc_from_dense(dense: &DMatrix<f64>) -> CsMat<f64> {
    let mut triplets = TriMat::new((dense.nrows(), dense.ncols()));
    for j in 0..dense.ncols() {
        for i in 0..dense.nrows() {
            let v = dense[(i, j)];
            if v != 0.0 {
                triplets.add_triplet(i, j, v);
            }
        }
    }
    triplets.to_csc()
}

pub fn dense_from_sparse(x: &CsMat<f64>) -> DMatrix<f64> {
    let (rows, cols) = nonzero(x);
    let mut dense = DMatrix::zeros(x.rows(), x.cols());
    for ((&i, &j), &v) in rows.iter().zip(&cols).zip(x.data()) {
        dense[(i, j)] += v;
    }
    dense
}

/// Dense matrix with roughly `density` of its entries drawn from `[-1, 1)`.
pub fn random_sparse_dense(rng: &mut ChaCha8Rng, m: usize, n: usize, density: f64) -> DMatrix<f64> {
    DMatrix::from_fn(m, n, |_, _| {
        if rng.random::<f64>() < density {
            rng.random_range(-1.0..1.0)
        } else {
            0.0
        }
    })
}

pub fn random_dense(rng: &mut ChaCha8Rng, m: usize, n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(m, n, |_, _| rng.random_range(-1.0..1.0))
}

/// Dense singular values in decreasing order.
pub fn dense_singular_values(x: &DMatrix<f64>) -> Vec<f64> {
    let mut s: Vec<f64> = x.clone().singular_values().iter().cloned().collect();
    s.sort_by(|a, b| b.partial_cmp(a).unwrap());
    s
}

pub fn assert_orthonormal_columns(q: &DMatrix<f64>, tol: f64) {
    let gram = q.tr_mul(q);
    for i in 0..gram.nrows() {
        for j in 0..gram.ncols() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!(
                (gram[(i, j)] - expected).abs() < tol,
                "QᵀQ[{},{}] = {:.3e}, expected {}",
                i,
                j,
                gram[(i, j)],
                expected
            );
        }
    }
}
