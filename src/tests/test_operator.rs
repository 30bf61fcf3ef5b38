use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use sprs::CsMat;

use crate::error::LowRankError;
use crate::factors::SvdTriplets;
use crate::operator::*;
use crate::tests::{csc_from_dense, random_dense, random_sparse_dense, seeded};

fn assert_slices_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_abs_diff_eq!(*x, *y, epsilon = tol);
    }
}

#[test]
fn test_sparse_products_match_dense_for_both_storages() {
    let mut rng = seeded(21);
    let dense = random_sparse_dense(&mut rng, 7, 5, 0.4);
    let csc = csc_from_dense(&dense);
    let csr: CsMat<f64> = csc.to_other_storage();
    assert!(csr.is_csr());

    let x: Vec<f64> = (0..5).map(|i| i as f64 - 2.0).collect();
    let y: Vec<f64> = (0..7).map(|i| 0.5 * i as f64).collect();
    let ax = (&dense * DVector::from_vec(x.clone())).as_slice().to_vec();
    let aty = dense.tr_mul(&DVector::from_vec(y.clone())).as_slice().to_vec();

    assert_slices_close(&csc.matvec(&x), &ax, 1e-12);
    assert_slices_close(&csr.matvec(&x), &ax, 1e-12);
    assert_slices_close(&csc.rmatvec(&y), &aty, 1e-12);
    assert_slices_close(&csr.rmatvec(&y), &aty, 1e-12);
    assert_eq!(LinearOperator::shape(&csr), (7, 5));
}

#[test]
fn test_default_matmat_matches_dense() {
    let mut rng = seeded(4);
    let dense = random_sparse_dense(&mut rng, 6, 4, 0.5);
    let sparse = csc_from_dense(&dense);
    let block = random_dense(&mut rng, 4, 3);
    let got = sparse.matmat(&block);
    let expected = &dense * &block;
    assert_eq!(got.shape(), (6, 3));
    assert_slices_close(got.as_slice(), expected.as_slice(), 1e-12);

    let left = random_dense(&mut rng, 6, 2);
    let got = sparse.rmatmat(&left);
    let expected = dense.tr_mul(&left);
    assert_slices_close(got.as_slice(), expected.as_slice(), 1e-12);
}

#[test]
fn test_sparse_low_rank_operator() {
    let mut rng = seeded(8);
    let x_dense = random_sparse_dense(&mut rng, 6, 5, 0.3);
    let x = csc_from_dense(&x_dense);
    let t = SvdTriplets::new(
        random_dense(&mut rng, 6, 2),
        DVector::from_vec(vec![3.0, 0.5]),
        random_dense(&mut rng, 5, 2),
    )
    .unwrap();
    let full = &x_dense + t.to_dense();

    let op = SparseLowRankOp::new(&x, &t).unwrap();
    assert_eq!(op.shape(), (6, 5));

    let v: Vec<f64> = (0..5).map(|i| (i as f64).sin()).collect();
    let w: Vec<f64> = (0..6).map(|i| (i as f64).cos()).collect();
    let expected_mv = (&full * DVector::from_vec(v.clone())).as_slice().to_vec();
    let expected_rmv = full.tr_mul(&DVector::from_vec(w.clone())).as_slice().to_vec();
    assert_slices_close(&op.matvec(&v), &expected_mv, 1e-12);
    assert_slices_close(&op.rmatvec(&w), &expected_rmv, 1e-12);
}

#[test]
fn test_sparse_low_rank_operator_shape_guard() {
    let x: CsMat<f64> = CsMat::zero((4, 4));
    let t = SvdTriplets::empty(4, 5);
    assert!(matches!(
        SparseLowRankOp::new(&x, &t),
        Err(LowRankError::ShapeMismatch(_))
    ));
}

#[test]
fn test_normal_and_transposed_operators() {
    let mut rng = seeded(15);
    let a = random_dense(&mut rng, 5, 3);
    let normal = NormalOp::new(&a);
    assert_eq!(normal.shape(), (3, 3));

    let x = vec![1.0, -2.0, 0.5];
    let expected = (a.transpose() * &a * DVector::from_vec(x.clone())).as_slice().to_vec();
    assert_slices_close(&normal.matvec(&x), &expected, 1e-12);
    assert_slices_close(&normal.rmatvec(&x), &expected, 1e-12);

    let t = Transposed::new(&a);
    assert_eq!(t.shape(), (3, 5));
    let y = vec![1.0, 0.0, -1.0, 2.0, 0.5];
    assert_slices_close(&t.matvec(&y), &a.rmatvec(&y), 1e-12);
    assert_slices_close(&t.rmatvec(&x), &a.matvec(&x), 1e-12);
}

#[test]
fn test_dense_operator_products() {
    let a = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(a.matvec(&[1.0, 1.0, 1.0]), vec![6.0, 15.0]);
    assert_eq!(a.rmatvec(&[1.0, -1.0]), vec![-3.0, -3.0, -3.0]);
}
