use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};

use crate::error::LowRankError;
use crate::factors::SvdTriplets;

fn small_triplets() -> SvdTriplets {
    let u = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    let s = DVector::from_vec(vec![1.0, 4.0, 2.5]);
    let v = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.5, 0.0, 1.0, 0.5]);
    SvdTriplets::new(u, s, v).unwrap()
}

#[test]
fn test_new_rejects_mismatched_columns() {
    let err = SvdTriplets::new(DMatrix::zeros(3, 2), DVector::zeros(3), DMatrix::zeros(4, 3));
    assert!(matches!(err, Err(LowRankError::ShapeMismatch(_))));
}

#[test]
fn test_shape_and_rank() {
    let t = small_triplets();
    assert_eq!(t.shape(), (3, 2));
    assert_eq!(t.rank(), 3);
    assert_eq!(SvdTriplets::empty(5, 4).rank(), 0);
    assert_eq!(SvdTriplets::empty(5, 4).shape(), (5, 4));
}

#[test]
fn test_select_reorders_triplets() {
    let t = small_triplets();
    let picked = t.select(&[2, 0]).unwrap();
    assert_eq!(picked.rank(), 2);
    assert_eq!(picked.s[0], 2.5);
    assert_eq!(picked.s[1], 1.0);
    assert_eq!(picked.u.column(0), t.u.column(2));
    assert_eq!(picked.v.column(1), t.v.column(0));

    assert!(matches!(
        t.select(&[3]),
        Err(LowRankError::IndexOutOfRange { index: 3, bound: 3 })
    ));
}

#[test]
fn test_sorted_descending() {
    let sorted = small_triplets().sorted_descending();
    assert_eq!(sorted.s.as_slice(), &[4.0, 2.5, 1.0]);
    // column 1 of u (the e₂ vector) belonged to s = 4
    assert_eq!(sorted.u[(1, 0)], 1.0);
}

#[test]
fn test_soft_threshold_clips_at_zero() {
    let t = small_triplets().soft_threshold(2.0);
    assert_eq!(t.s.as_slice(), &[0.0, 2.0, 0.5]);
    assert_eq!(t.rank(), 3, "soft threshold never drops triplets");
}

#[test]
fn test_to_dense_matches_product() {
    let t = small_triplets();
    let dense = t.to_dense();
    let expected = &t.u * DMatrix::from_diagonal(&t.s) * t.v.transpose();
    assert_eq!(dense.shape(), (3, 2));
    for i in 0..3 {
        for j in 0..2 {
            assert_abs_diff_eq!(dense[(i, j)], expected[(i, j)], epsilon = 1e-12);
        }
    }
    // row 2 of u picks s = 2.5 and v column 2 = (0.5, 0.5)
    assert_abs_diff_eq!(dense[(2, 0)], 1.25, epsilon = 1e-12);
}
