use approx::assert_abs_diff_eq;

use crate::error::LowRankError;
use crate::generate::*;
use crate::sparse::nonzero;
use crate::tests::{assert_orthonormal_columns, init, seeded};

#[test]
fn test_generate_low_rank_factors_are_orthonormal() {
    init();
    let mut rng = seeded(10);
    let t = generate_low_rank((40, 25), 5, DEFAULT_SAMPLE_VALS, true, &mut rng).unwrap();
    assert_eq!(t.shape(), (40, 25));
    assert_eq!(t.rank(), 5);
    assert_orthonormal_columns(&t.u, 1e-10);
    assert_orthonormal_columns(&t.v, 1e-10);
    assert!(t.s.iter().all(|&s| s >= 0.0));
}

#[test]
fn test_rank_is_clamped_by_shape() {
    let mut rng = seeded(11);
    let t = generate_low_rank((6, 4), 10, 50, false, &mut rng).unwrap();
    assert_eq!(t.rank(), 4);
    assert!(t.s.iter().all(|&s| (0.0..1.0).contains(&s)));

    assert!(matches!(
        generate_low_rank((6, 4), 0, 50, false, &mut rng),
        Err(LowRankError::InvalidRank { k: 0, .. })
    ));
}

#[test]
fn test_normalise_scales_by_largest_entry_of_u_vt() {
    init();
    let (shape, r) = ((20, 15), 3);
    // 2000 draws over 20 and 15 rows: every row of both factors is sampled
    let normalised = generate_low_rank(shape, r, 2000, true, &mut seeded(12)).unwrap();
    let plain = generate_low_rank(shape, r, 2000, false, &mut seeded(12)).unwrap();

    // the factors are drawn before the singular values
    assert_eq!(normalised.u, plain.u);
    assert_eq!(normalised.v, plain.v);

    let uvt = &normalised.u * normalised.v.transpose();
    let spread = uvt.min().abs().max(uvt.max());
    let scaling = 1.0 / spread;
    assert!(
        normalised.s.iter().all(|&s| s >= 0.0 && s <= scaling + 1e-12),
        "s = {:?}, scaling = {}",
        normalised.s.as_slice(),
        scaling
    );
    assert!(plain.s.iter().all(|&s| s < 1.0));

    // |X_ij| <= s_max Σ_k |u_ik v_jk|, with s_max < 1 unscaled and <= scaling normalised
    let factor_bound = (0..shape.0)
        .flat_map(|i| (0..shape.1).map(move |j| (i, j)))
        .map(|(i, j)| {
            (0..r)
                .map(|k| (plain.u[(i, k)] * plain.v[(j, k)]).abs())
                .sum::<f64>()
        })
        .fold(0.0, f64::max);
    assert!(plain.to_dense().abs().max() <= factor_bound + 1e-12);
    assert!(normalised.to_dense().abs().max() <= scaling * factor_bound + 1e-12);
}

#[test]
fn test_noise_free_observations_match_factors() {
    init();
    let mut rng = seeded(13);
    let out = generate_sparse_low_rank((30, 20), 4, 150, 0.0, &mut rng).unwrap();
    assert_eq!(out.matrix.shape(), (30, 20));
    assert!(out.matrix.nnz() > 0 && out.matrix.nnz() <= 150);

    let full = out.factors.to_dense();
    let (rows, cols) = nonzero(&out.matrix);
    for ((&i, &j), &v) in rows.iter().zip(&cols).zip(out.matrix.data()) {
        assert_abs_diff_eq!(v, full[(i, j)], epsilon = 1e-12);
    }
}

#[test]
fn test_noise_perturbs_observations() {
    let mut rng = seeded(14);
    let out = generate_sparse_low_rank((30, 20), 4, 150, 0.5, &mut rng).unwrap();
    let full = out.factors.to_dense();
    let (rows, cols) = nonzero(&out.matrix);
    let max_dev = rows
        .iter()
        .zip(&cols)
        .zip(out.matrix.data())
        .map(|((&i, &j), &v)| (v - full[(i, j)]).abs())
        .fold(0.0, f64::max);
    assert!(max_dev > 1e-3);
}

#[test]
fn test_mazumder_model_with_high_snr() {
    init();
    let mut rng = seeded(15);
    let out = generate_sparse_low_rank2((25, 18), 3, 200, 1e6, &mut rng).unwrap();
    assert_eq!(out.u.shape(), (25, 3));
    assert_eq!(out.v.shape(), (18, 3));

    let full = &out.u * out.v.transpose();
    let (rows, cols) = nonzero(&out.matrix);
    for ((&i, &j), &v) in rows.iter().zip(&cols).zip(out.matrix.data()) {
        assert_abs_diff_eq!(v, full[(i, j)], epsilon = 1e-6);
    }
}

#[test]
fn test_mazumder_rejects_non_positive_snr() {
    let mut rng = seeded(16);
    assert!(matches!(
        generate_sparse_low_rank2((5, 5), 2, 10, 0.0, &mut rng),
        Err(LowRankError::InvalidArgument(_))
    ));
}

#[test]
fn test_mazumder_rejects_shapes_beyond_flat_index_range() {
    let mut rng = seeded(17);
    assert!(matches!(
        generate_sparse_low_rank2((usize::MAX, 2), 1, 10, 1.0, &mut rng),
        Err(LowRankError::InvalidArgument(_))
    ));
}

#[test]
fn test_generator_is_reproducible() {
    let mut a = LowRankGenerator::new((15, 12)).with_rank(3).with_noise(0.1).with_seed(99);
    let mut b = LowRankGenerator::new((15, 12)).with_rank(3).with_noise(0.1).with_seed(99);

    let sa = a.sparse(40).unwrap();
    let sb = b.sparse(40).unwrap();
    assert_eq!(sa.factors, sb.factors);
    assert_eq!(sa.matrix, sb.matrix);

    let ma = a.mazumder(30, 2.0).unwrap();
    let mb = b.mazumder(30, 2.0).unwrap();
    assert_eq!(ma.matrix, mb.matrix);
}

#[test]
fn test_generator_settings() {
    let mut gen = LowRankGenerator::new((8, 6))
        .with_rank(2)
        .with_sample_vals(10)
        .with_normalise(false)
        .with_seed(1);
    let t = gen.low_rank().unwrap();
    assert_eq!(t.rank(), 2);
    assert_eq!(t.shape(), (8, 6));
}
