//! Soft-impute matrix completion on a synthetic Mazumder et al. sample.
//!
//! Each iteration takes the SVD of `P_Ω(X - Z) + Z` without ever forming it
//! densely: the residual is sparse and `Z` is kept as singular triplets.
//!
//! Run with `RUST_LOG=info cargo run --example soft_impute`.
use log::info;
use lowrank::center::{center_cols, center_rows, uncenter};
use lowrank::generate::generate_sparse_low_rank2;
use lowrank::reconstruct::partial_reconstruct_pq;
use lowrank::sparse::{nonzero, submatrix, Selection};
use lowrank::svd::{svd_soft2, SvdConfig};
use lowrank::SvdTriplets;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use sprs::{CsMat, TriMat};

const SHAPE: (usize, usize) = (300, 200);
const RANK: usize = 5;
const OBSERVED: usize = 15_000;
const LAMBDA: f64 = 2.0;
const ITERATIONS: usize = 30;

fn rmse_at_entries(x: &CsMat<f64>, z: &SvdTriplets) -> lowrank::Result<f64> {
    let (rows, cols) = nonzero(x);
    let fitted = partial_reconstruct_pq(&rows, &cols, &z.scaled_u(), &z.v)?;
    let mut sq = 0.0;
    for ((&i, &j), &v) in rows.iter().zip(&cols).zip(x.data()) {
        let f = fitted.get(i, j).copied().unwrap_or(0.0);
        sq += (v - f) * (v - f);
    }
    Ok((sq / x.nnz().max(1) as f64).sqrt())
}

/// `X - P_Ω(Z)` on the sparsity pattern of `X`.
fn residual(x: &CsMat<f64>, z: &SvdTriplets) -> lowrank::Result<CsMat<f64>> {
    let (rows, cols) = nonzero(x);
    let fitted = partial_reconstruct_pq(&rows, &cols, &z.scaled_u(), &z.v)?;
    let mut triplets = TriMat::with_capacity(x.shape(), x.nnz());
    for ((&i, &j), &v) in rows.iter().zip(&cols).zip(x.data()) {
        triplets.add_triplet(i, j, v - fitted.get(i, j).copied().unwrap_or(0.0));
    }
    Ok(triplets.to_csc())
}

fn main() -> lowrank::Result<()> {
    env_logger::init();
    let mut rng = ChaCha8Rng::seed_from_u64(2010);

    let sample = generate_sparse_low_rank2(SHAPE, RANK, OBSERVED, 4.0, &mut rng)?;
    let nnz = sample.matrix.nnz();

    // 80/20 split of the observed entries
    let mut positions: Vec<usize> = (0..nnz).collect();
    positions.shuffle(&mut rng);
    let cut = nnz * 4 / 5;
    let mut train = submatrix(&sample.matrix, &Selection::Indices(positions[..cut].to_vec()), &mut rng)?;
    let mut test = submatrix(&sample.matrix, &Selection::Indices(positions[cut..].to_vec()), &mut rng)?;
    println!("Observed {} entries: {} train, {} test", nnz, train.nnz(), test.nnz());

    let mu_rows = center_rows(&mut train, None, None)?;
    let mu_cols = center_cols(&mut train, None, None)?;
    center_rows(&mut test, Some(mu_rows.as_slice()), None)?;
    center_cols(&mut test, Some(mu_cols.as_slice()), None)?;

    let config = SvdConfig::new().with_rank(2 * RANK).with_seed(7);
    let mut z = SvdTriplets::empty(SHAPE.0, SHAPE.1);
    for it in 0..ITERATIONS {
        let r = residual(&train, &z)?;
        let next = svd_soft2(&r, &z, LAMBDA, &config)?;
        let kept: Vec<usize> = (0..next.rank()).filter(|&i| next.s[i] > 0.0).collect();
        z = next.select(&kept)?;
        info!(
            "iteration {}: rank {}, train RMSE {:.4}, test RMSE {:.4}",
            it,
            z.rank(),
            rmse_at_entries(&train, &z)?,
            rmse_at_entries(&test, &z)?
        );
    }

    println!("Final rank: {}", z.rank());
    println!("Singular values: {:?}", z.s.as_slice());
    println!("Train RMSE: {:.4}", rmse_at_entries(&train, &z)?);
    println!("Test RMSE: {:.4}", rmse_at_entries(&test, &z)?);

    uncenter(&mut test, &mu_rows, &mu_cols)?;
    println!("Test entries restored to the original scale ({} values)", test.nnz());
    Ok(())
}
