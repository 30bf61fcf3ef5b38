use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use lowrank::center::{center_cols, center_rows};
use lowrank::generate::LowRankGenerator;
use lowrank::reconstruct::partial_reconstruct_pq;
use lowrank::sparse::{csc_to_arrays, nonzero};
use lowrank::svd::{svd_sparse_low_rank, SvdConfig, SvdSolver};
use lowrank::SvdTriplets;
use sprs::CsMat;
use std::hint::black_box;
use std::time::Duration;

/// Noisy rank-10 matrix observed at `density` of its entries.
fn setup_sparse(shape: (usize, usize), density: f64, seed: u64) -> (CsMat<f64>, SvdTriplets) {
    let k = (density * (shape.0 * shape.1) as f64) as usize;
    let sample = LowRankGenerator::new(shape)
        .with_rank(10)
        .with_noise(0.01)
        .with_seed(seed)
        .sparse(k)
        .expect("generator parameters are valid");
    (sample.matrix, sample.factors)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    // Group 1: solvers on sparse + low-rank operators
    let mut group_svd = c.benchmark_group("svd_sparse_low_rank");
    group_svd.warm_up_time(Duration::from_millis(500));
    group_svd.measurement_time(Duration::from_secs(3));
    group_svd.sample_size(20);

    for &n in &[200, 500, 1000] {
        for solver in [SvdSolver::Propack, SvdSolver::Arpack] {
            let config = SvdConfig::new().with_rank(10).with_solver(solver);
            group_svd.bench_function(BenchmarkId::new(format!("{:?}", solver), n), |b| {
                b.iter_batched(
                    || setup_sparse((n, n / 2), 0.05, 42),
                    |(x, low_rank)| {
                        let out = svd_sparse_low_rank(&x, &low_rank, &config);
                        black_box(out)
                    },
                    BatchSize::LargeInput,
                )
            });
        }
    }
    group_svd.finish();

    // Group 2: partial reconstruction at the observed entries
    let mut group_rec = c.benchmark_group("partial_reconstruct_pq");
    group_rec.sample_size(30);

    for &density in &[0.01, 0.05, 0.2] {
        let (x, low_rank) = setup_sparse((1000, 800), density, 7);
        let (rows, cols) = nonzero(&x);
        let p = low_rank.scaled_u();
        group_rec.bench_function(BenchmarkId::new("density", density), |b| {
            b.iter(|| black_box(partial_reconstruct_pq(&rows, &cols, &p, &low_rank.v)))
        });
    }
    group_rec.finish();

    // Group 3: centering and packing
    let mut group_prep = c.benchmark_group("preprocessing");
    group_prep.sample_size(30);

    let (x, _) = setup_sparse((2000, 1000), 0.05, 3);
    group_prep.bench_function("center_rows_cols", |b| {
        b.iter_batched(
            || x.clone(),
            |mut x| {
                let mu_rows = center_rows(&mut x, None, None);
                let mu_cols = center_cols(&mut x, None, None);
                black_box((mu_rows, mu_cols))
            },
            BatchSize::LargeInput,
        )
    });
    group_prep.bench_function("csc_to_arrays", |b| b.iter(|| black_box(csc_to_arrays(&x))));
    group_prep.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
