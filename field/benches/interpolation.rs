use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use polymask_field::interpolation::interpolant;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn bench_interpolant(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpolant");
    for len in [8usize, 32, 128] {
        group.bench_function(format!("{len} points"), |b| {
            let mut rng = StdRng::seed_from_u64(len as u64);
            b.iter_batched(
                || {
                    (0..len)
                        .map(|i| (i as i64, rng.gen_range(0..1_000_000)))
                        .collect::<Vec<_>>()
                },
                |points| interpolant(&points),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_interpolant);
criterion_main!(benches);
