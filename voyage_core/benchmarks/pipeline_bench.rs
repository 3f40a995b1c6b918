use std::sync::Arc;

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use voyage_core::{
    required_keys, DelayModelConfig, FetchProfile, MarineObservation, Observation,
    ObservationCache, PortRegistry, RowAssembler, SampleGenerator, SyntheticConfig,
    WeatherObservation,
};

const BATCH_SIZES: [usize; 3] = [500, 2_000, 5_000];

fn draw_samples(profile: &FetchProfile, count: usize) -> Vec<voyage_core::RouteSample> {
    let mut sampler = SampleGenerator::new(
        PortRegistry::builtin(),
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        42,
    );
    sampler.draw_batch(profile, count)
}

fn warmed_cache(
    samples: &[voyage_core::RouteSample],
    profile: &FetchProfile,
) -> Arc<ObservationCache> {
    let cache = Arc::new(ObservationCache::new());
    let keys = required_keys(samples, profile);
    for key in keys.weather {
        cache.put(
            key,
            Some(Observation::Weather(WeatherObservation {
                max_wind_knots: 12.0,
                rain_mm: 1.5,
                temp_c: 21.0,
            })),
        );
    }
    // Every other marine cell is absent so the fallback path is exercised.
    for (index, key) in keys.marine.into_iter().enumerate() {
        let value = (index % 2 == 0).then_some(Observation::Marine(MarineObservation {
            max_wave_m: 1.4,
        }));
        cache.put(key, value);
    }
    cache
}

fn bench_required_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("required_keys");
    let profile = FetchProfile::new(3, vec![0.3, 0.5, 0.7]);
    for size in BATCH_SIZES {
        let samples = draw_samples(&profile, size);
        group.bench_with_input(BenchmarkId::new("three_points", size), &samples, |b, samples| {
            b.iter(|| black_box(required_keys(samples, &profile)));
        });
    }
    group.finish();
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_warmed");
    let profile = FetchProfile::new(2, vec![0.4, 0.7]);
    for size in BATCH_SIZES {
        let samples = draw_samples(&profile, size);
        let cache = warmed_cache(&samples, &profile);
        let assembler = RowAssembler::new(
            cache,
            SyntheticConfig::default(),
            DelayModelConfig::default(),
            0.2,
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("batch", size), &samples, |b, samples| {
            b.iter_batched(
                || ChaCha8Rng::seed_from_u64(7),
                |mut rng| {
                    let rows = samples
                        .iter()
                        .filter_map(|sample| assembler.assemble(sample, &profile, &mut rng))
                        .count();
                    black_box(rows)
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_required_keys, bench_assembly);
criterion_main!(benches);
