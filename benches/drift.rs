use chrono::{Duration, NaiveDate};
use citibike_mlops::drift::{ks_p_value, ColumnMapping, DriftMetricsEngine};
use citibike_mlops::features::{FeatureBuilder, FeatureFrame, Observation, UsFederalHolidays, Weather, PREDICTION_COLUMN, TARGET_COLUMN};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rand::prelude::*;

fn scored_frame(start: NaiveDate, days: i64, rng: &mut StdRng) -> FeatureFrame {
    let observations: Vec<Observation> = (0..days * 24)
        .map(|h| {
            let tmax = rng.gen::<f64>() * 30.0;
            Observation {
                timestamp: start.and_hms_opt(0, 0, 0).unwrap() + Duration::hours(h),
                weather: Weather { tmax, tmin: tmax - 8.0, snow: 0.0 },
                holiday: None,
                trips: Some(200.0 + tmax * 25.0 + rng.gen::<f64>() * 50.0),
            }
        })
        .collect();
    let frame = FeatureBuilder::new(UsFederalHolidays::new()).build_frame(&observations).unwrap();
    let predictions: Array1<f64> = frame.column(TARGET_COLUMN).unwrap().mapv(|t| t + rng.gen::<f64>() * 10.0 - 5.0);
    frame.with_column(PREDICTION_COLUMN, predictions).unwrap()
}

fn bench_ks(c: &mut Criterion) {
    let mut group = c.benchmark_group("ks_p_value");
    let mut rng = StdRng::seed_from_u64(7);

    for n in [1_000, 10_000, 100_000].iter() {
        let a: Vec<f64> = (0..*n).map(|_| rng.gen()).collect();
        let b: Vec<f64> = (0..*n).map(|_| rng.gen::<f64>() + 0.01).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &(a, b), |bench, (a, b)| {
            bench.iter(|| ks_p_value(black_box(a), black_box(b)))
        });
    }

    group.finish();
}

fn bench_weekly_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("drift_metrics");
    group.sample_size(10);
    let mut rng = StdRng::seed_from_u64(42);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let reference = scored_frame(start, 90, &mut rng);
    let engine = DriftMetricsEngine::new(ColumnMapping::default());

    for weeks in [4, 13, 52].iter() {
        let current = scored_frame(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), weeks * 7, &mut rng);
        group.bench_with_input(BenchmarkId::new("weeks", weeks), &current, |b, current| {
            b.iter(|| engine.compute(black_box(&reference), black_box(current)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ks, bench_weekly_metrics);
criterion_main!(benches);
