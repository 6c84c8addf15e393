//! Criterion benchmarks for lilycast hot paths.
//!
//! Benchmarks:
//! 1. One training epoch at a reduced size
//! 2. Single-step prediction at the default lookback
//! 3. Seven-step autoregressive forecast
//! 4. Company page normalization

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lilycast_core::data::parse_company_page;
use lilycast_core::ml::{build_windows, roll_forward, ForecastModel, MinMaxScaler, ModelConfig, Window};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + (i as f64 * 0.1).sin() * 10.0 + i as f64 * 0.05).collect()
}

fn make_windows(n: usize, lookback: usize) -> (Vec<f64>, Vec<Window>) {
    let closes = make_closes(n);
    let scaled = MinMaxScaler::fit(&closes).unwrap().transform_all(&closes);
    let windows = build_windows(&scaled, lookback).unwrap();
    (scaled, windows)
}

fn trained(config: ModelConfig, windows: &[Window]) -> ForecastModel {
    let mut model = ForecastModel::new(config).unwrap();
    model.fit(windows).unwrap();
    model
}

// ── 1. Training epoch ────────────────────────────────────────────────

fn bench_training_epoch(c: &mut Criterion) {
    let mut group = c.benchmark_group("training_epoch");
    group.sample_size(10);
    for hidden in [16usize, 50] {
        let config = ModelConfig::default()
            .with_lookback(30)
            .with_hidden_units(hidden)
            .with_epochs(1);
        let (_, windows) = make_windows(300, 30);
        group.bench_with_input(BenchmarkId::from_parameter(hidden), &windows, |b, windows| {
            b.iter(|| {
                let mut model = ForecastModel::new(config.clone()).unwrap();
                black_box(model.fit(black_box(windows)).unwrap())
            })
        });
    }
    group.finish();
}

// ── 2. Single-step prediction ────────────────────────────────────────

fn bench_predict_one(c: &mut Criterion) {
    let config = ModelConfig::default().with_epochs(1);
    let (_, windows) = make_windows(200, config.lookback);
    let model = trained(config, &windows);
    let input = windows[0].input.clone();
    c.bench_function("predict_one_lookback_60", |b| {
        b.iter(|| black_box(model.predict_one(black_box(&input)).unwrap()))
    });
}

// ── 3. Autoregressive forecast ───────────────────────────────────────

fn bench_roll_forward(c: &mut Criterion) {
    let config = ModelConfig::default().with_epochs(1);
    let (scaled, windows) = make_windows(200, config.lookback);
    let model = trained(config, &windows);
    c.bench_function("roll_forward_7", |b| {
        b.iter(|| black_box(roll_forward(&model, black_box(&scaled), 7).unwrap()))
    });
}

// ── 4. Page normalization ────────────────────────────────────────────

const COMPANY: &str = r#"
    <table class="table table-bordered background-white">
      <tr><th>Last Trading Price</th><td>352.40</td><th>Closing Price</th><td>351.90</td></tr>
      <tr><th>Opening Price</th><td>350.00</td><th>Adjusted Opening Price</th><td>348.00</td></tr>
      <tr><th>Day's Range</th><td>349.00 - 355.10</td><th>Change*</th><td>2.40 0.69%</td></tr>
      <tr><th>Day's Volume (Nos.)</th><td>342,118</td><th>Yesterday's Closing Price</th><td>350.00</td></tr>
      <tr><th>52 Weeks' Moving Range</th><td>280.00 - 410.50</td><th>Market Capitalization (mn)</th><td>475,837.28</td></tr>
    </table>
    <table class="table table-bordered background-white">
      <tr><td>Face/par Value</td><td>10.00</td><td>Market Lot</td><td>1</td></tr>
      <tr><td>Sector</td><td>Telecommunication</td><td>Market Category</td><td>A</td></tr>
    </table>"#;

fn bench_company_page(c: &mut Criterion) {
    c.bench_function("parse_company_page", |b| {
        b.iter(|| black_box(parse_company_page("GP", black_box(COMPANY))))
    });
}

criterion_group!(
    benches,
    bench_training_epoch,
    bench_predict_one,
    bench_roll_forward,
    bench_company_page
);
criterion_main!(benches);
