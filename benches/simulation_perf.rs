
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use xolsim::frequency::{FrequencyModel, FrequencyParameters};
use xolsim::layer::LayerGranularity;
use xolsim::metrics::{self, RiskSummary};
use xolsim::pricing::{MeasureKind, PremiumCalculator};
use xolsim::severity::{SeverityModel, SeverityParameters};
use xolsim::simulation::Execution;
use xolsim::types::Confidence;

use fixtures::{ATTRITIONAL, WORKING, build_engine, ceded_sample};

// ── Group 1: sampling - raw model draws ──────────────────────────────────────

fn bench_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling");
    for &n in &[1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("poisson", n), &n, |b, &n| {
            let mut model = FrequencyModel::new(FrequencyParameters::Poisson { lambda: 3.0 }, Some(1)).unwrap();
            b.iter(|| model.simulate(n, None).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("negative_binomial", n), &n, |b, &n| {
            let mut model =
                FrequencyModel::new(FrequencyParameters::NegativeBinomial { r: 5.0, p: 0.6 }, Some(1)).unwrap();
            b.iter(|| model.simulate(n, None).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("lognormal", n), &n, |b, &n| {
            let mut model =
                SeverityModel::new(SeverityParameters::Lognormal { mu: 10.0, sigma: 0.3 }, Some(1)).unwrap();
            b.iter(|| model.simulate(n, None))
        });
    }
    group.finish();
}

// ── Group 2: engine - trial count scaling, both granularities ────────────────

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.sample_size(20);
    for &trials in &[1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(trials as u64));
        for (name, granularity) in [("aggregate", LayerGranularity::Aggregate), ("per_claim", LayerGranularity::PerClaim)] {
            group.bench_with_input(BenchmarkId::new(name, trials), &trials, |b, &n| {
                b.iter_batched(
                    || build_engine(&WORKING, 42, granularity, Execution::Sequential),
                    |mut engine| engine.run(n).unwrap(),
                    BatchSize::LargeInput,
                )
            });
        }
    }
    group.finish();
}

// ── Group 3: parallel - sequential vs rayon on a heavy book ──────────────────

fn bench_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel");
    group.sample_size(10);
    let trials = 50_000usize;
    group.throughput(Throughput::Elements(trials as u64));
    for (name, execution) in [("sequential", Execution::Sequential), ("parallel", Execution::Parallel)] {
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter_batched(
                || build_engine(&ATTRITIONAL, 42, LayerGranularity::PerClaim, execution),
                |mut engine| engine.run(trials).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

// ── Group 4: metrics - sort-dominated risk figures ───────────────────────────

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");
    let q = Confidence::new(0.99).unwrap();
    let pml = Confidence::new(0.995).unwrap();
    let calculator = PremiumCalculator::new(MeasureKind::TailValueAtRisk, Some(0.99), 0.1, 0.05).unwrap();
    for &n in &[10_000usize, 100_000] {
        let losses = ceded_sample(n, 7);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("tvar", n), &losses, |b, l| {
            b.iter(|| metrics::tail_value_at_risk(l, 0.99).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("risk_summary", n), &losses, |b, l| {
            b.iter(|| RiskSummary::from_losses(l, q, pml).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("premium", n), &losses, |b, l| {
            b.iter(|| calculator.calculate(l).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sampling, bench_engine, bench_parallel, bench_metrics);
criterion_main!(benches);
