use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PricingError, Result, invalid_argument};
use crate::frequency::{ClaimCountSource, FrequencyModel};
use crate::layer::{LayerGranularity, TreatyLayer};
use crate::severity::{ClaimSizeSource, SeverityModel};

/// Trials per parallel chunk. Chunk `k` draws from stream `k + 1` of each
/// model's seed, so parallel output depends on the seed and the trial count
/// only, never on the number of worker threads.
pub const CHUNK_TRIALS: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    /// Trials in order on the calling thread, drawing from the models' own streams.
    #[default]
    Sequential,
    /// Trials partitioned into `CHUNK_TRIALS` chunks across the rayon pool.
    Parallel,
}

/// Lifecycle of one engine. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Cooperative cancellation flag, honoured between trials only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One simulated treaty year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrialOutcome {
    pub claims: u64,
    pub gross: f64,
    pub ceded: f64,
}

/// Per-trial outcomes of one engine run, in trial order. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    trials: Vec<TrialOutcome>,
}

impl SimulationResult {
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[TrialOutcome] {
        &self.trials
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrialOutcome> {
        self.trials.iter()
    }

    pub fn gross_losses(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.gross).collect()
    }

    pub fn ceded_losses(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.ceded).collect()
    }

    /// Number of trials in which the layer paid something.
    pub fn attaching_years(&self) -> usize {
        self.trials.iter().filter(|t| t.ceded > 0.0).count()
    }
}

impl<'a> IntoIterator for &'a SimulationResult {
    type Item = &'a TrialOutcome;
    type IntoIter = std::slice::Iter<'a, TrialOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.trials.iter()
    }
}

/// Frequency × severity × layer over independent simulated years.
pub struct MonteCarloEngine<F = FrequencyModel, S = SeverityModel> {
    frequency: F,
    severity: S,
    layer: TreatyLayer,
    granularity: LayerGranularity,
    execution: Execution,
    cancel: Option<CancelToken>,
    state: EngineState,
}

impl<F: ClaimCountSource, S: ClaimSizeSource> MonteCarloEngine<F, S> {
    /// Validates the layer bounds as call-time arguments.
    pub fn new(
        frequency: F,
        severity: S,
        retention: f64,
        limit: f64,
        granularity: LayerGranularity,
    ) -> Result<Self> {
        let layer = TreatyLayer::new(retention, limit).map_err(|e| match e {
            PricingError::InvalidParameter(msg) => PricingError::InvalidArgument(msg),
            other => other,
        })?;
        Ok(Self::with_layer(frequency, severity, layer, granularity))
    }

    pub fn with_layer(
        frequency: F,
        severity: S,
        layer: TreatyLayer,
        granularity: LayerGranularity,
    ) -> Self {
        MonteCarloEngine {
            frequency,
            severity,
            layer,
            granularity,
            execution: Execution::Sequential,
            cancel: None,
            state: EngineState::Idle,
        }
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn layer(&self) -> &TreatyLayer {
        &self.layer
    }

    pub fn granularity(&self) -> LayerGranularity {
        self.granularity
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Simulate `n_trials` independent years.
    ///
    /// Argument errors leave the engine `Idle`. Once running, any failure moves
    /// it to `Failed` and discards every completed trial.
    pub fn run(&mut self, n_trials: usize) -> Result<SimulationResult> {
        if self.state != EngineState::Idle {
            return Err(PricingError::InvalidState(format!(
                "run requested on a {:?} engine",
                self.state
            )));
        }
        if n_trials == 0 {
            return Err(invalid_argument("n_trials must be > 0"));
        }

        self.state = EngineState::Running;
        info!(
            n_trials,
            granularity = ?self.granularity,
            execution = ?self.execution,
            retention = self.layer.retention(),
            limit = self.layer.limit(),
            "simulation started"
        );
        let started = Instant::now();

        let outcome = match self.execution {
            Execution::Sequential => self.run_sequential(n_trials),
            Execution::Parallel => self.run_parallel(n_trials),
        };

        match outcome {
            Ok(trials) => {
                self.state = EngineState::Completed;
                let result = SimulationResult { trials };
                info!(
                    n_trials,
                    attaching_years = result.attaching_years(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "simulation completed"
                );
                Ok(result)
            }
            Err(e) => {
                self.state = EngineState::Failed;
                warn!(error = %e, "simulation failed");
                Err(e)
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn run_sequential(&mut self, n_trials: usize) -> Result<Vec<TrialOutcome>> {
        let mut trials = Vec::with_capacity(n_trials);
        let mut claims = Vec::new();
        for i in 0..n_trials {
            if self.cancelled() {
                return Err(cancelled_after(i, n_trials));
            }
            trials.push(simulate_year(
                &mut self.frequency,
                &mut self.severity,
                &self.layer,
                self.granularity,
                &mut claims,
            )?);
        }
        Ok(trials)
    }

    fn run_parallel(&self, n_trials: usize) -> Result<Vec<TrialOutcome>> {
        let n_chunks = n_trials.div_ceil(CHUNK_TRIALS);
        let chunks: Vec<Vec<TrialOutcome>> = (0..n_chunks)
            .into_par_iter()
            .map(|k| {
                let stream = k as u64 + 1;
                let mut frequency = self.frequency.fork(stream);
                let mut severity = self.severity.fork(stream);
                let start = k * CHUNK_TRIALS;
                let end = (start + CHUNK_TRIALS).min(n_trials);
                let mut claims = Vec::new();
                (start..end)
                    .map(|i| {
                        if self.cancelled() {
                            return Err(cancelled_after(i, n_trials));
                        }
                        simulate_year(
                            &mut frequency,
                            &mut severity,
                            &self.layer,
                            self.granularity,
                            &mut claims,
                        )
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(chunks.concat())
    }
}

fn cancelled_after(done: usize, n_trials: usize) -> PricingError {
    PricingError::RunAborted(format!("cancelled at trial {done} of {n_trials}"))
}

/// One year: count, then (only if non-zero) severities, then the layer.
fn simulate_year<F: ClaimCountSource, S: ClaimSizeSource>(
    frequency: &mut F,
    severity: &mut S,
    layer: &TreatyLayer,
    granularity: LayerGranularity,
    claims: &mut Vec<f64>,
) -> Result<TrialOutcome> {
    let count = frequency.next_count();
    if count == 0 {
        return Ok(TrialOutcome::default());
    }

    claims.clear();
    claims.extend((0..count).map(|_| severity.next_claim()));
    let gross: f64 = claims.iter().sum();
    if !gross.is_finite() {
        return Err(PricingError::RunAborted(format!(
            "non-finite annual loss from {count} claims"
        )));
    }

    Ok(TrialOutcome { claims: count, gross, ceded: layer.annual_ceded(granularity, claims, gross) })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::frequency::FrequencyParameters;
    use crate::metrics;
    use crate::pricing::{MeasureKind, PremiumCalculator};
    use crate::severity::SeverityParameters;

    /// Replays a fixed cycle of claim counts.
    #[derive(Clone)]
    struct ScriptedCounts {
        counts: Vec<u64>,
        next: usize,
    }

    impl ClaimCountSource for ScriptedCounts {
        fn next_count(&mut self) -> u64 {
            let c = self.counts[self.next % self.counts.len()];
            self.next += 1;
            c
        }

        fn fork(&self, _stream: u64) -> Self {
            self.clone()
        }
    }

    /// Constant claim size with a shared draw counter.
    #[derive(Clone)]
    struct CountingClaims {
        amount: f64,
        draws: Arc<AtomicUsize>,
    }

    impl ClaimSizeSource for CountingClaims {
        fn next_claim(&mut self) -> f64 {
            self.draws.fetch_add(1, Ordering::Relaxed);
            self.amount
        }

        fn fork(&self, _stream: u64) -> Self {
            self.clone()
        }
    }

    fn reference_engine(seed: u64, granularity: LayerGranularity) -> MonteCarloEngine {
        let frequency = FrequencyModel::new(FrequencyParameters::Poisson { lambda: 3.0 }, Some(seed)).unwrap();
        let severity =
            SeverityModel::new(SeverityParameters::Lognormal { mu: 10.0, sigma: 0.3 }, Some(seed + 1)).unwrap();
        MonteCarloEngine::new(frequency, severity, 100_000.0, 500_000.0, granularity).unwrap()
    }

    #[test]
    fn result_length_matches_trials() {
        let mut engine = reference_engine(42, LayerGranularity::Aggregate);
        let result = engine.run(2_500).unwrap();
        assert_eq!(result.len(), 2_500);
        assert_eq!(engine.state(), EngineState::Completed);
    }

    #[test]
    fn zero_claim_year_draws_no_severity() {
        let draws = Arc::new(AtomicUsize::new(0));
        let severity = CountingClaims { amount: 250_000.0, draws: Arc::clone(&draws) };
        let frequency = ScriptedCounts { counts: vec![0, 2, 0, 0, 1], next: 0 };
        let mut engine =
            MonteCarloEngine::new(frequency, severity, 100_000.0, 500_000.0, LayerGranularity::Aggregate)
                .unwrap();

        let result = engine.run(5).unwrap();
        assert_eq!(draws.load(Ordering::Relaxed), 3, "only claim-bearing years draw severities");

        let t = result.trials();
        for i in [0, 2, 3] {
            assert_eq!(t[i], TrialOutcome { claims: 0, gross: 0.0, ceded: 0.0 });
        }
        assert_eq!(t[1], TrialOutcome { claims: 2, gross: 500_000.0, ceded: 400_000.0 });
        assert_eq!(t[4], TrialOutcome { claims: 1, gross: 250_000.0, ceded: 150_000.0 });
    }

    #[test]
    fn per_claim_and_aggregate_differ() {
        let severity = CountingClaims { amount: 80_000.0, draws: Arc::new(AtomicUsize::new(0)) };
        let frequency = ScriptedCounts { counts: vec![3], next: 0 };
        let run = |g| {
            let mut engine =
                MonteCarloEngine::new(frequency.clone(), severity.clone(), 100_000.0, 500_000.0, g).unwrap();
            engine.run(4).unwrap().ceded_losses()
        };
        assert_eq!(run(LayerGranularity::PerClaim), vec![0.0; 4]);
        assert_eq!(run(LayerGranularity::Aggregate), vec![140_000.0; 4]);
    }

    #[test]
    fn rejects_zero_trials_and_stays_idle() {
        let mut engine = reference_engine(1, LayerGranularity::Aggregate);
        assert!(matches!(engine.run(0), Err(PricingError::InvalidArgument(_))));
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.run(10).is_ok());
    }

    #[test]
    fn rejects_bad_layer_at_construction() {
        let frequency = FrequencyModel::new(FrequencyParameters::Poisson { lambda: 1.0 }, Some(1)).unwrap();
        let severity = SeverityModel::new(SeverityParameters::Exponential { rate: 1.0 }, Some(2)).unwrap();
        assert!(matches!(
            MonteCarloEngine::new(frequency.clone(), severity.clone(), -1.0, 10.0, LayerGranularity::Aggregate),
            Err(PricingError::InvalidArgument(_))
        ));
        assert!(matches!(
            MonteCarloEngine::new(frequency, severity, 0.0, 0.0, LayerGranularity::PerClaim),
            Err(PricingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn completed_engine_is_terminal() {
        let mut engine = reference_engine(1, LayerGranularity::Aggregate);
        engine.run(10).unwrap();
        assert!(matches!(engine.run(10), Err(PricingError::InvalidState(_))));
        assert_eq!(engine.state(), EngineState::Completed);
    }

    #[test]
    fn cancellation_fails_the_run_without_partial_result() {
        let token = CancelToken::new();
        token.cancel();
        let mut engine = reference_engine(1, LayerGranularity::Aggregate).with_cancel_token(token);
        assert!(matches!(engine.run(100), Err(PricingError::RunAborted(_))));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[test]
    fn non_finite_loss_fails_the_run() {
        let severity = CountingClaims { amount: f64::MAX, draws: Arc::new(AtomicUsize::new(0)) };
        let frequency = ScriptedCounts { counts: vec![2], next: 0 };
        let mut engine =
            MonteCarloEngine::new(frequency, severity, 0.0, 1.0, LayerGranularity::Aggregate).unwrap();
        assert!(matches!(engine.run(3), Err(PricingError::RunAborted(_))));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[test]
    fn same_seed_same_result() {
        let run = || reference_engine(42, LayerGranularity::Aggregate).run(3_000).unwrap();
        assert_eq!(run(), run());
    }

    #[test]
    fn different_seeds_differ() {
        let a = reference_engine(1, LayerGranularity::Aggregate).run(500).unwrap();
        let b = reference_engine(2, LayerGranularity::Aggregate).run(500).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parallel_result_independent_of_thread_count() {
        let n = 3 * CHUNK_TRIALS + 17;
        let run_on = |threads: usize| {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
            pool.install(|| {
                reference_engine(7, LayerGranularity::Aggregate)
                    .with_execution(Execution::Parallel)
                    .run(n)
                    .unwrap()
            })
        };
        let single = run_on(1);
        assert_eq!(single.len(), n);
        assert_eq!(single, run_on(4));
    }

    #[test]
    fn parallel_and_sequential_agree_statistically() {
        let seq = reference_engine(11, LayerGranularity::Aggregate).run(20_000).unwrap();
        let par = reference_engine(11, LayerGranularity::Aggregate)
            .with_execution(Execution::Parallel)
            .run(20_000)
            .unwrap();
        let mean = |v: Vec<f64>| v.iter().sum::<f64>() / v.len() as f64;
        assert_relative_eq!(mean(seq.gross_losses()), mean(par.gross_losses()), max_relative = 0.03);
    }

    /// Poisson(3) × Lognormal(10, 0.3), aggregate layer 500k xs 100k.
    /// A 400k-trial reference run puts the expected ceded loss at ≈ 6_550
    /// with a standard error of ≈ 176 at 10k trials.
    #[test]
    fn reference_scenario_expected_loss_band() {
        let mut engine = reference_engine(42, LayerGranularity::Aggregate);
        let result = engine.run(10_000).unwrap();
        let ceded = result.ceded_losses();

        let premium = PremiumCalculator::new(MeasureKind::ExpectedLoss, None, 0.0, 0.0)
            .unwrap()
            .calculate(&ceded)
            .unwrap();
        assert!(
            (5_800.0..=7_300.0).contains(&premium.risk_premium),
            "expected loss {} outside reference band",
            premium.risk_premium
        );

        let tvar = metrics::tail_value_at_risk(&ceded, 0.99).unwrap();
        assert!(premium.risk_premium < tvar, "EL {} must be below TVaR99 {tvar}", premium.risk_premium);

        let gross_mean = result.gross_losses().iter().sum::<f64>() / 10_000.0;
        assert_relative_eq!(gross_mean, 3.0 * (10.045_f64).exp(), max_relative = 0.03);
    }

    #[test]
    fn reference_scenario_per_claim_rarely_attaches() {
        // Single claims of Lognormal(10, 0.3) essentially never reach 100k.
        let result = reference_engine(42, LayerGranularity::PerClaim).run(10_000).unwrap();
        assert!(result.attaching_years() < 10);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn ceded_bounded_for_any_trial_count(
            n_trials in 1usize..400,
            seed in any::<u64>(),
            retention in 0.0f64..200_000.0,
            limit in 1.0f64..400_000.0,
            per_claim in any::<bool>(),
        ) {
            let granularity = if per_claim { LayerGranularity::PerClaim } else { LayerGranularity::Aggregate };
            let frequency = FrequencyModel::new(FrequencyParameters::Poisson { lambda: 3.0 }, Some(seed)).unwrap();
            let severity = SeverityModel::new(
                SeverityParameters::Lognormal { mu: 10.5, sigma: 0.8 },
                Some(seed.wrapping_add(1)),
            ).unwrap();
            let mut engine = MonteCarloEngine::new(frequency, severity, retention, limit, granularity).unwrap();
            let result = engine.run(n_trials).unwrap();
            prop_assert_eq!(result.len(), n_trials);
            for t in &result {
                prop_assert!(t.gross >= 0.0);
                prop_assert!(t.ceded >= 0.0);
                prop_assert!(t.ceded <= t.gross.min(limit));
            }
        }
    }
}
