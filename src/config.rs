use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PricingError, Result, invalid_argument, invalid_parameter};
use crate::frequency::{DEFAULT_OVERDISPERSION_THRESHOLD, FrequencyModel, FrequencyParameters};
use crate::layer::{LayerGranularity, TreatyLayer};
use crate::metrics::DEFAULT_PML_QUANTILE;
use crate::pricing::{MeasureKind, PremiumCalculator};
use crate::rng::{self, FREQUENCY_SEED_STREAM, SEVERITY_SEED_STREAM};
use crate::severity::{SeverityModel, SeverityParameters};
use crate::simulation::{Execution, MonteCarloEngine};
use crate::types::Confidence;

/// Confidence reported alongside the pricing measure when none is configured.
pub const DEFAULT_REPORT_CONFIDENCE: f64 = 0.99;

fn default_overdispersion_threshold() -> f64 {
    DEFAULT_OVERDISPERSION_THRESHOLD
}

fn default_pml_quantile() -> f64 {
    DEFAULT_PML_QUANTILE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSection {
    pub n_trials: usize,
    /// Root seed; absent means OS entropy, fixed once at validation.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub execution: Execution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencySection {
    #[serde(flatten)]
    pub parameters: FrequencyParameters,
    #[serde(default = "default_overdispersion_threshold")]
    pub overdispersion_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeveritySection {
    #[serde(flatten)]
    pub parameters: SeverityParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReinsuranceSection {
    pub retention: f64,
    pub limit: f64,
    /// Required: the two granularities price very differently.
    pub layer_granularity: LayerGranularity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSection {
    pub expense_ratio: f64,
    #[serde(default)]
    pub profit_loading: f64,
    pub risk_measure: MeasureKind,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default = "default_pml_quantile")]
    pub pml_quantile: f64,
}

/// The input configuration as read from TOML. Unvalidated until `validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub simulation: SimulationSection,
    pub frequency: FrequencySection,
    pub severity: SeveritySection,
    pub reinsurance: ReinsuranceSection,
    pub pricing: PricingSection,
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PricingError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PricingError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Poisson(3) × Lognormal(10, 0.3), 500k xs 100k on the annual aggregate,
    /// 10k trials at seed 42, priced on expected loss.
    pub fn canonical() -> Self {
        Settings {
            simulation: SimulationSection { n_trials: 10_000, seed: Some(42), execution: Execution::Sequential },
            frequency: FrequencySection {
                parameters: FrequencyParameters::Poisson { lambda: 3.0 },
                overdispersion_threshold: DEFAULT_OVERDISPERSION_THRESHOLD,
            },
            severity: SeveritySection { parameters: SeverityParameters::Lognormal { mu: 10.0, sigma: 0.3 } },
            reinsurance: ReinsuranceSection {
                retention: 100_000.0,
                limit: 500_000.0,
                layer_granularity: LayerGranularity::Aggregate,
            },
            pricing: PricingSection {
                expense_ratio: 0.1,
                profit_loading: 0.05,
                risk_measure: MeasureKind::ExpectedLoss,
                confidence_level: Some(DEFAULT_REPORT_CONFIDENCE),
                pml_quantile: DEFAULT_PML_QUANTILE,
            },
        }
    }

    /// Check every range and build the typed objects the pipeline consumes.
    pub fn validate(&self) -> Result<RunPlan> {
        if self.simulation.n_trials == 0 {
            return Err(invalid_argument("simulation.n_trials must be > 0"));
        }

        self.frequency.parameters.validate()?;
        let threshold = self.frequency.overdispersion_threshold;
        if !(threshold > 0.0 && threshold.is_finite()) {
            return Err(invalid_parameter(format!(
                "frequency.overdispersion_threshold must be > 0, got {threshold}"
            )));
        }
        self.severity.parameters.validate()?;

        let layer = TreatyLayer::new(self.reinsurance.retention, self.reinsurance.limit)?;

        let p = &self.pricing;
        let calculator =
            PremiumCalculator::new(p.risk_measure, p.confidence_level, p.expense_ratio, p.profit_loading)?
                .with_pml_quantile(p.pml_quantile)?;
        let report_confidence = report_confidence(p.risk_measure, p.confidence_level)?;
        let pml_quantile = Confidence::new(p.pml_quantile)?;

        let seed = self.simulation.seed.unwrap_or_else(rng::entropy_seed);
        if self.simulation.seed.is_none() {
            info!(seed, "no seed configured; drew one from entropy");
        }

        Ok(RunPlan {
            n_trials: self.simulation.n_trials,
            seed,
            execution: self.simulation.execution,
            frequency: self.frequency.parameters,
            overdispersion_threshold: threshold,
            severity: self.severity.parameters,
            layer,
            granularity: self.reinsurance.layer_granularity,
            calculator,
            report_confidence,
            pml_quantile,
        })
    }
}

/// Confidence for the VaR/TVaR lines of the report. A measure that prices on
/// a confidence reports at that level; otherwise an out-of-range value is
/// ignored in favour of the default.
fn report_confidence(measure: MeasureKind, configured: Option<f64>) -> Result<Confidence> {
    match configured {
        Some(q) if measure.needs_confidence() => Confidence::new(q),
        Some(q) => Confidence::new(q).or_else(|_| {
            warn!(confidence_level = q, ?measure, "unused confidence_level out of range; ignored");
            Confidence::new(DEFAULT_REPORT_CONFIDENCE)
        }),
        None => Confidence::new(DEFAULT_REPORT_CONFIDENCE),
    }
}

/// Validated, immutable settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub n_trials: usize,
    pub seed: u64,
    pub execution: Execution,
    pub frequency: FrequencyParameters,
    pub overdispersion_threshold: f64,
    pub severity: SeverityParameters,
    pub layer: TreatyLayer,
    pub granularity: LayerGranularity,
    pub calculator: PremiumCalculator,
    pub report_confidence: Confidence,
    pub pml_quantile: Confidence,
}

impl RunPlan {
    /// Models seeded from distinct streams of the root seed.
    pub fn models(&self) -> Result<(FrequencyModel, SeverityModel)> {
        let frequency =
            FrequencyModel::new(self.frequency, Some(rng::derive_seed(self.seed, FREQUENCY_SEED_STREAM)))?;
        let severity =
            SeverityModel::new(self.severity, Some(rng::derive_seed(self.seed, SEVERITY_SEED_STREAM)))?;
        Ok((frequency, severity))
    }

    pub fn build_engine(&self) -> Result<MonteCarloEngine> {
        let (frequency, severity) = self.models()?;
        Ok(MonteCarloEngine::with_layer(frequency, severity, self.layer, self.granularity)
            .with_execution(self.execution))
    }
}
