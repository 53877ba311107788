use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma, Poisson};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PricingError, Result, invalid_argument, invalid_parameter};
use crate::rng::{self, PRIMARY_STREAM};

/// Sample variance above `threshold × mean` switches a Poisson fit to
/// negative binomial. A rule of thumb for overdispersion, not a test.
pub const DEFAULT_OVERDISPERSION_THRESHOLD: f64 = 1.2;

/// Claim-count distribution family and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum FrequencyParameters {
    /// N ~ Poisson(λ).
    Poisson {
        #[serde(alias = "lam")]
        lambda: f64,
    },
    /// Failures before the r-th success, success probability p.
    /// E[N] = r(1−p)/p, Var[N] = r(1−p)/p².
    NegativeBinomial { r: f64, p: f64 },
}

/// Family tag without parameters; what a fit starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyFamily {
    Poisson,
    NegativeBinomial,
}

impl FrequencyParameters {
    pub fn poisson(lambda: f64) -> Result<Self> {
        let params = FrequencyParameters::Poisson { lambda };
        params.validate()?;
        Ok(params)
    }

    pub fn negative_binomial(r: f64, p: f64) -> Result<Self> {
        let params = FrequencyParameters::NegativeBinomial { r, p };
        params.validate()?;
        Ok(params)
    }

    /// Check the range invariants. Deserialized parameters must pass through here.
    pub fn validate(&self) -> Result<()> {
        match *self {
            FrequencyParameters::Poisson { lambda } => {
                if !(lambda > 0.0 && lambda.is_finite()) {
                    return Err(invalid_parameter(format!("Poisson lambda must be > 0, got {lambda}")));
                }
            }
            FrequencyParameters::NegativeBinomial { r, p } => {
                if !(r > 0.0 && r.is_finite()) {
                    return Err(invalid_parameter(format!("negative binomial r must be > 0, got {r}")));
                }
                if !(p > 0.0 && p < 1.0) {
                    return Err(invalid_parameter(format!(
                        "negative binomial p must be in (0, 1), got {p}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn family(&self) -> FrequencyFamily {
        match self {
            FrequencyParameters::Poisson { .. } => FrequencyFamily::Poisson,
            FrequencyParameters::NegativeBinomial { .. } => FrequencyFamily::NegativeBinomial,
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            FrequencyParameters::Poisson { lambda } => lambda,
            FrequencyParameters::NegativeBinomial { r, p } => r * (1.0 - p) / p,
        }
    }

    pub fn variance(&self) -> f64 {
        match *self {
            FrequencyParameters::Poisson { lambda } => lambda,
            FrequencyParameters::NegativeBinomial { r, p } => r * (1.0 - p) / (p * p),
        }
    }
}

/// Pre-built `rand_distr` sampler so per-draw sampling cannot fail.
#[derive(Debug, Clone)]
enum CountSampler {
    Poisson(Poisson<f64>),
    /// Gamma–Poisson mixture: Λ ~ Gamma(r, (1−p)/p), N ~ Poisson(Λ).
    GammaPoisson(Gamma<f64>),
}

impl CountSampler {
    fn build(params: &FrequencyParameters) -> Result<Self> {
        params.validate()?;
        match *params {
            FrequencyParameters::Poisson { lambda } => Poisson::new(lambda)
                .map(CountSampler::Poisson)
                .map_err(|e| invalid_parameter(format!("Poisson({lambda}): {e}"))),
            FrequencyParameters::NegativeBinomial { r, p } => Gamma::new(r, (1.0 - p) / p)
                .map(CountSampler::GammaPoisson)
                .map_err(|e| invalid_parameter(format!("NegativeBinomial({r}, {p}): {e}"))),
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match self {
            CountSampler::Poisson(dist) => dist.sample(rng) as u64,
            CountSampler::GammaPoisson(mixing) => {
                let lambda = mixing.sample(rng);
                // A Gamma draw can underflow to zero for small r; that year is claim-free.
                match Poisson::new(lambda) {
                    Ok(dist) => dist.sample(rng) as u64,
                    Err(_) => 0,
                }
            }
        }
    }
}

/// Anything that yields one annual claim count per call.
///
/// `fork` hands out an independent copy positioned on `stream`, used by the
/// engine to give each parallel chunk its own generator.
pub trait ClaimCountSource: Send + Sync {
    fn next_count(&mut self) -> u64;
    fn fork(&self, stream: u64) -> Self
    where
        Self: Sized;
}

/// A frequency distribution bound to its own seeded generator.
#[derive(Debug, Clone)]
pub struct FrequencyModel {
    params: FrequencyParameters,
    sampler: CountSampler,
    seed: u64,
    rng: ChaCha20Rng,
}

impl FrequencyModel {
    /// `seed = None` draws a seed from OS entropy; `seed()` reports it afterwards.
    pub fn new(params: FrequencyParameters, seed: Option<u64>) -> Result<Self> {
        let sampler = CountSampler::build(&params)?;
        let seed = seed.unwrap_or_else(rng::entropy_seed);
        debug!(?params, seed, "frequency model constructed");
        Ok(FrequencyModel { params, sampler, seed, rng: rng::stream_rng(seed, PRIMARY_STREAM) })
    }

    /// Draw `n_years` annual claim counts. A supplied `seed` restarts the
    /// model's stream first, so equal seeds give equal sequences.
    pub fn simulate(&mut self, n_years: usize, seed: Option<u64>) -> Result<Vec<u64>> {
        if n_years == 0 {
            return Err(invalid_argument("n_years must be > 0"));
        }
        if let Some(seed) = seed {
            self.reseed(seed);
        }
        Ok((0..n_years).map(|_| self.next_count()).collect())
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = rng::stream_rng(seed, PRIMARY_STREAM);
    }

    pub fn params(&self) -> &FrequencyParameters {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn mean(&self) -> f64 {
        self.params.mean()
    }

    pub fn variance(&self) -> f64 {
        self.params.variance()
    }

    /// Choose and moment-match a frequency distribution from observed yearly counts.
    ///
    /// Starts from `configured`. A Poisson start switches to negative binomial when
    /// the sample variance exceeds `overdispersion_threshold × mean`. Negative
    /// binomial is matched by r = m²/(v − m), p = r/(r + m) and falls back to
    /// Poisson(m) when v ≤ m, where that parameterisation degenerates.
    pub fn fit(
        counts: &[u64],
        configured: FrequencyFamily,
        overdispersion_threshold: f64,
    ) -> Result<FitReport> {
        if counts.len() < 2 {
            return Err(PricingError::InsufficientData(format!(
                "frequency fit needs at least 2 yearly counts, got {}",
                counts.len()
            )));
        }
        if !(overdispersion_threshold > 0.0 && overdispersion_threshold.is_finite()) {
            return Err(invalid_parameter(format!(
                "overdispersion threshold must be > 0, got {overdispersion_threshold}"
            )));
        }

        let n = counts.len() as f64;
        let mean = counts.iter().map(|&c| c as f64).sum::<f64>() / n;
        let variance =
            counts.iter().map(|&c| (c as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0);

        let family = match configured {
            FrequencyFamily::Poisson if variance > overdispersion_threshold * mean => {
                FrequencyFamily::NegativeBinomial
            }
            other => other,
        };

        let parameters = match family {
            FrequencyFamily::NegativeBinomial if variance > mean => {
                let r = mean * mean / (variance - mean);
                FrequencyParameters::negative_binomial(r, r / (r + mean))?
            }
            _ => FrequencyParameters::poisson(mean)?,
        };

        debug!(
            sample_mean = mean,
            sample_variance = variance,
            threshold = overdispersion_threshold,
            ?configured,
            selected = ?parameters.family(),
            "frequency fit"
        );

        Ok(FitReport { observations: counts.len(), sample_mean: mean, sample_variance: variance, parameters })
    }
}

impl ClaimCountSource for FrequencyModel {
    fn next_count(&mut self) -> u64 {
        self.sampler.sample(&mut self.rng)
    }

    fn fork(&self, stream: u64) -> Self {
        FrequencyModel {
            params: self.params,
            sampler: self.sampler.clone(),
            seed: self.seed,
            rng: rng::stream_rng(self.seed, stream),
        }
    }
}

/// Outcome of `FrequencyModel::fit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitReport {
    pub observations: usize,
    pub sample_mean: f64,
    /// Unbiased (divisor n − 1).
    pub sample_variance: f64,
    pub parameters: FrequencyParameters,
}
