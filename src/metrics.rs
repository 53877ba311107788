//! Reductions of a simulated loss distribution to risk figures.
//!
//! Quantiles interpolate linearly between order statistics: for `n` sorted
//! values, `h = q·(n − 1)` and the result lies between `x[⌊h⌋]` and `x[⌊h⌋+1]`.

use serde::Serialize;

use crate::error::{PricingError, Result};
use crate::types::Confidence;

/// Conventional PML confidence. Held constant by convention; overridable.
pub const DEFAULT_PML_QUANTILE: f64 = 0.995;

fn ensure_non_empty(losses: &[f64]) -> Result<()> {
    if losses.is_empty() {
        Err(PricingError::EmptyDistribution("loss distribution has no observations".to_string()))
    } else {
        Ok(())
    }
}

fn sorted(losses: &[f64]) -> Vec<f64> {
    let mut values = losses.to_vec();
    values.sort_by(f64::total_cmp);
    values
}

/// Interpolated `q`-quantile of an already sorted, non-empty slice.
fn quantile_sorted(values: &[f64], q: f64) -> f64 {
    let n = values.len();
    let h = q * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}

/// Mean of the observations at or above `threshold`; `threshold` itself when none are.
fn tail_mean_sorted(values: &[f64], threshold: f64) -> f64 {
    let start = values.partition_point(|&x| x < threshold);
    let tail = &values[start..];
    if tail.is_empty() {
        threshold
    } else {
        // Every tail value is >= threshold; the max absorbs summation rounding.
        (tail.iter().sum::<f64>() / tail.len() as f64).max(threshold)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn expected_loss(losses: &[f64]) -> Result<f64> {
    ensure_non_empty(losses)?;
    Ok(mean(losses))
}

pub fn value_at_risk(losses: &[f64], q: f64) -> Result<f64> {
    ensure_non_empty(losses)?;
    let q = Confidence::new(q)?;
    Ok(quantile_sorted(&sorted(losses), q.value()))
}

/// Mean of losses at or above VaR(q). Always `>= value_at_risk(losses, q)`.
pub fn tail_value_at_risk(losses: &[f64], q: f64) -> Result<f64> {
    ensure_non_empty(losses)?;
    let q = Confidence::new(q)?;
    let values = sorted(losses);
    let var = quantile_sorted(&values, q.value());
    Ok(tail_mean_sorted(&values, var))
}

/// VaR at the PML confidence, kept as its own measure.
pub fn probable_maximum_loss(losses: &[f64], pml_quantile: f64) -> Result<f64> {
    value_at_risk(losses, pml_quantile)
}

/// All risk figures for one distribution, from a single sort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskSummary {
    pub n: usize,
    pub expected_loss: f64,
    pub std_dev: f64,
    pub confidence: f64,
    pub var: f64,
    pub tvar: f64,
    pub pml_quantile: f64,
    pub pml: f64,
    pub min: f64,
    pub max: f64,
}

impl RiskSummary {
    pub fn from_losses(losses: &[f64], confidence: Confidence, pml_quantile: Confidence) -> Result<Self> {
        ensure_non_empty(losses)?;
        let values = sorted(losses);
        let n = values.len();
        let expected_loss = mean(&values);
        let variance = if n > 1 {
            values.iter().map(|x| (x - expected_loss).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let var = quantile_sorted(&values, confidence.value());

        Ok(RiskSummary {
            n,
            expected_loss,
            std_dev: variance.sqrt(),
            confidence: confidence.value(),
            var,
            tvar: tail_mean_sorted(&values, var),
            pml_quantile: pml_quantile.value(),
            pml: quantile_sorted(&values, pml_quantile.value()),
            min: values[0],
            max: values[n - 1],
        })
    }
}

/// Percentile band for histogram-style reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// `None` for an empty input.
pub fn percentile_stats(values: &[f64]) -> Option<DistStats> {
    if values.is_empty() {
        return None;
    }
    let values = sorted(values);
    let n = values.len();
    let mean = mean(&values);
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(DistStats {
        n,
        min: values[0],
        p5: quantile_sorted(&values, 0.05),
        p25: quantile_sorted(&values, 0.25),
        p50: quantile_sorted(&values, 0.50),
        p75: quantile_sorted(&values, 0.75),
        p95: quantile_sorted(&values, 0.95),
        max: values[n - 1],
        mean,
        std_dev: variance.sqrt(),
    })
}
