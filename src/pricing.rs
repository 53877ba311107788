use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result, invalid_argument, invalid_parameter};
use crate::metrics::{self, DEFAULT_PML_QUANTILE};
use crate::types::Confidence;

/// Risk measure as named in configuration, before a confidence is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasureKind {
    #[serde(rename = "expected_loss")]
    ExpectedLoss,
    #[serde(rename = "VaR", alias = "var")]
    ValueAtRisk,
    #[serde(rename = "TVaR", alias = "tvar")]
    TailValueAtRisk,
    #[serde(rename = "PML", alias = "pml")]
    ProbableMaximumLoss,
}

impl MeasureKind {
    /// VaR and TVaR take a caller-chosen confidence; the others do not.
    pub fn needs_confidence(self) -> bool {
        matches!(self, MeasureKind::ValueAtRisk | MeasureKind::TailValueAtRisk)
    }
}

/// A risk measure with every level it needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RiskMeasure {
    ExpectedLoss,
    ValueAtRisk(Confidence),
    TailValueAtRisk(Confidence),
    /// Carries the PML quantile, which is a convention rather than a free choice.
    ProbableMaximumLoss(Confidence),
}

impl RiskMeasure {
    /// Attach levels to `kind`. A confidence is required for VaR / TVaR and
    /// ignored for the other measures.
    pub fn resolve(kind: MeasureKind, confidence: Option<f64>, pml_quantile: f64) -> Result<Self> {
        let level = || {
            confidence
                .ok_or_else(|| {
                    PricingError::MissingParameter(format!(
                        "confidence_level is required for {kind:?}"
                    ))
                })
                .and_then(Confidence::new)
        };
        Ok(match kind {
            MeasureKind::ExpectedLoss => RiskMeasure::ExpectedLoss,
            MeasureKind::ValueAtRisk => RiskMeasure::ValueAtRisk(level()?),
            MeasureKind::TailValueAtRisk => RiskMeasure::TailValueAtRisk(level()?),
            MeasureKind::ProbableMaximumLoss => {
                RiskMeasure::ProbableMaximumLoss(Confidence::new(pml_quantile)?)
            }
        })
    }

    pub fn kind(&self) -> MeasureKind {
        match self {
            RiskMeasure::ExpectedLoss => MeasureKind::ExpectedLoss,
            RiskMeasure::ValueAtRisk(_) => MeasureKind::ValueAtRisk,
            RiskMeasure::TailValueAtRisk(_) => MeasureKind::TailValueAtRisk,
            RiskMeasure::ProbableMaximumLoss(_) => MeasureKind::ProbableMaximumLoss,
        }
    }

    pub fn evaluate(&self, losses: &[f64]) -> Result<f64> {
        match *self {
            RiskMeasure::ExpectedLoss => metrics::expected_loss(losses),
            RiskMeasure::ValueAtRisk(q) => metrics::value_at_risk(losses, q.value()),
            RiskMeasure::TailValueAtRisk(q) => metrics::tail_value_at_risk(losses, q.value()),
            RiskMeasure::ProbableMaximumLoss(q) => metrics::probable_maximum_loss(losses, q.value()),
        }
    }
}

/// Risk premium and the two loaded premiums built on it.
/// `commercial_premium >= technical_premium >= risk_premium >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PremiumBreakdown {
    pub risk_premium: f64,
    pub technical_premium: f64,
    pub commercial_premium: f64,
}

impl PremiumBreakdown {
    /// Commercial premium as a fraction of the layer limit.
    pub fn rate_on_line(&self, limit: f64) -> f64 {
        if limit > 0.0 { self.commercial_premium / limit } else { 0.0 }
    }
}

/// Turns a ceded-loss distribution into premiums.
///
/// technical = risk × (1 + expense_ratio), commercial = technical × (1 + profit_loading).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PremiumCalculator {
    measure: RiskMeasure,
    expense_ratio: f64,
    profit_loading: f64,
}

impl PremiumCalculator {
    pub fn new(
        kind: MeasureKind,
        confidence: Option<f64>,
        expense_ratio: f64,
        profit_loading: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&expense_ratio) {
            return Err(invalid_parameter(format!(
                "expense_ratio must be in [0, 1], got {expense_ratio}"
            )));
        }
        if !(profit_loading >= 0.0 && profit_loading.is_finite()) {
            return Err(invalid_parameter(format!(
                "profit_loading must be >= 0, got {profit_loading}"
            )));
        }
        let measure = RiskMeasure::resolve(kind, confidence, DEFAULT_PML_QUANTILE)?;
        Ok(PremiumCalculator { measure, expense_ratio, profit_loading })
    }

    /// Replace the PML quantile. Only affects a PML-based calculator, but the
    /// level is validated either way.
    pub fn with_pml_quantile(mut self, pml_quantile: f64) -> Result<Self> {
        let q = Confidence::new(pml_quantile)?;
        if let RiskMeasure::ProbableMaximumLoss(_) = self.measure {
            self.measure = RiskMeasure::ProbableMaximumLoss(q);
        }
        Ok(self)
    }

    pub fn measure(&self) -> RiskMeasure {
        self.measure
    }

    pub fn expense_ratio(&self) -> f64 {
        self.expense_ratio
    }

    pub fn profit_loading(&self) -> f64 {
        self.profit_loading
    }

    pub fn calculate(&self, losses: &[f64]) -> Result<PremiumBreakdown> {
        if let Some(bad) = losses.iter().find(|x| !(x.is_finite() && **x >= 0.0)) {
            return Err(invalid_argument(format!("losses must be finite and >= 0, found {bad}")));
        }
        let risk_premium = self.measure.evaluate(losses)?;
        let technical_premium = risk_premium * (1.0 + self.expense_ratio);
        let commercial_premium = technical_premium * (1.0 + self.profit_loading);
        Ok(PremiumBreakdown { risk_premium, technical_premium, commercial_premium })
    }
}

/// One-shot form of `PremiumCalculator::new(..)?.calculate(losses)`.
pub fn calculate(
    losses: &[f64],
    kind: MeasureKind,
    confidence: Option<f64>,
    expense_ratio: f64,
    profit_loading: f64,
) -> Result<PremiumBreakdown> {
    PremiumCalculator::new(kind, confidence, expense_ratio, profit_loading)?.calculate(losses)
}
