//! Synthetic claim histories for exercising the history adapter and the
//! frequency fit without real data.
//!
//! Each claim picks a contract uniformly, a loss date uniformly in
//! `[start, end)`, and a ground-up amount from a two-component lognormal
//! mixture: a body and, with `tail_probability`, a heavier tail.

use chrono::{Days, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, invalid_argument, invalid_parameter};
use crate::history::ClaimRecord;
use crate::rng::{self, PRIMARY_STREAM};
use crate::severity::SeverityParameters;

/// A treaty the generated claims are booked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: String,
    pub attachment_point: f64,
    pub limit: f64,
}

/// One generated claim. Serializes flat, so each NDJSON line also reads back
/// as a [`ClaimRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticClaim {
    pub policy_id: String,
    pub contract_id: String,
    #[serde(flatten)]
    pub record: ClaimRecord,
    pub attachment_point: f64,
    pub limit: f64,
    pub exposure: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimGenerator {
    pub n_claims: usize,
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
    pub contracts: Vec<Contract>,
    pub body: SeverityParameters,
    pub tail: SeverityParameters,
    pub tail_probability: f64,
    pub exposure_range: (f64, f64),
}

impl Default for ClaimGenerator {
    /// 5000 claims over 2023–2024 on two contracts, 90% LN(10, 0.3) and
    /// 10% LN(12, 0.5), exposure factor in [0.8, 1.2].
    fn default() -> Self {
        ClaimGenerator {
            n_claims: 5_000,
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            contracts: vec![
                Contract { contract_id: "C001".into(), attachment_point: 100_000.0, limit: 500_000.0 },
                Contract { contract_id: "C002".into(), attachment_point: 200_000.0, limit: 1_000_000.0 },
            ],
            body: SeverityParameters::Lognormal { mu: 10.0, sigma: 0.3 },
            tail: SeverityParameters::Lognormal { mu: 12.0, sigma: 0.5 },
            tail_probability: 0.1,
            exposure_range: (0.8, 1.2),
        }
    }
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl ClaimGenerator {
    pub fn validate(&self) -> Result<()> {
        if self.n_claims == 0 {
            return Err(invalid_argument("n_claims must be > 0"));
        }
        if self.end <= self.start {
            return Err(invalid_parameter(format!(
                "claim date range is empty: {} .. {}",
                self.start, self.end
            )));
        }
        if self.contracts.is_empty() {
            return Err(invalid_parameter("at least one contract is required"));
        }
        self.body.validate()?;
        self.tail.validate()?;
        if !(0.0..=1.0).contains(&self.tail_probability) {
            return Err(invalid_parameter(format!(
                "tail_probability must be in [0, 1], got {}",
                self.tail_probability
            )));
        }
        let (lo, hi) = self.exposure_range;
        if !(lo > 0.0 && lo <= hi && hi.is_finite()) {
            return Err(invalid_parameter(format!("exposure range must satisfy 0 < lo <= hi, got ({lo}, {hi})")));
        }
        Ok(())
    }

    /// Draw `n_claims` claims in generation order. Equal seeds give equal output.
    pub fn generate(&self, seed: u64) -> Result<Vec<SyntheticClaim>> {
        self.validate()?;
        let mut rng = rng::stream_rng(seed, PRIMARY_STREAM);
        let span_days = (self.end - self.start).num_days() as u64;
        let (lo, hi) = self.exposure_range;

        let mut claims = Vec::with_capacity(self.n_claims);
        for i in 0..self.n_claims {
            let contract = &self.contracts[rng.random_range(0..self.contracts.len())];
            let offset = rng.random_range(0..span_days);
            let date = self
                .start
                .checked_add_days(Days::new(offset))
                .ok_or_else(|| invalid_parameter(format!("{} + {offset} days overflows", self.start)))?;
            let severity = if rng.random_bool(self.tail_probability) { &self.tail } else { &self.body };
            let amount = round_cents(severity.sample(&mut rng));
            let exposure = if lo < hi { rng.random_range(lo..=hi) } else { lo };

            claims.push(SyntheticClaim {
                policy_id: format!("P{:04}", i + 1),
                contract_id: contract.contract_id.clone(),
                record: ClaimRecord { date, amount },
                attachment_point: contract.attachment_point,
                limit: contract.limit,
                exposure: round_cents(exposure),
            });
        }
        debug!(n_claims = self.n_claims, seed, "synthetic claims generated");
        Ok(claims)
    }
}
