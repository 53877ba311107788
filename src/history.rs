use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result, invalid_argument};
use crate::frequency::{FitReport, FrequencyFamily, FrequencyModel};
use crate::types::Year;

/// One observed historical claim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub date: NaiveDate,
    pub amount: f64,
}

impl ClaimRecord {
    pub fn year(&self) -> Year {
        Year(self.date.year())
    }
}

/// Drop exact duplicates, then floor negative amounts at zero. Output is in
/// date order. Duplicates are judged on the amount as recorded, so two
/// different negative claims on one day both survive.
pub fn clean(records: &[ClaimRecord]) -> Result<Vec<ClaimRecord>> {
    let mut unique: BTreeSet<(NaiveDate, u64)> = BTreeSet::new();
    for r in records {
        if !r.amount.is_finite() {
            return Err(invalid_argument(format!("claim on {} has non-finite amount", r.date)));
        }
        unique.insert((r.date, r.amount.to_bits()));
    }
    Ok(unique
        .into_iter()
        .map(|(date, bits)| ClaimRecord { date, amount: f64::from_bits(bits).max(0.0) })
        .collect())
}

/// Claim count per calendar year from the first observed year to the last,
/// claim-free years in between included as zero. Exact duplicates count once.
pub fn yearly_counts(records: &[ClaimRecord]) -> Result<Vec<u64>> {
    let mut per_year: BTreeMap<Year, u64> = BTreeMap::new();
    for r in clean(records)? {
        *per_year.entry(r.year()).or_insert(0) += 1;
    }

    let (Year(first), Year(last)) = match (per_year.keys().next(), per_year.keys().next_back()) {
        (Some(&first), Some(&last)) if first < last => (first, last),
        _ => {
            return Err(PricingError::InsufficientData(format!(
                "frequency fit needs claims in at least 2 distinct years, got {}",
                per_year.len()
            )));
        }
    };

    Ok((first..=last).map(|y| per_year.get(&Year(y)).copied().unwrap_or(0)).collect())
}

/// Parse NDJSON claim records, one per line; blank lines are skipped and
/// fields other than `date` and `amount` are ignored.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<ClaimRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| invalid_argument(format!("line {}: {e}", i + 1)))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| invalid_argument(format!("line {}: malformed claim record: {e}", i + 1)))?;
        records.push(record);
    }
    Ok(records)
}

/// `yearly_counts` followed by `FrequencyModel::fit`.
pub fn fit_frequency(
    records: &[ClaimRecord],
    configured: FrequencyFamily,
    overdispersion_threshold: f64,
) -> Result<FitReport> {
    FrequencyModel::fit(&yearly_counts(records)?, configured, overdispersion_threshold)
}
