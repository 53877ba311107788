use serde::{Deserialize, Serialize};

use crate::error::{Result, invalid_parameter};

/// Excess-of-loss payout: `min(max(loss − retention, 0), limit)`.
///
/// Zero up to and including the retention, `limit` from `retention + limit`
/// upward, `loss − retention` in between. The two flat regions are decided by
/// comparison rather than subtraction so they hold exactly under rounding.
pub fn payout(loss: f64, retention: f64, limit: f64) -> f64 {
    if loss <= retention {
        0.0
    } else if loss >= retention + limit {
        limit
    } else {
        (loss - retention).min(limit)
    }
}

/// Where the layer is applied within a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerGranularity {
    /// Layer applied to each claim, payouts summed over the year.
    PerClaim,
    /// Claims summed first, layer applied once to the annual total.
    Aggregate,
}

/// A retention and a layer width. `limit` is the width of the layer, not an
/// upper bound on the loss: the layer exhausts at `retention + limit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreatyLayer {
    retention: f64,
    limit: f64,
}

impl TreatyLayer {
    pub fn new(retention: f64, limit: f64) -> Result<Self> {
        if !(retention >= 0.0 && retention.is_finite()) {
            return Err(invalid_parameter(format!("retention must be >= 0, got {retention}")));
        }
        if !(limit > 0.0 && limit.is_finite()) {
            return Err(invalid_parameter(format!("limit must be > 0, got {limit}")));
        }
        Ok(TreatyLayer { retention, limit })
    }

    pub fn retention(&self) -> f64 {
        self.retention
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn payout(&self, loss: f64) -> f64 {
        payout(loss, self.retention, self.limit)
    }

    /// Ceded amount for one year's claims, whose sum is `gross`.
    ///
    /// The limit also caps the year: per-claim payouts are summed and then
    /// capped at `limit`, so the annual ceded loss never exceeds
    /// `min(gross, limit)` under either granularity.
    pub fn annual_ceded(&self, granularity: LayerGranularity, claims: &[f64], gross: f64) -> f64 {
        match granularity {
            LayerGranularity::Aggregate => self.payout(gross),
            LayerGranularity::PerClaim => {
                let ceded: f64 = claims.iter().map(|&c| self.payout(c)).sum();
                ceded.min(self.limit).min(gross)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::error::PricingError;

    #[test]
    fn payout_regions() {
        let layer = TreatyLayer::new(100.0, 50.0).unwrap();
        assert_eq!(layer.payout(0.0), 0.0);
        assert_eq!(layer.payout(100.0), 0.0);
        assert_eq!(layer.payout(120.0), 20.0);
        assert_eq!(layer.payout(150.0), 50.0);
        assert_eq!(layer.payout(1e12), 50.0);
    }

    #[test]
    fn zero_retention_pays_from_first_unit() {
        assert_eq!(payout(30.0, 0.0, 50.0), 30.0);
        assert_eq!(payout(80.0, 0.0, 50.0), 50.0);
    }

    #[test]
    fn rejects_bad_layer() {
        for (r, l) in [(-1.0, 10.0), (0.0, 0.0), (5.0, -3.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            assert!(
                matches!(TreatyLayer::new(r, l), Err(PricingError::InvalidParameter(_))),
                "retention={r} limit={l} must be rejected"
            );
        }
    }

    #[test]
    fn granularities_differ_on_many_small_claims() {
        let layer = TreatyLayer::new(100.0, 500.0).unwrap();
        let claims = [60.0, 70.0, 80.0];
        let gross: f64 = claims.iter().sum();
        assert_eq!(layer.annual_ceded(LayerGranularity::PerClaim, &claims, gross), 0.0);
        assert_eq!(layer.annual_ceded(LayerGranularity::Aggregate, &claims, gross), 110.0);
    }

    #[test]
    fn per_claim_sum_is_capped_at_limit() {
        let layer = TreatyLayer::new(100.0, 50.0).unwrap();
        let claims = [200.0, 200.0, 200.0];
        assert_eq!(layer.annual_ceded(LayerGranularity::PerClaim, &claims, 600.0), 50.0);
    }

    #[test]
    fn per_claim_pays_each_excess() {
        let layer = TreatyLayer::new(100.0, 500.0).unwrap();
        let claims = [150.0, 90.0, 130.0];
        assert_eq!(layer.annual_ceded(LayerGranularity::PerClaim, &claims, 370.0), 80.0);
    }

    #[test]
    fn granularity_parses_snake_case() {
        #[derive(Deserialize)]
        struct Wrap {
            g: LayerGranularity,
        }
        let w: Wrap = toml::from_str("g = \"per_claim\"").unwrap();
        assert_eq!(w.g, LayerGranularity::PerClaim);
        let w: Wrap = toml::from_str("g = \"aggregate\"").unwrap();
        assert_eq!(w.g, LayerGranularity::Aggregate);
    }

    proptest! {
        #[test]
        fn payout_is_monotone(
            retention in 0.0f64..1e7,
            limit in 1e-3f64..1e7,
            a in 0.0f64..3e7,
            b in 0.0f64..3e7,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(payout(lo, retention, limit) <= payout(hi, retention, limit));
        }

        #[test]
        fn payout_shape(
            retention in 0.0f64..1e7,
            limit in 1e-3f64..1e7,
            frac in 0.0f64..1.0,
        ) {
            prop_assert_eq!(payout(retention * frac, retention, limit), 0.0);
            prop_assert_eq!(payout(retention + limit, retention, limit), limit);
            prop_assert_eq!(payout((retention + limit) * 2.0 + 1.0, retention, limit), limit);

            let mid = retention + limit * frac;
            let p = payout(mid, retention, limit);
            prop_assert!(p >= 0.0 && p <= limit);
            assert_relative_eq!(p, limit * frac, epsilon = 1e-6 * (retention + limit));
        }

        #[test]
        fn annual_ceded_bounded_by_gross_and_limit(
            retention in 0.0f64..1e6,
            limit in 1.0f64..1e6,
            claims in proptest::collection::vec(0.0f64..2e6, 0..20),
            per_claim in any::<bool>(),
        ) {
            let layer = TreatyLayer::new(retention, limit).unwrap();
            let gross: f64 = claims.iter().sum();
            let granularity = if per_claim { LayerGranularity::PerClaim } else { LayerGranularity::Aggregate };
            let ceded = layer.annual_ceded(granularity, &claims, gross);
            prop_assert!(ceded >= 0.0);
            prop_assert!(ceded <= gross);
            prop_assert!(ceded <= limit);
        }
    }
}
