use serde::{Deserialize, Serialize};

use crate::error::{Result, invalid_argument};

/// Calendar year of an observed claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Year(pub i32);

/// A probability level strictly inside (0, 1), used for VaR / TVaR / PML.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Confidence(f64);

impl Confidence {
    /// Validate `q ∈ (0, 1)`. NaN and the endpoints are rejected.
    pub fn new(q: f64) -> Result<Self> {
        if q > 0.0 && q < 1.0 {
            Ok(Confidence(q))
        } else {
            Err(invalid_argument(format!("confidence level must be in (0, 1), got {q}")))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}
