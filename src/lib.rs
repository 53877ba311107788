//! Monte Carlo pricing of excess-of-loss reinsurance layers.
//!
//! Frequency and severity models feed a trial engine that applies a treaty
//! layer to each simulated year; the ceded-loss distribution is then reduced
//! to risk measures and loaded into premiums.

pub mod config;
pub mod error;
pub mod frequency;
pub mod history;
pub mod layer;
pub mod metrics;
pub mod pricing;
pub mod rng;
pub mod severity;
pub mod simulation;
pub mod synthetic;
pub mod types;

pub use error::{PricingError, Result};
