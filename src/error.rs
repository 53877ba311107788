use thiserror::Error;

/// Every failure the pricing pipeline can surface.
///
/// All variants are raised eagerly at the boundary of the component that
/// detects them; none are transient and none are retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PricingError {
    /// Malformed distribution or treaty parameters, detected at construction.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Malformed call-time argument (e.g. a non-positive trial count).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A risk measure needs a confidence level that was not supplied.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// Fitting requested with too few observations.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A metric was requested over an empty distribution.
    #[error("empty distribution: {0}")]
    EmptyDistribution(String),

    /// The engine is not in a state that accepts the request.
    #[error("invalid engine state: {0}")]
    InvalidState(String),

    /// The run entered the Failed state; no partial result is returned.
    #[error("run aborted: {0}")]
    RunAborted(String),

    /// The configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PricingError>;

/// Shorthand used by the validating constructors.
pub(crate) fn invalid_parameter(msg: impl Into<String>) -> PricingError {
    PricingError::InvalidParameter(msg.into())
}

pub(crate) fn invalid_argument(msg: impl Into<String>) -> PricingError {
    PricingError::InvalidArgument(msg.into())
}
