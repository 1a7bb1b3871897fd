//! Error types.

use thiserror::Error;

use crate::real::Real;

/// Result type for filter configuration.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Errors that can occur while deriving filter coefficients from a
/// configuration.
///
/// These are the only errors of the crate. The update steps never fail:
/// degenerate samples are skipped and non-finite samples propagate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A sampling period is zero.
    #[error("sampling period `{name}` must be positive")]
    NonPositivePeriod {
        /// Name of the offending period.
        name: &'static str,
    },

    /// A time constant is zero.
    #[error("time constant `{name}` must be positive")]
    NonPositiveTimeConstant {
        /// Name of the offending time constant.
        name: &'static str,
    },

    /// A tuning parameter is out of its valid range.
    #[error("parameter `{name}` is out of range: {value}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// The rejected value.
        value: Real,
    },
}
