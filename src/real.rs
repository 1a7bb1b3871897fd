//! The scalar type used throughout the filter.
//!
//! By default all computations are carried out in `f32`, which is what small
//! microcontrollers with a single-precision FPU handle best. Enabling the
//! `f64` feature switches every quaternion, vector, coefficient and state
//! field to double precision.

use std::time::Duration;

/// Floating point type used for all filter computations.
#[cfg(not(feature = "f64"))]
pub type Real = f32;

/// Floating point type used for all filter computations.
#[cfg(feature = "f64")]
pub type Real = f64;

/// Mathematical constants for [`Real`].
#[cfg(not(feature = "f64"))]
pub use std::f32::consts;

/// Mathematical constants for [`Real`].
#[cfg(feature = "f64")]
pub use std::f64::consts;

/// Threshold below which a vector norm is treated as zero.
pub const EPS: Real = Real::EPSILON;

/// Returns the duration in seconds as a [`Real`].
#[cfg(not(feature = "f64"))]
#[inline]
#[must_use]
pub fn seconds(duration: Duration) -> Real {
    duration.as_secs_f32()
}

/// Returns the duration in seconds as a [`Real`].
#[cfg(feature = "f64")]
#[inline]
#[must_use]
pub fn seconds(duration: Duration) -> Real {
    duration.as_secs_f64()
}

/// Converts an angular rate in degrees per second to radians per second.
#[inline]
#[must_use]
pub fn deg_to_rad(degrees: Real) -> Real {
    degrees * consts::PI / 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn seconds_of_millisecond() {
        assert_relative_eq!(seconds(Duration::from_millis(1)), 0.001);
        assert_eq!(seconds(Duration::ZERO), 0.0);
    }

    #[test]
    fn degrees_to_radians() {
        assert_relative_eq!(deg_to_rad(180.0), consts::PI);
        assert_relative_eq!(deg_to_rad(2.0), 0.034_906_585, epsilon = 1e-6);
    }
}
