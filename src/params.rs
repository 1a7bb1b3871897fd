//! Tunable parameters of the filter.

use std::time::Duration;

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::real::Real;

/// Parameters for the [`Vqf`](crate::Vqf) filter.
///
/// Together with the gyroscope and accelerometer sampling periods these form
/// the complete filter configuration. They are validated when the
/// [`VqfCoefficients`](crate::VqfCoefficients) are derived from them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VqfParameters {
    /// Time constant $\tau_{acc}$ for accelerometer low-pass filtering.
    ///
    /// Small values for $\tau_{acc}$ imply trust on the accelerometer
    /// measurements, while large values of $\tau_{acc}$ imply trust on the
    /// gyroscope measurements.
    ///
    /// The time constant $\tau_{acc}$ corresponds to the cutoff frequency $f_c$
    /// of the second-order Butterworth low-pass filter as follows: $$f_c =
    /// \frac{\sqrt(2)}{2 \pi \tau_{acc}}$$
    pub tau_accelerometer: Duration,
    /// Enables gyroscope bias estimation during motion phases.
    ///
    /// Disabled by default, in which case the bias estimate only changes
    /// during detected rest phases.
    ///
    /// # Note
    ///
    /// Gyroscope bias is estimated based on the inclination correction only!
    pub do_bias_estimation: bool,
    /// Enables gyroscope bias estimation during rest phases.
    ///
    /// # Note
    ///
    /// This enables "rest"-phase detection, phases in which the IMU is at rest.
    /// During rest-phases, the gyroscope bias is estimated from the
    /// low-pass filtered gyroscope readings.
    pub do_rest_bias_estimation: bool,
    /// Standard deviation of the initial bias estimation uncertainty, in
    /// degrees per second.
    pub bias_sigma_initial: Real,
    /// Time in which the bias estimation uncertainty increases from 0 °/s to
    /// 0.1 °/s. This value determines the system noise assumed by the
    /// Kalman filter.
    pub bias_forgetting_time: Duration,
    /// Maximum expected gyroscope bias, in degrees per second.
    ///
    /// This value is used to clip the bias estimate and the measurement error
    /// in the bias estimation update step. It is further used by the rest
    /// detection algorithm in order to not regard measurements with a large
    /// but constant angular rate as rest.
    pub bias_clip: Real,
    /// Standard deviation of the converged bias estimation uncertainty during
    /// motion, in degrees per second.
    pub bias_sigma_motion: Real,
    /// Forgetting factor for unobservable bias in vertical direction during
    /// motion.
    ///
    /// Without a magnetometer, gyroscope bias is not observable in vertical
    /// direction during motion.
    ///
    /// This value is the relative weight of an artificial zero measurement that
    /// ensures that the bias estimate in the unobservable direction will
    /// eventually decay to zero.
    pub bias_vertical_forgetting_factor: Real,
    /// Standard deviation of the converged bias estimation uncertainty during a
    /// rest phase, in degrees per second.
    pub bias_sigma_rest: Real,
    /// Time threshold for rest detection.
    ///
    /// A rest phase is detected when the measurements have been close to the
    /// low-pass filtered reference for at least this duration.
    pub rest_min_duration: Duration,
    /// Time constant for the low-pass filter used in the rest detection.
    ///
    /// This time constant characterizes a second-order Butterworth low-pass
    /// filter used to obtain the reference for rest detection.
    pub rest_filter_tau: Duration,
    /// Angular velocity threshold for rest detection, in degrees per second.
    ///
    /// For a rest phase to be detected, the norm of the deviation between
    /// measurement and reference must be below the provided threshold.
    /// The absolute value of each component must also be below
    /// [`Self::bias_clip`].
    pub rest_threshold_gyro: Real,
    /// Acceleration threshold for rest phase detection in m/s^2.
    ///
    /// For a rest phase to be detected, the norm of the deviation between
    /// measurement and reference must be below the provided threshold.
    pub rest_threshold_accel: Real,
}

impl Default for VqfParameters {
    fn default() -> Self {
        Self {
            tau_accelerometer: Duration::from_secs(3),
            do_bias_estimation: false,
            do_rest_bias_estimation: true,
            bias_sigma_initial: 0.5,
            bias_forgetting_time: Duration::from_secs(100),
            bias_clip: 2.0,
            bias_sigma_motion: 0.1,
            bias_vertical_forgetting_factor: 0.0001,
            bias_sigma_rest: 0.03,
            rest_min_duration: Duration::from_millis(1500),
            rest_filter_tau: Duration::from_millis(500),
            rest_threshold_gyro: 2.0,
            rest_threshold_accel: 0.5,
        }
    }
}

impl VqfParameters {
    /// Checks that every time constant is non-zero and every tuning knob is
    /// finite and within its valid range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn validate(&self) -> ConfigurationResult<()> {
        for (name, tau) in [
            ("tau_accelerometer", self.tau_accelerometer),
            ("rest_filter_tau", self.rest_filter_tau),
            ("bias_forgetting_time", self.bias_forgetting_time),
        ] {
            if tau.is_zero() {
                return Err(ConfigurationError::NonPositiveTimeConstant { name });
            }
        }

        for (name, value) in [
            ("bias_sigma_initial", self.bias_sigma_initial),
            ("bias_clip", self.bias_clip),
            ("bias_sigma_motion", self.bias_sigma_motion),
            ("bias_sigma_rest", self.bias_sigma_rest),
            ("rest_threshold_gyro", self.rest_threshold_gyro),
            ("rest_threshold_accel", self.rest_threshold_accel),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::InvalidParameter { name, value });
            }
        }

        let forgetting = self.bias_vertical_forgetting_factor;
        if !(forgetting.is_finite() && forgetting >= 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "bias_vertical_forgetting_factor",
                value: forgetting,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_valid() {
        assert_eq!(VqfParameters::default().validate(), Ok(()));
    }

    #[test]
    fn zero_time_constant_is_rejected() {
        let params = VqfParameters {
            rest_filter_tau: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigurationError::NonPositiveTimeConstant {
                name: "rest_filter_tau"
            })
        );
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let params = VqfParameters {
            rest_threshold_accel: -0.5,
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigurationError::InvalidParameter {
                name: "rest_threshold_accel",
                value: -0.5
            })
        );
    }

    #[test]
    fn nan_bias_clip_is_rejected() {
        let params = VqfParameters {
            bias_clip: Real::NAN,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigurationError::InvalidParameter { name: "bias_clip", .. })
        ));
    }

    #[test]
    fn zero_vertical_forgetting_factor_is_allowed() {
        let params = VqfParameters {
            bias_vertical_forgetting_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(params.validate(), Ok(()));
    }
}
