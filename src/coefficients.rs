//! Coefficients derived once from the filter configuration.

use std::time::Duration;

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::low_pass_filter::LowPassCoefficients;
use crate::params::VqfParameters;
use crate::real::{seconds, Real};

/// Coefficients for gyroscope bias estimation.
///
/// All variances are expressed in the internal unit of the bias Kalman filter,
/// i.e. $(0.01 °/s)^2$.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VqfBiasCoefficients {
    /// Variance of the initial gyroscope bias estimate.
    pub(crate) p0: Real,
    /// System noise variance used in the gyroscope bias estimation.
    pub(crate) v: Real,
    /// Measurement noise variance for the motion gyroscope bias estimation
    /// update.
    pub(crate) motion_w: Real,
    /// Measurement noise variance for the motion gyroscope bias estimation
    /// update in vertical direction.
    pub(crate) vertical_w: Real,
    /// Measurement noise variance for the rest gyroscope bias estimation
    /// update.
    pub(crate) rest_w: Real,
}

impl VqfBiasCoefficients {
    /// Initialize the bias estimation coefficients using the given parameters.
    ///
    /// This function is roughly equivalent to the `InitializeKalmanFilter`
    /// procedure in Algorithm 2 of the original paper.
    #[must_use]
    fn new(accel_period: Real, params: &VqfParameters) -> Self {
        // line 17 of Algorithm 2, the initial variance of the bias
        let p0 = (params.bias_sigma_initial * 100.0).powi(2);

        // line 18 of Algorithm 2
        // System noise increases the variance from 0 to (0.1 °/s)^2 in
        // `bias_forgetting_time` duration
        let v = (0.1 * 100.0 as Real).powi(2) * accel_period / seconds(params.bias_forgetting_time);

        // line 19 of Algorithm 2
        let p_motion = (params.bias_sigma_motion * 100.0).powi(2);
        let motion_w = p_motion.powi(2) / v + p_motion;
        let vertical_w = motion_w / params.bias_vertical_forgetting_factor.max(1e-10);

        // line 20 of Algorithm 2
        let p_rest = (params.bias_sigma_rest * 100.0).powi(2);
        let rest_w = p_rest.powi(2) / v + p_rest;

        Self {
            p0,
            v,
            motion_w,
            vertical_w,
            rest_w,
        }
    }

    /// Variance of the initial bias estimate, in $(0.01 °/s)^2$.
    #[must_use]
    pub fn initial_variance(&self) -> Real {
        self.p0
    }
}

/// Coefficients used by the filter update steps.
///
/// These are a pure function of the sampling periods and the
/// [`VqfParameters`]: deriving them twice from the same configuration yields
/// bit-identical values, and the update steps never modify them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VqfCoefficients {
    /// Gyroscope sampling period.
    gyro_sampling_period: Duration,
    /// Accelerometer sampling period.
    accel_sampling_period: Duration,
    /// Gyroscope sampling period in seconds.
    pub(crate) gyro_period: Real,
    /// Accelerometer sampling period in seconds.
    pub(crate) accel_period: Real,
    /// Low-pass filter for the accelerometer readings in the strapdown frame,
    /// which sets the inclination correction crossover.
    pub(crate) accel: LowPassCoefficients,
    /// Gyroscope measurement low-pass filter for rest phase detection.
    pub(crate) rest_gyro: LowPassCoefficients,
    /// Accelerometer measurement low-pass filter for rest phase detection.
    pub(crate) rest_accel: LowPassCoefficients,
    /// Coefficients for the gyroscope bias estimation.
    pub(crate) bias: VqfBiasCoefficients,
}

impl VqfCoefficients {
    /// Derive the filter coefficients from the sampling periods of both
    /// sensors and the filter parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if a sampling period or time constant
    /// is zero, or if a tuning parameter is out of range.
    pub fn new(
        gyro_period: Duration,
        accel_period: Duration,
        params: &VqfParameters,
    ) -> ConfigurationResult<Self> {
        if gyro_period.is_zero() {
            return Err(ConfigurationError::NonPositivePeriod {
                name: "gyro_period",
            });
        }
        if accel_period.is_zero() {
            return Err(ConfigurationError::NonPositivePeriod {
                name: "accel_period",
            });
        }
        params.validate()?;

        let coefficients = Self {
            gyro_sampling_period: gyro_period,
            accel_sampling_period: accel_period,
            gyro_period: seconds(gyro_period),
            accel_period: seconds(accel_period),
            accel: LowPassCoefficients::second_order_butterworth(
                params.tau_accelerometer,
                accel_period,
            ),
            rest_gyro: LowPassCoefficients::second_order_butterworth(
                params.rest_filter_tau,
                gyro_period,
            ),
            rest_accel: LowPassCoefficients::second_order_butterworth(
                params.rest_filter_tau,
                accel_period,
            ),
            bias: VqfBiasCoefficients::new(seconds(accel_period), params),
        };

        log::debug!(
            "derived coefficients for gyro period {gyro_period:?}, accel period {accel_period:?}: {coefficients:?}"
        );

        Ok(coefficients)
    }

    /// Gyroscope sampling period in seconds.
    #[must_use]
    pub fn gyro_period(&self) -> Real {
        self.gyro_period
    }

    /// Accelerometer sampling period in seconds.
    #[must_use]
    pub fn accel_period(&self) -> Real {
        self.accel_period
    }

    /// The gyroscope sampling period the coefficients were derived for.
    #[must_use]
    pub fn gyro_sampling_period(&self) -> Duration {
        self.gyro_sampling_period
    }

    /// The accelerometer sampling period the coefficients were derived for.
    #[must_use]
    pub fn accel_sampling_period(&self) -> Duration {
        self.accel_sampling_period
    }

    /// Coefficients of the accelerometer correction low-pass filter.
    #[must_use]
    pub fn accel_low_pass(&self) -> &LowPassCoefficients {
        &self.accel
    }

    /// Coefficients of the rest detection low-pass filters, for gyroscope and
    /// accelerometer respectively.
    #[must_use]
    pub fn rest_low_pass(&self) -> (&LowPassCoefficients, &LowPassCoefficients) {
        (&self.rest_gyro, &self.rest_accel)
    }

    /// Coefficients of the bias estimation.
    #[must_use]
    pub fn bias(&self) -> &VqfBiasCoefficients {
        &self.bias
    }

    /// Replaces the accelerometer correction filter after a change of
    /// [`VqfParameters::tau_accelerometer`], returning the old coefficients.
    pub(crate) fn replace_accel_low_pass(&mut self, tau: Duration) -> LowPassCoefficients {
        let new = LowPassCoefficients::second_order_butterworth(tau, self.accel_sampling_period);
        std::mem::replace(&mut self.accel, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PERIOD: Duration = Duration::from_millis(1);

    #[test]
    fn identical_configuration_gives_identical_coefficients() {
        let params = VqfParameters {
            tau_accelerometer: Duration::from_millis(10),
            ..Default::default()
        };
        let first = VqfCoefficients::new(PERIOD, PERIOD, &params).unwrap();
        let second = VqfCoefficients::new(PERIOD, PERIOD, &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_periods_are_rejected() {
        let params = VqfParameters::default();
        assert_eq!(
            VqfCoefficients::new(Duration::ZERO, PERIOD, &params),
            Err(ConfigurationError::NonPositivePeriod {
                name: "gyro_period"
            })
        );
        assert_eq!(
            VqfCoefficients::new(PERIOD, Duration::ZERO, &params),
            Err(ConfigurationError::NonPositivePeriod {
                name: "accel_period"
            })
        );
    }

    #[test]
    fn zero_accel_time_constant_is_rejected() {
        let params = VqfParameters {
            tau_accelerometer: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            VqfCoefficients::new(PERIOD, PERIOD, &params),
            Err(ConfigurationError::NonPositiveTimeConstant {
                name: "tau_accelerometer"
            })
        );
    }

    #[test]
    fn rest_filters_follow_their_sensor_period() {
        let params = VqfParameters::default();
        let coefficients =
            VqfCoefficients::new(Duration::from_millis(1), Duration::from_millis(10), &params)
                .unwrap();
        let (gyro, accel) = coefficients.rest_low_pass();
        assert_relative_eq!(gyro.sampling_period, 0.001);
        assert_relative_eq!(accel.sampling_period, 0.01);
        assert!(gyro.b[0] < accel.b[0]);
    }

    #[test]
    fn bias_coefficients_match_defaults() {
        let coefficients =
            VqfCoefficients::new(PERIOD, PERIOD, &VqfParameters::default()).unwrap();
        let bias = coefficients.bias();
        assert_relative_eq!(bias.p0, 2500.0);
        assert_relative_eq!(bias.v, 0.001, max_relative = 1e-5);
        assert_relative_eq!(bias.rest_w, 81.0 / 0.001 + 9.0, max_relative = 1e-4);
        assert_relative_eq!(bias.vertical_w, bias.motion_w / 1e-4, max_relative = 1e-4);
    }

    #[test]
    fn replaced_accel_filter_uses_stored_period() {
        let params = VqfParameters::default();
        let accel_period = Duration::from_millis(4);
        let mut coefficients = VqfCoefficients::new(PERIOD, accel_period, &params).unwrap();
        let tau = Duration::from_millis(500);

        let old = coefficients.replace_accel_low_pass(tau);

        assert_eq!(
            old,
            LowPassCoefficients::second_order_butterworth(params.tau_accelerometer, accel_period)
        );
        assert_eq!(
            coefficients.accel_low_pass(),
            &LowPassCoefficients::second_order_butterworth(tau, accel_period)
        );
        assert_eq!(coefficients.accel_sampling_period(), accel_period);
        assert_eq!(coefficients.gyro_sampling_period(), PERIOD);
    }
}
