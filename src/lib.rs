//! An implementation of the Versatile Quaternion-based Filter (VQF) for 6D
//! orientation estimation from gyroscope and accelerometer samples.
//!
//! The filter integrates the bias-corrected angular rate into a strapdown
//! quaternion, corrects the resulting inclination drift towards the gravity
//! direction measured by the accelerometer, and estimates the gyroscope bias
//! online during detected rest phases. Bias estimation during motion can be
//! enabled with [`VqfParameters::do_bias_estimation`].
//!
//! No magnetometer is used, so the heading about the vertical axis is not
//! observable and drifts with any remaining vertical gyroscope bias.
//!
//! The filter is split into three parts that can be used on their own:
//!
//! - [`VqfParameters`], the tunable configuration,
//! - [`VqfCoefficients`], derived once from the configuration and the sampling
//!   periods of both sensors,
//! - [`VqfState`], which is updated in place by
//!   [`VqfState::update_gyro`] and [`VqfState::update_accel`].
//!
//! [`Vqf`] bundles the three for the common case of a single filter.
//! None of the update steps allocate, block or fail.

mod accel;
mod bias;
mod coefficients;
mod error;
mod gyro;
pub mod low_pass_filter;
mod params;
pub mod real;
mod state;

use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};

pub use coefficients::{VqfBiasCoefficients, VqfCoefficients};
pub use error::{ConfigurationError, ConfigurationResult};
pub use params::VqfParameters;
pub use real::Real;
pub use state::VqfState;

/// The VQF filter.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use std::time::Duration;
/// use vqf_6d::{Vqf, VqfParameters};
///
/// let period = Duration::from_millis(10);
/// let mut vqf = Vqf::new(period, period, VqfParameters::default())?;
///
/// for _ in 0..100 {
///     vqf.update(Vector3::new(0.0, 0.0, 0.1), Vector3::new(0.0, 0.0, 9.81));
/// }
///
/// let [w, x, y, z] = vqf.quaternion_wxyz();
/// assert!(((w * w + x * x + y * y + z * z).sqrt() - 1.0).abs() < 1e-5);
/// # Ok::<(), vqf_6d::ConfigurationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Vqf {
    /// The filter coefficients.
    coefficients: VqfCoefficients,
    /// The parameters of the filter.
    parameters: VqfParameters,
    /// The state of the filter.
    state: VqfState,
}

impl Vqf {
    /// Create a new VQF filter for the given sampling periods and parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if a sampling period or time constant
    /// is zero, or if a tuning parameter is out of range.
    pub fn new(
        gyro_period: Duration,
        accel_period: Duration,
        params: VqfParameters,
    ) -> ConfigurationResult<Self> {
        let coefficients = VqfCoefficients::new(gyro_period, accel_period, &params)?;

        Ok(Self {
            state: VqfState::new(&coefficients),
            coefficients,
            parameters: params,
        })
    }

    /// Update step of the filter, using the gyroscope (rad/s) and
    /// accelerometer (m/s^2) readings.
    ///
    /// Only valid when both sensors share the same sampling period, otherwise
    /// call [`Self::update_gyro`] and [`Self::update_accel`] at their own
    /// rates.
    pub fn update(&mut self, gyro: Vector3<Real>, accel: Vector3<Real>) {
        self.update_gyro(gyro);
        self.update_accel(accel);
    }

    /// Perform the gyroscope update step, using the gyroscope readings in
    /// rad/s. See [`VqfState::update_gyro`].
    pub fn update_gyro(&mut self, gyro: Vector3<Real>) {
        self.state
            .update_gyro(&self.parameters, &self.coefficients, gyro);
    }

    /// Perform the accelerometer update step, using the accelerometer readings
    /// in m/s^2. See [`VqfState::update_accel`].
    pub fn update_accel(&mut self, accel: Vector3<Real>) {
        self.state
            .update_accel(&self.parameters, &self.coefficients, accel);
    }

    /// Returns the 6D orientation quaternion.
    ///
    /// This is the orientation without magnetometer correction.
    #[must_use]
    pub fn orientation(&self) -> UnitQuaternion<Real> {
        self.state.orientation()
    }

    /// Returns the 6D orientation quaternion as `[w, x, y, z]`.
    #[must_use]
    pub fn quaternion_wxyz(&self) -> [Real; 4] {
        self.state.quaternion_wxyz()
    }

    /// Returns `true` if a rest phase has been detected.
    #[must_use]
    pub fn is_rest_phase(&self) -> bool {
        self.state.is_rest_phase()
    }

    /// Returns the current gyroscope bias estimate in rad/s, together with an
    /// upper bound of its standard deviation in rad/s.
    #[must_use]
    pub fn bias_estimate(&self) -> (Vector3<Real>, Real) {
        self.state.bias_estimate(&self.coefficients)
    }

    /// Overwrites the gyroscope bias estimate, and optionally its standard
    /// deviation, both in rad/s.
    pub fn set_bias_estimate(&mut self, bias: Vector3<Real>, sigma: Option<Real>) {
        self.state.set_bias_estimate(bias, sigma);
    }

    /// Changes the accelerometer time constant.
    ///
    /// The low-pass filter memories that depend on it are adapted, so the
    /// filter output continues without a jump.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NonPositiveTimeConstant`] if `tau` is
    /// zero, in which case the filter is left unchanged.
    pub fn set_tau_accelerometer(&mut self, tau: Duration) -> ConfigurationResult<()> {
        if tau.is_zero() {
            return Err(ConfigurationError::NonPositiveTimeConstant {
                name: "tau_accelerometer",
            });
        }
        if tau == self.parameters.tau_accelerometer {
            return Ok(());
        }

        log::debug!(
            "changing accelerometer time constant from {:?} to {tau:?}",
            self.parameters.tau_accelerometer
        );
        self.parameters.tau_accelerometer = tau;
        let old = self.coefficients.replace_accel_low_pass(tau);
        let new = &self.coefficients.accel;

        self.state.accelerometer_low_pass.adapt_to_coefficients(&old, new);
        self.state
            .motion_bias_estimate_rotation_low_pass
            .adapt_to_coefficients(&old, new);
        self.state
            .motion_bias_estimate_low_pass
            .adapt_to_coefficients(&old, new);

        Ok(())
    }

    /// Enables or disables gyroscope bias estimation during motion.
    pub fn set_motion_bias_estimation(&mut self, enabled: bool) {
        if self.parameters.do_bias_estimation == enabled {
            return;
        }
        self.parameters.do_bias_estimation = enabled;
        self.state.reset_motion_bias_estimation();
    }

    /// Enables or disables rest detection and bias estimation during rest.
    pub fn set_rest_bias_estimation(&mut self, enabled: bool) {
        if self.parameters.do_rest_bias_estimation == enabled {
            return;
        }
        self.parameters.do_rest_bias_estimation = enabled;
        self.state.reset_rest_detection();
    }

    /// Sets the thresholds for rest detection, in °/s and m/s^2.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidParameter`] if a threshold is not
    /// positive, in which case both thresholds are left unchanged.
    pub fn set_rest_detection_thresholds(
        &mut self,
        gyro: Real,
        accel: Real,
    ) -> ConfigurationResult<()> {
        let params = VqfParameters {
            rest_threshold_gyro: gyro,
            rest_threshold_accel: accel,
            ..self.parameters.clone()
        };
        params.validate()?;
        self.parameters = params;
        Ok(())
    }

    /// Resets the state to the default values at initialization.
    pub fn reset_state(&mut self) {
        self.state.reset(&self.coefficients);
    }

    /// The parameters of the filter.
    #[must_use]
    pub fn parameters(&self) -> &VqfParameters {
        &self.parameters
    }

    /// The coefficients used by the filter.
    #[must_use]
    pub fn coefficients(&self) -> &VqfCoefficients {
        &self.coefficients
    }

    /// The current state of the filter.
    #[must_use]
    pub fn state(&self) -> &VqfState {
        &self.state
    }

    /// The gyroscope sampling period.
    #[must_use]
    pub fn gyro_period(&self) -> Duration {
        self.coefficients.gyro_sampling_period()
    }

    /// The accelerometer sampling period.
    #[must_use]
    pub fn accel_period(&self) -> Duration {
        self.coefficients.accel_sampling_period()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn vqf() -> Vqf {
        let period = Duration::from_millis(10);
        Vqf::new(period, period, VqfParameters::default()).unwrap()
    }

    #[test]
    fn invalid_periods_are_rejected() {
        let result = Vqf::new(
            Duration::ZERO,
            Duration::from_millis(10),
            VqfParameters::default(),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::NonPositivePeriod { .. })
        ));
    }

    #[test]
    fn set_tau_accelerometer_keeps_orientation_continuous() {
        let mut vqf = vqf();
        let gravity = Vector3::new(0.0, 0.0, 9.81);
        for _ in 0..500 {
            vqf.update(Vector3::zeros(), gravity);
        }
        let before = vqf.orientation();

        vqf.set_tau_accelerometer(Duration::from_millis(500)).unwrap();
        vqf.update(Vector3::zeros(), gravity);

        assert_abs_diff_eq!(vqf.orientation().angle_to(&before), 0.0, epsilon = 1e-4);
        assert_eq!(
            vqf.parameters().tau_accelerometer,
            Duration::from_millis(500)
        );
        assert_eq!(vqf.accel_period(), Duration::from_millis(10));
    }

    #[test]
    fn zero_tau_accelerometer_is_rejected() {
        let mut vqf = vqf();
        let coefficients = vqf.coefficients().clone();
        assert!(vqf.set_tau_accelerometer(Duration::ZERO).is_err());
        assert_eq!(vqf.coefficients(), &coefficients);
    }

    #[test]
    fn disabling_rest_estimation_clears_rest() {
        let mut vqf = vqf();
        for _ in 0..200 {
            vqf.update(Vector3::zeros(), Vector3::new(0.0, 0.0, 9.81));
        }
        assert!(vqf.is_rest_phase());

        vqf.set_rest_bias_estimation(false);
        assert!(!vqf.is_rest_phase());
    }

    #[test]
    fn invalid_rest_thresholds_are_rejected() {
        let mut vqf = vqf();
        assert!(vqf.set_rest_detection_thresholds(0.0, 0.5).is_err());
        assert_eq!(vqf.parameters().rest_threshold_gyro, 2.0);

        vqf.set_rest_detection_thresholds(3.0, 0.2).unwrap();
        assert_eq!(vqf.parameters().rest_threshold_gyro, 3.0);
        assert_eq!(vqf.parameters().rest_threshold_accel, 0.2);
    }

    #[test]
    fn reset_state_returns_to_identity() {
        let mut vqf = vqf();
        for _ in 0..50 {
            vqf.update(Vector3::new(0.5, 0.1, 0.0), Vector3::new(1.0, 0.0, 9.81));
        }
        vqf.reset_state();
        assert_eq!(vqf.quaternion_wxyz(), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(vqf.bias_estimate().0, Vector3::zeros());
    }
}
