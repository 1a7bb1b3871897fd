//! Mutable state of a filter instance, and the orientation queries.

use nalgebra::{Matrix3, UnitQuaternion, Vector2, Vector3};

use crate::coefficients::VqfCoefficients;
use crate::low_pass_filter::MeanInitializedLowPassFilter;
use crate::params::VqfParameters;
use crate::real::{consts::PI, deg_to_rad, Real};

/// The state of a [`Vqf`](crate::Vqf) filter.
///
/// A state is owned by exactly one filter instance and only ever mutated
/// through `&mut self` by [`Self::update_gyro`] and [`Self::update_accel`].
/// It holds no heap memory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VqfState {
    /// Angular velocity strapdown integration quaternion.
    pub gyroscope_quat: UnitQuaternion<Real>,
    /// Inclination correction quaternion.
    pub accelerometer_quat: UnitQuaternion<Real>,
    /// The time in seconds the measurements have been within the rest
    /// thresholds, `None` while moving.
    ///
    /// # Important
    ///
    /// If this is not [`Option::None`], it does not guarantee the system is in
    /// rest. See [`Self::is_rest_phase()`] for more.
    pub(crate) rest: Option<Real>,
    /// Whether a rest phase has been detected.
    pub(crate) rest_detected: bool,
    /// Squared deviations of the last gyroscope and accelerometer samples from
    /// their rest detection reference.
    pub(crate) rest_squared_deviations: Vector2<Real>,
    /// Angular rate of the last inclination correction, in rad/s.
    pub(crate) last_accel_correction_rate: Real,
    /// The low-pass filter state for the accelerometer readings.
    pub accelerometer_low_pass: MeanInitializedLowPassFilter<3, 1>,
    /// Low-pass filter state for gyroscope measurements, used for rest
    /// detection.
    pub rest_gyro_low_pass: MeanInitializedLowPassFilter<3, 1>,
    /// Low-pass filter state for accelerometer measurements, used for rest
    /// detection.
    pub rest_accel_low_pass: MeanInitializedLowPassFilter<3, 1>,
    /// Low-pass filter state for the rotation matrix coefficients used in the
    /// motion bias estimation.
    pub motion_bias_estimate_rotation_low_pass: MeanInitializedLowPassFilter<3, 3>,
    /// Low-pass filter state for the rotated bias estimate used in the motion
    /// bias estimation.
    pub motion_bias_estimate_low_pass: MeanInitializedLowPassFilter<2, 1>,
    /// The current gyroscope bias estimate in rad/s.
    pub bias: Vector3<Real>,
    /// The current covariance matrix of the gyroscope bias estimate.
    ///
    /// # Note
    ///
    /// For numeric reasons the internal unit used is 0.01 degrees/s, i.e. to
    /// get the standard deviation use: $$\sigma =
    /// \frac{\sqrt(p_{ii})}{100}$$
    pub bias_p: Matrix3<Real>,
}

impl VqfState {
    /// Creates the initial state: identity orientation, zero bias with the
    /// initial bias uncertainty, and empty low-pass filters.
    #[must_use]
    pub fn new(coefficients: &VqfCoefficients) -> Self {
        Self {
            gyroscope_quat: UnitQuaternion::identity(),
            accelerometer_quat: UnitQuaternion::identity(),
            rest: None,
            rest_detected: false,
            rest_squared_deviations: Vector2::zeros(),
            last_accel_correction_rate: 0.0,
            accelerometer_low_pass: MeanInitializedLowPassFilter::new(),
            rest_gyro_low_pass: MeanInitializedLowPassFilter::new(),
            rest_accel_low_pass: MeanInitializedLowPassFilter::new(),
            motion_bias_estimate_rotation_low_pass: MeanInitializedLowPassFilter::new(),
            motion_bias_estimate_low_pass: MeanInitializedLowPassFilter::new(),
            bias: Vector3::zeros(),
            bias_p: Matrix3::from_diagonal_element(coefficients.bias.p0),
        }
    }

    /// Resets the state to the values it had right after [`Self::new`].
    pub fn reset(&mut self, coefficients: &VqfCoefficients) {
        *self = Self::new(coefficients);
    }

    /// Returns the 6D orientation quaternion.
    ///
    /// This is the orientation without magnetometer correction: the heading
    /// about the vertical axis is whatever the gyroscope integration has
    /// accumulated and drifts with any uncompensated vertical bias.
    #[must_use]
    pub fn orientation(&self) -> UnitQuaternion<Real> {
        self.accelerometer_quat * self.gyroscope_quat
    }

    /// Returns the 6D orientation quaternion as `[w, x, y, z]`.
    #[must_use]
    pub fn quaternion_wxyz(&self) -> [Real; 4] {
        let q = self.orientation();
        [q.w, q.i, q.j, q.k]
    }

    /// Returns the pure gyroscope strapdown integration quaternion, without
    /// any inclination correction.
    #[must_use]
    pub fn strapdown_orientation(&self) -> UnitQuaternion<Real> {
        self.gyroscope_quat
    }

    /// Returns `true` if a rest phase has been detected.
    ///
    /// This is only the case once the gyroscope and accelerometer deviations
    /// have stayed within their thresholds for at least
    /// [`VqfParameters::rest_min_duration`].
    #[must_use]
    pub fn is_rest_phase(&self) -> bool {
        self.rest_detected
    }

    /// Returns the deviations used by the rest detection, relative to their
    /// thresholds, as `[gyroscope, accelerometer]`.
    ///
    /// Rest is only detected while both values are below 1.
    #[must_use]
    pub fn relative_rest_deviations(&self, params: &VqfParameters) -> [Real; 2] {
        [
            self.rest_squared_deviations[0].sqrt() / deg_to_rad(params.rest_threshold_gyro),
            self.rest_squared_deviations[1].sqrt() / params.rest_threshold_accel,
        ]
    }

    /// Angular rate in rad/s of the last inclination correction step.
    #[must_use]
    pub fn last_accel_correction_rate(&self) -> Real {
        self.last_accel_correction_rate
    }

    /// Returns the current gyroscope bias estimate in rad/s, together with an
    /// upper bound of its standard deviation in rad/s.
    ///
    /// The largest absolute row sum of the covariance matrix bounds its largest
    /// eigenvalue (Gershgorin circle theorem). The bound is clipped to the
    /// initial uncertainty.
    #[must_use]
    pub fn bias_estimate(&self, coefficients: &VqfCoefficients) -> (Vector3<Real>, Real) {
        let p = self
            .bias_p
            .abs()
            .row_iter()
            .map(|row| row.sum())
            .fold(0.0, Real::max)
            .min(coefficients.bias.p0);

        (self.bias, p.sqrt() * PI / 100.0 / 180.0)
    }

    /// Overwrites the gyroscope bias estimate (in rad/s).
    ///
    /// If `sigma` is given and positive, the covariance is reset to that
    /// standard deviation (in rad/s), otherwise it is left unchanged.
    pub fn set_bias_estimate(&mut self, bias: Vector3<Real>, sigma: Option<Real>) {
        self.bias = bias;
        if let Some(sigma) = sigma.filter(|sigma| *sigma > 0.0) {
            let p = (sigma * (180.0 * 100.0 / PI)).powi(2);
            self.bias_p = Matrix3::from_diagonal_element(p);
        }
    }

    /// Ends a rest phase, or a candidate rest phase that has not yet lasted
    /// long enough.
    pub(crate) fn leave_rest(&mut self) {
        if self.rest_detected {
            log::debug!("rest phase ended, bias estimate {:?}", self.bias);
        }
        self.rest = None;
        self.rest_detected = false;
    }

    /// Clears the rest detection, e.g. when it is disabled or re-enabled.
    pub(crate) fn reset_rest_detection(&mut self) {
        self.rest = None;
        self.rest_detected = false;
        self.rest_squared_deviations = Vector2::zeros();
        self.rest_gyro_low_pass = MeanInitializedLowPassFilter::new();
        self.rest_accel_low_pass = MeanInitializedLowPassFilter::new();
    }

    /// Clears the low-pass filters of the motion bias estimation.
    pub(crate) fn reset_motion_bias_estimation(&mut self) {
        self.motion_bias_estimate_rotation_low_pass = MeanInitializedLowPassFilter::new();
        self.motion_bias_estimate_low_pass = MeanInitializedLowPassFilter::new();
    }
}
