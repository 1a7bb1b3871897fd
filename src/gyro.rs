//! Gyroscope update step: strapdown integration of the angular rate.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::coefficients::VqfCoefficients;
use crate::params::VqfParameters;
use crate::real::{deg_to_rad, Real, EPS};
use crate::state::VqfState;

impl VqfState {
    /// Perform the gyroscope update step, using the gyroscope readings in
    /// rad/s.
    ///
    /// The sample is assumed to be taken exactly one gyroscope period after
    /// the previous one. The bias-corrected rate is integrated with the exact
    /// exponential map of a rate that is constant over the period, i.e. the
    /// increment is a rotation by $\lVert\omega\rVert T_s$ about
    /// $\omega / \lVert\omega\rVert$. This is exact for constant rates, so the
    /// only error source is floating point rounding.
    ///
    /// Non-finite samples are not guarded against and propagate into the
    /// orientation.
    pub fn update_gyro(
        &mut self,
        params: &VqfParameters,
        coefficients: &VqfCoefficients,
        gyro: Vector3<Real>,
    ) {
        if params.do_rest_bias_estimation {
            self.gyro_rest_detection(params, coefficients, gyro);
        }

        let unbiased_gyro = gyro - self.bias;
        let gyro_norm = unbiased_gyro.norm();

        // written so that a NaN norm falls through and propagates
        if gyro_norm <= EPS {
            return;
        }

        // predict the new orientation (eq. 3)
        let half_angle = 0.5 * gyro_norm * coefficients.gyro_period;
        let (sine, cosine) = half_angle.sin_cos();
        let axis = unbiased_gyro * (sine / gyro_norm);
        let gyro_step = Quaternion::new(cosine, axis.x, axis.y, axis.z);

        self.gyroscope_quat =
            UnitQuaternion::new_normalize(self.gyroscope_quat.into_inner() * gyro_step);
    }

    fn gyro_rest_detection(
        &mut self,
        params: &VqfParameters,
        coefficients: &VqfCoefficients,
        gyro: Vector3<Real>,
    ) {
        let gyro_lp = self.rest_gyro_low_pass.filter(gyro, &coefficients.rest_gyro);
        let deviation = gyro - gyro_lp;
        let squared_deviation = deviation.dot(&deviation);
        self.rest_squared_deviations[0] = squared_deviation;

        let bias_clip = deg_to_rad(params.bias_clip);
        if squared_deviation >= deg_to_rad(params.rest_threshold_gyro).powi(2)
            || gyro_lp.abs().max() > bias_clip
        {
            self.leave_rest();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    fn setup(period: Duration) -> (VqfParameters, VqfCoefficients, VqfState) {
        let params = VqfParameters::default();
        let coefficients = VqfCoefficients::new(period, period, &params).unwrap();
        let state = VqfState::new(&coefficients);
        (params, coefficients, state)
    }

    #[test]
    fn zero_rate_keeps_identity() {
        let (params, coefficients, mut state) = setup(Duration::from_millis(10));
        state.update_gyro(&params, &coefficients, Vector3::zeros());
        assert_eq!(state.orientation(), UnitQuaternion::identity());
    }

    #[test]
    fn single_step_matches_axis_angle() {
        let (params, coefficients, mut state) = setup(Duration::from_millis(100));
        state.update_gyro(&params, &coefficients, Vector3::new(0.5, 0.0, 0.0));

        let (roll, pitch, yaw) = state.orientation().euler_angles();
        assert_abs_diff_eq!(roll, 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(pitch, 0.0);
        assert_abs_diff_eq!(yaw, 0.0);
    }

    #[test]
    fn bias_is_removed_before_integration() {
        let (params, coefficients, mut state) = setup(Duration::from_millis(10));
        let bias = Vector3::new(0.01, -0.02, 0.03);
        state.set_bias_estimate(bias, None);

        for _ in 0..100 {
            state.update_gyro(&params, &coefficients, bias);
        }
        assert_eq!(state.orientation(), UnitQuaternion::identity());
    }

    #[test]
    fn gyro_update_only_touches_orientation_and_rest_memory() {
        let (params, coefficients, mut state) = setup(Duration::from_millis(10));
        let before = state.clone();
        state.update_gyro(&params, &coefficients, Vector3::new(0.3, 0.2, 0.1));

        assert_ne!(state.gyroscope_quat, before.gyroscope_quat);
        assert_eq!(state.accelerometer_quat, before.accelerometer_quat);
        assert_eq!(state.bias, before.bias);
        assert_eq!(state.bias_p, before.bias_p);
        assert_eq!(state.accelerometer_low_pass, before.accelerometer_low_pass);
    }

    #[test]
    fn fast_rotation_clears_rest() {
        let (params, coefficients, mut state) = setup(Duration::from_millis(10));
        state.rest = Some(10.0);
        state.rest_detected = true;

        state.update_gyro(&params, &coefficients, Vector3::new(1.0, 0.0, 0.0));
        assert!(!state.is_rest_phase());
        assert_eq!(state.rest, None);
    }
}
