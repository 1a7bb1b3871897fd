//! Gyroscope bias estimation.
//!
//! A Kalman filter with the three bias components as its state. During rest
//! the low-pass filtered gyroscope reading is a direct measurement of the
//! bias. With [`VqfParameters::do_bias_estimation`] enabled, the inclination
//! correction is used during motion instead: any disagreement between the
//! strapdown orientation and gravity is attributed to bias in the horizontal
//! axes, while an artificial zero measurement with a large variance slowly
//! pulls the unobservable vertical bias to zero. Otherwise the bias estimate
//! is left alone outside of rest.

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::coefficients::VqfCoefficients;
use crate::params::VqfParameters;
use crate::real::{deg_to_rad, Real};
use crate::state::VqfState;

impl VqfState {
    /// Perform the bias estimation step, with `acc_earth` the normalized,
    /// low-pass filtered accelerometer reading in the 6D earth frame before
    /// the latest inclination correction.
    ///
    /// This is roughly equal to the `BiasEstimationStep` procedure from
    /// Algorithm 2 in the paper.
    pub(crate) fn bias_estimation_step(
        &mut self,
        params: &VqfParameters,
        coefficients: &VqfCoefficients,
        acc_earth: Vector3<Real>,
    ) {
        let bias_clip = deg_to_rad(params.bias_clip);
        let bias = self.bias;
        let bias_coefficients = &coefficients.bias;

        // R from line 23
        let r = self.orientation().to_rotation_matrix().into_inner();

        // R b_hat from line 25, the z component is not observable without a
        // magnetometer
        let rb_hat = r * bias;
        let rb_hat = Vector2::new(rb_hat.x, rb_hat.y);

        // line 24 and 25 from Algorithm 2
        let r = self
            .motion_bias_estimate_rotation_low_pass
            .filter(r, &coefficients.accel);
        let bias_lp = self
            .motion_bias_estimate_low_pass
            .filter(rb_hat, &coefficients.accel);

        // measurement error, measurement matrix and measurement noise of the
        // respective Kalman filter update
        let measurement = if self.rest_detected && params.do_rest_bias_estimation {
            Some((
                self.rest_gyro_low_pass.last_output() - bias,
                Matrix3::identity(),
                Vector3::repeat(bias_coefficients.rest_w),
            ))
        } else if params.do_bias_estimation {
            let accel_period = coefficients.accel_period;
            let rb = r * bias;
            Some((
                Vector3::new(
                    -acc_earth.y / accel_period + bias_lp.x - rb.x,
                    acc_earth.x / accel_period + bias_lp.y - rb.y,
                    -rb.z,
                ),
                r,
                Vector3::new(
                    bias_coefficients.motion_w,
                    bias_coefficients.motion_w,
                    bias_coefficients.vertical_w,
                ),
            ))
        } else {
            None
        };

        // step 1: P = P + V (also increase covariance if there is no
        // measurement update!)
        for i in 0..3 {
            if self.bias_p[(i, i)] < bias_coefficients.p0 {
                self.bias_p[(i, i)] += bias_coefficients.v;
            }
        }

        let Some((e, r, w)) = measurement else {
            return;
        };

        // clip disagreement to -2..2 degrees
        let e = e.map(|x| x.clamp(-bias_clip, bias_clip));

        // step 2: K = P R^T (W + R P R^T)^-1 (line 36)
        let innovation = Matrix3::from_diagonal(&w) + r * self.bias_p * r.transpose();
        let k = self.bias_p
            * r.transpose()
            * innovation.try_inverse().unwrap_or_else(Matrix3::zeros);

        // step 3: b = b + k e (line 37)
        let bias = bias + k * e;

        // step 4: P = P - K R P (line 38)
        self.bias_p -= k * r * self.bias_p;

        // ensure that the new bias estimate is within the allowed range
        self.bias = bias.map(|x| x.clamp(-bias_clip, bias_clip));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    fn accel() -> Vector3<Real> {
        Vector3::new(0.0, 0.0, 9.81)
    }

    fn setup(params: &VqfParameters) -> (VqfCoefficients, VqfState) {
        let period = Duration::from_millis(10);
        let coefficients = VqfCoefficients::new(period, period, params).unwrap();
        let state = VqfState::new(&coefficients);
        (coefficients, state)
    }

    #[test]
    fn rest_estimates_constant_offset() {
        let params = VqfParameters::default();
        let (coefficients, mut state) = setup(&params);
        let offset = Vector3::new(0.01, -0.02, 0.015);

        for _ in 0..2000 {
            state.update_gyro(&params, &coefficients, offset);
            state.update_accel(&params, &coefficients, accel());
        }

        assert!(state.is_rest_phase());
        let (bias, sigma) = state.bias_estimate(&coefficients);
        assert_abs_diff_eq!(bias, offset, epsilon = 1e-4);
        assert!(sigma < deg_to_rad(0.5));
    }

    #[test]
    fn bias_stays_within_clip() {
        let params = VqfParameters {
            do_bias_estimation: true,
            ..Default::default()
        };
        let (coefficients, mut state) = setup(&params);
        // larger than the clip, rest detection must not trigger on it
        let offset = Vector3::new(0.1, 0.0, 0.0);

        for _ in 0..2000 {
            state.update_gyro(&params, &coefficients, offset);
            state.update_accel(&params, &coefficients, accel());
        }

        assert!(!state.is_rest_phase());
        let clip = deg_to_rad(params.bias_clip);
        assert!(state.bias.iter().all(|b| b.abs() <= clip));
    }

    #[test]
    fn disabled_estimation_keeps_bias() {
        let params = VqfParameters {
            do_bias_estimation: false,
            do_rest_bias_estimation: false,
            ..Default::default()
        };
        let (coefficients, mut state) = setup(&params);

        for _ in 0..500 {
            state.update_gyro(&params, &coefficients, Vector3::new(0.01, 0.0, 0.0));
            state.update_accel(&params, &coefficients, accel());
        }
        assert_eq!(state.bias, Vector3::zeros());
    }

    #[test]
    fn covariance_only_grows_without_measurement() {
        let params = VqfParameters {
            do_bias_estimation: false,
            ..Default::default()
        };
        let (coefficients, mut state) = setup(&params);
        state.set_bias_estimate(Vector3::zeros(), Some(deg_to_rad(0.1)));
        let before = state.bias_p[(0, 0)];

        // moving, so the rest branch is not taken either
        for i in 0..100u8 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            state.update_gyro(&params, &coefficients, Vector3::new(sign, 0.0, 0.0));
            state.update_accel(&params, &coefficients, accel());
        }

        assert!(state.bias_p[(0, 0)] > before);
        assert_eq!(state.bias, Vector3::zeros());
    }
}
