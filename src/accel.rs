//! Accelerometer update step: inclination correction and rest detection.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::coefficients::VqfCoefficients;
use crate::params::VqfParameters;
use crate::real::{seconds, Real, EPS};
use crate::state::VqfState;

impl VqfState {
    /// Perform the accelerometer update step, using the accelerometer readings
    /// in m/s^2.
    ///
    /// The reading is rotated into the strapdown frame, low-pass filtered
    /// there, and the inclination correction quaternion is updated so that the
    /// filtered reading points straight up. The low-pass filter sets the
    /// crossover between gyroscope and accelerometer at
    /// [`VqfParameters::tau_accelerometer`].
    ///
    /// Samples with a (near) zero norm are skipped entirely and leave the
    /// state unchanged.
    pub fn update_accel(
        &mut self,
        params: &VqfParameters,
        coefficients: &VqfCoefficients,
        accel: Vector3<Real>,
    ) {
        // ignore 0 acceleration
        if accel.norm() <= EPS {
            log::trace!("skipping degenerate accelerometer sample {accel:?}");
            return;
        }

        if params.do_rest_bias_estimation {
            self.accel_rest_detection(params, coefficients, accel);
        }

        // filter the reading in the strapdown frame
        let acc_earth = self.gyroscope_quat * accel;
        let accel_lp = self
            .accelerometer_low_pass
            .filter(acc_earth, &coefficients.accel);

        // transform to the 6D earth frame
        let Some(acc_earth) = (self.accelerometer_quat * accel_lp).try_normalize(EPS) else {
            log::trace!("skipping inclination correction, filtered reading is {accel_lp:?}");
            return;
        };

        let correction = inclination_correction(&acc_earth);
        self.accelerometer_quat =
            UnitQuaternion::new_normalize((correction * self.accelerometer_quat).into_inner());

        self.last_accel_correction_rate =
            acc_earth.z.clamp(-1.0, 1.0).acos() / coefficients.accel_period;

        if params.do_bias_estimation || params.do_rest_bias_estimation {
            self.bias_estimation_step(params, coefficients, acc_earth);
        }
    }

    fn accel_rest_detection(
        &mut self,
        params: &VqfParameters,
        coefficients: &VqfCoefficients,
        accel: Vector3<Real>,
    ) {
        let accel_lp = self.rest_accel_low_pass.filter(accel, &coefficients.rest_accel);
        let deviation = accel - accel_lp;
        let squared_deviation = deviation.dot(&deviation);
        self.rest_squared_deviations[1] = squared_deviation;

        if squared_deviation >= params.rest_threshold_accel.powi(2) {
            self.leave_rest();
            return;
        }

        let rest = self.rest.unwrap_or_default() + coefficients.accel_period;
        self.rest = Some(rest);
        if !self.rest_detected && rest >= seconds(params.rest_min_duration) {
            self.rest_detected = true;
            log::debug!("rest phase detected after {rest} s");
        }
    }
}

/// The shortest rotation that takes the normalized vector `acc_earth` to
/// `[0, 0, 1]` (eq. 4 and 5).
fn inclination_correction(acc_earth: &Vector3<Real>) -> UnitQuaternion<Real> {
    let q_w = ((acc_earth.z + 1.0) / 2.0).sqrt();

    let correction = if q_w > 1e-6 {
        Quaternion::new(q_w, 0.5 * acc_earth.y / q_w, -0.5 * acc_earth.x / q_w, 0.0)
    } else {
        // the reading points (almost) straight down, any 180° rotation about
        // a horizontal axis will do
        Quaternion::new(0.0, 1.0, 0.0, 0.0)
    };

    UnitQuaternion::new_unchecked(correction)
}
