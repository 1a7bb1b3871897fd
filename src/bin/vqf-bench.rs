//! Measures the cost of one gyroscope and one accelerometer update.
//!
//! Runs the filter on a constant slow rotation with gravity along the z axis
//! and prints the elapsed wall-clock time together with the final
//! orientation.

use std::time::{Duration, Instant};

use nalgebra::Vector3;
use vqf_6d::{ConfigurationResult, Real, VqfCoefficients, VqfParameters, VqfState};

const ITERATIONS: u32 = 50_000;

fn main() -> ConfigurationResult<()> {
    env_logger::init();

    let period = Duration::from_millis(1);
    let params = VqfParameters {
        tau_accelerometer: Duration::from_millis(10),
        ..Default::default()
    };
    let coefficients = VqfCoefficients::new(period, period, &params)?;
    let mut state = VqfState::new(&coefficients);

    let gyro = Vector3::new(0.01, 0.02, 0.03);
    let accel = Vector3::new(0.0, 0.0, 9.81);

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        state.update_gyro(&params, &coefficients, gyro);
        state.update_accel(&params, &coefficients, accel);
    }
    let elapsed = start.elapsed();

    let per_iteration = elapsed.as_secs_f64() * 1e9 / f64::from(ITERATIONS);

    println!("Iterations: {ITERATIONS}");
    println!(
        "Nanoseconds total: {}, nanoseconds/iter: {per_iteration:.2}",
        elapsed.as_nanos()
    );

    let [w, x, y, z]: [Real; 4] = state.quaternion_wxyz();
    println!("sample quaternion: [{w:.6}, {x:.6}, {y:.6}, {z:.6}]");

    Ok(())
}
