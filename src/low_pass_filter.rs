//! Second-order Butterworth low-pass filters for multi-dimensional signals.
//!
//! The filter is split in two parts: [`LowPassCoefficients`], which is derived
//! once from a time constant and a sampling period, and
//! [`MeanInitializedLowPassFilter`], which only holds the delay memory of one
//! filtered signal. The coefficients are passed to every
//! [`MeanInitializedLowPassFilter::filter`] call, so the filter memory never
//! carries a copy of the configuration.

use nalgebra::SMatrix;
use std::time::Duration;

use crate::real::{consts::PI, seconds, Real};

/// Coefficients of a second-order Butterworth low-pass filter.
///
/// The time constant $\tau$ corresponds to the cutoff frequency $f_c$
/// of the filter as follows: $$f_c = \frac{\sqrt(2)}{2 \pi \tau}$$
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vqf_6d::low_pass_filter::LowPassCoefficients;
/// use vqf_6d::Real;
///
/// let tau = Duration::from_secs(1);
/// let sampling_period = Duration::from_millis(100);
/// let coefficients = LowPassCoefficients::second_order_butterworth(tau, sampling_period);
///
/// // unity gain at DC
/// let dc_gain = coefficients.b.iter().sum::<Real>() / (1.0 + coefficients.a.iter().sum::<Real>());
/// assert!((dc_gain - 1.0).abs() < 1e-5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LowPassCoefficients {
    /// The numerator coefficients of the filter.
    pub b: [Real; 3],
    /// The denominator coefficients of the filter, assuming `a0 = 1.0`.
    pub a: [Real; 2],
    /// Time constant in seconds, used for the initialization step.
    pub tau: Real,
    /// Time between two samples of the signal, in seconds.
    pub sampling_period: Real,
}

impl LowPassCoefficients {
    /// Computes the coefficients for a second order Butterworth low-pass
    /// filter with time constant `tau`, sampled every `sampling_period`.
    ///
    /// Both durations are expected to be non-zero, this is checked when the
    /// filter coefficients are created from a
    /// [`VqfParameters`](crate::VqfParameters).
    #[must_use]
    pub fn second_order_butterworth(tau: Duration, sampling_period: Duration) -> Self {
        let tau = seconds(tau);
        let sampling_period = seconds(sampling_period);
        let sqrt_2 = Real::sqrt(2.0);

        let fc = sqrt_2 / (2.0 * PI * tau);
        let c = (PI * fc * sampling_period).tan();
        let d = c.powi(2) + sqrt_2 * c + 1.0;

        let b0 = c.powi(2) / d;
        let b1 = 2.0 * b0;
        let b2 = b0;

        let a1 = (2.0 * (c.powi(2) - 1.0)) / d;
        let a2 = (1.0 - sqrt_2 * c + c.powi(2)) / d;

        Self {
            b: [b0, b1, b2],
            a: [a1, a2],
            tau,
            sampling_period,
        }
    }
}

/// Delay memory of a second-order low-pass filter for NxM-dimensional
/// signals, initialized with an arithmetic mean.
///
/// To avoid depending on a single sample, the filter averages all samples it
/// sees during the first $\tau$ seconds and returns that running mean. Once
/// $\tau$ seconds worth of samples have been collected, the mean is used as
/// the steady state the regular filter starts from.
///
/// # Example
///
/// ```rust
/// use nalgebra::Vector3;
/// use std::time::Duration;
/// use vqf_6d::low_pass_filter::{LowPassCoefficients, MeanInitializedLowPassFilter};
///
/// let tau = Duration::from_millis(300);
/// let sampling_period = Duration::from_millis(100);
/// let coefficients = LowPassCoefficients::second_order_butterworth(tau, sampling_period);
/// let mut filter = MeanInitializedLowPassFilter::<3, 1>::new();
///
/// // While initializing, the filter returns the mean of all samples so far.
/// let signal = Vector3::from_element(1.0);
/// assert_eq!(filter.filter(signal, &coefficients), signal);
///
/// let signal = Vector3::from_element(2.0);
/// assert_eq!(filter.filter(signal, &coefficients), Vector3::from_element(1.5));
/// assert!(!filter.is_initialized());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeanInitializedLowPassFilter<const N: usize, const M: usize> {
    /// The number of samples averaged during initialization.
    sample_count: u32,
    /// Whether the mean initialization has completed.
    initialized: bool,
    /// Filter delay elements. During initialization `state[1]` holds the sum
    /// of all samples.
    state: [SMatrix<Real, N, M>; 2],
    /// The last output of the filter.
    last_output: SMatrix<Real, N, M>,
}

impl<const N: usize, const M: usize> Default for MeanInitializedLowPassFilter<N, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const M: usize> MeanInitializedLowPassFilter<N, M> {
    /// Creates a new, uninitialized filter.
    ///
    /// The last output is zero until the first sample has been filtered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sample_count: 0,
            initialized: false,
            state: [SMatrix::zeros(), SMatrix::zeros()],
            last_output: SMatrix::zeros(),
        }
    }

    /// Returns `true` once the mean initialization phase is over.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The last value returned by [`Self::filter`].
    #[must_use]
    pub fn last_output(&self) -> SMatrix<Real, N, M> {
        self.last_output
    }

    /// Filters the provided signal `x` and returns the filtered output.
    ///
    /// # Note
    ///
    /// If the filter is not yet initialized, this method returns the
    /// arithmetic mean of all samples seen so far.
    #[inline]
    #[must_use]
    pub fn filter(
        &mut self,
        x: SMatrix<Real, N, M>,
        coefficients: &LowPassCoefficients,
    ) -> SMatrix<Real, N, M> {
        if !self.initialized {
            return self.filter_arithmetic_mean(x, coefficients);
        }

        let LowPassCoefficients { b, a, .. } = *coefficients;
        let y = x * b[0] + self.state[0];
        self.state[0] = x * b[1] - y * a[0] + self.state[1];
        self.state[1] = x * b[2] - y * a[1];
        self.last_output = y;
        y
    }

    /// Adjusts the filter memory for a change of coefficients, so that the
    /// output continues smoothly from [`Self::last_output`].
    ///
    /// Filters that are still averaging are left untouched, the new
    /// coefficients only matter once the mean initialization completes.
    pub fn adapt_to_coefficients(
        &mut self,
        old: &LowPassCoefficients,
        new: &LowPassCoefficients,
    ) {
        if !self.initialized {
            return;
        }

        let last_y = self.last_output;
        self.state[0] += last_y * (old.b[0] - new.b[0]);
        self.state[1] += last_y * (old.b[1] - new.b[1] - old.a[0] + new.a[0]);
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    fn filter_arithmetic_mean(
        &mut self,
        x: SMatrix<Real, N, M>,
        coefficients: &LowPassCoefficients,
    ) -> SMatrix<Real, N, M> {
        self.sample_count += 1;
        self.state[1] += x;

        let mean = self.state[1] / self.sample_count as Real;
        self.last_output = mean;

        if self.sample_count as Real * coefficients.sampling_period >= coefficients.tau {
            self.state = Self::filter_initial_state(mean, coefficients);
            self.initialized = true;
        }

        mean
    }

    /// Steady state of the delay elements for a constant input `x0`.
    #[inline]
    #[must_use]
    fn filter_initial_state(
        x0: SMatrix<Real, N, M>,
        coefficients: &LowPassCoefficients,
    ) -> [SMatrix<Real, N, M>; 2] {
        let LowPassCoefficients { b, a, .. } = *coefficients;
        [x0 * (1.0 - b[0]), x0 * (b[2] - a[1])]
    }
}
