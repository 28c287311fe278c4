//! FFT utilities for spectral processing
//!
//! Thin wrapper around `rustfft` providing the building blocks the rest of
//! the crate needs: forward/inverse transforms with a cached plan,
//! `fftshift` reordering, magnitude-peak localization with sub-bin
//! interpolation, and FFT-based cross-correlation (used by the frequency
//! alignment operator).
//!
//! ## Example
//!
//! ```rust
//! use mrs_core::fft::FftProcessor;
//! use num_complex::Complex64;
//!
//! let n = 64;
//! let signal: Vec<Complex64> = (0..n)
//!     .map(|i| {
//!         let phase = 2.0 * std::f64::consts::PI * 8.0 * i as f64 / n as f64;
//!         Complex64::new(phase.cos(), phase.sin())
//!     })
//!     .collect();
//!
//! let mut processor = FftProcessor::new(n);
//! let spectrum = processor.fft(&signal);
//! let (peak_bin, _, _) = FftProcessor::find_peak(&spectrum);
//! assert_eq!(peak_bin, 8);
//! ```

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

/// FFT processor with cached forward and inverse plans for one size.
pub struct FftProcessor {
    /// Transform size
    size: usize,
    /// Forward FFT instance
    fft_forward: Arc<dyn Fft<f64>>,
    /// Inverse FFT instance
    fft_inverse: Arc<dyn Fft<f64>>,
    /// Scratch buffer shared by both directions
    scratch: Vec<Complex64>,
}

impl fmt::Debug for FftProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftProcessor")
            .field("size", &self.size)
            .finish()
    }
}

impl FftProcessor {
    /// Create a new FFT processor for the given size.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(size);
        let fft_inverse = planner.plan_fft_inverse(size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());
        let scratch = vec![Complex64::new(0.0, 0.0); scratch_len];

        Self {
            size,
            fft_forward,
            fft_inverse,
            scratch,
        }
    }

    /// Transform size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Compute the forward FFT in-place.
    pub fn fft_inplace(&mut self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_forward
            .process_with_scratch(buffer, &mut self.scratch);
    }

    /// Compute the forward FFT, returning a new buffer.
    ///
    /// The input is zero-padded (or must not exceed) the planned size.
    pub fn fft(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input.to_vec();
        buffer.resize(self.size, Complex64::new(0.0, 0.0));
        self.fft_inplace(&mut buffer);
        buffer
    }

    /// Compute the inverse FFT in-place, normalized by 1/N.
    pub fn ifft_inplace(&mut self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_inverse
            .process_with_scratch(buffer, &mut self.scratch);

        let scale = 1.0 / self.size as f64;
        for sample in buffer.iter_mut() {
            *sample *= scale;
        }
    }

    /// Compute the inverse FFT, returning a new buffer.
    pub fn ifft(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer = input.to_vec();
        buffer.resize(self.size, Complex64::new(0.0, 0.0));
        self.ifft_inplace(&mut buffer);
        buffer
    }

    /// Find the magnitude peak of a spectrum.
    ///
    /// Returns (bin_index, magnitude, phase).
    pub fn find_peak(spectrum: &[Complex64]) -> (usize, f64, f64) {
        let mut max_idx = 0;
        let mut max_mag = 0.0;

        for (i, &sample) in spectrum.iter().enumerate() {
            let mag = sample.norm();
            if mag > max_mag {
                max_mag = mag;
                max_idx = i;
            }
        }

        let phase = spectrum[max_idx].arg();
        (max_idx, max_mag, phase)
    }

    /// Find the magnitude peak with parabolic interpolation for sub-bin
    /// resolution.
    ///
    /// Returns (interpolated_index, magnitude). Neighbors wrap around the
    /// ends of the buffer, which is the correct behavior for circular
    /// correlation outputs.
    pub fn find_peak_interpolated(spectrum: &[Complex64]) -> (f64, f64) {
        let n = spectrum.len();
        let (k, mag, _) = Self::find_peak(spectrum);

        if n < 3 {
            return (k as f64, mag);
        }

        let gamma_prev = spectrum[(k + n - 1) % n].norm();
        let gamma_curr = spectrum[k].norm();
        let gamma_next = spectrum[(k + 1) % n].norm();

        let denom = gamma_prev - 2.0 * gamma_curr + gamma_next;
        if denom.abs() < 1e-10 {
            return (k as f64, mag);
        }

        let delta = 0.5 * (gamma_prev - gamma_next) / denom;
        let interpolated_idx = k as f64 + delta;
        let interpolated_mag = gamma_curr - 0.25 * (gamma_prev - gamma_next) * delta;

        (interpolated_idx, interpolated_mag)
    }

    /// FFT shift: move the zero-frequency bin to the center of the buffer.
    pub fn fft_shift<T: Clone>(spectrum: &[T]) -> Vec<T> {
        let n = spectrum.len();
        let mid = n.div_ceil(2);
        let mut shifted = Vec::with_capacity(n);
        shifted.extend_from_slice(&spectrum[mid..]);
        shifted.extend_from_slice(&spectrum[..mid]);
        shifted
    }

    /// Inverse of [`FftProcessor::fft_shift`].
    pub fn ifft_shift<T: Clone>(spectrum: &[T]) -> Vec<T> {
        let n = spectrum.len();
        let mid = n / 2;
        let mut shifted = Vec::with_capacity(n);
        shifted.extend_from_slice(&spectrum[mid..]);
        shifted.extend_from_slice(&spectrum[..mid]);
        shifted
    }
}

/// Circular cross-correlation of two equal-domain signals using the FFT.
///
/// `result[k] = Σ_n signal[n] · conj(reference[n - k])`, so a peak at lag
/// `k` means `signal` matches `reference` displaced by `+k` elements
/// (indices above half the transform length represent negative lags).
pub fn cross_correlate(signal: &[Complex64], reference: &[Complex64]) -> Vec<Complex64> {
    let n = signal.len().max(reference.len()).next_power_of_two() * 2;
    let mut processor = FftProcessor::new(n);

    let mut sig_padded: Vec<Complex64> = signal.to_vec();
    sig_padded.resize(n, Complex64::new(0.0, 0.0));

    let mut ref_padded: Vec<Complex64> = reference.to_vec();
    ref_padded.resize(n, Complex64::new(0.0, 0.0));

    processor.fft_inplace(&mut sig_padded);
    processor.fft_inplace(&mut ref_padded);

    for i in 0..n {
        sig_padded[i] *= ref_padded[i].conj();
    }

    processor.ifft_inplace(&mut sig_padded);

    sig_padded
}

/// Convert a (possibly interpolated) circular correlation peak index into a
/// signed lag in elements.
pub fn correlation_lag(peak_index: f64, fft_len: usize) -> f64 {
    if peak_index > fft_len as f64 / 2.0 {
        peak_index - fft_len as f64
    } else {
        peak_index
    }
}
