//! Spectral transform utilities
//!
//! Pure conversion functions between the time domain (FID) and the
//! frequency domain (spectrum), plus axis construction and unit
//! conversion between Hz and ppm.
//!
//! Conventions: `fid_to_spec` is `fftshift(fft(fid))`, so the returned
//! spectrum is ordered with ascending frequency from `-bandwidth/2`.
//! The frequency axis is an inclusive linspace over
//! `[-bandwidth/2, bandwidth/2]`, and the shifted ppm axis places the
//! water resonance at [`H2O_PPM_TO_TMS`] ppm.
//!
//! ## Example
//!
//! ```rust
//! use mrs_core::spectral::{fid_to_spec, spec_to_fid};
//! use num_complex::Complex64;
//!
//! let fid: Vec<Complex64> = (0..32)
//!     .map(|i| Complex64::new((-0.1 * i as f64).exp(), 0.0))
//!     .collect();
//! let spec = fid_to_spec(&fid);
//! let back = spec_to_fid(&spec);
//! for (a, b) in fid.iter().zip(back.iter()) {
//!     assert!((a - b).norm() < 1e-12);
//! }
//! ```

use num_complex::Complex64;

use crate::fft::FftProcessor;
use crate::types::H2O_PPM_TO_TMS;

/// Transform a time-domain FID into an ascending-frequency spectrum.
pub fn fid_to_spec(fid: &[Complex64]) -> Vec<Complex64> {
    let mut processor = FftProcessor::new(fid.len());
    let spectrum = processor.fft(fid);
    FftProcessor::fft_shift(&spectrum)
}

/// Transform an ascending-frequency spectrum back into a FID.
pub fn spec_to_fid(spec: &[Complex64]) -> Vec<Complex64> {
    let unshifted = FftProcessor::ifft_shift(spec);
    let mut processor = FftProcessor::new(spec.len());
    processor.ifft(&unshifted)
}

/// Time axis: `n` samples spaced by `dwelltime`, starting at `start`.
pub fn time_axis(dwelltime: f64, n: usize, start: f64) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * dwelltime).collect()
}

/// Frequency axis matching [`fid_to_spec`] ordering: inclusive linspace
/// over `[-bandwidth/2, bandwidth/2]`.
pub fn frequency_axis(bandwidth: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![0.0];
    }
    let step = bandwidth / (n - 1) as f64;
    (0..n).map(|i| -bandwidth / 2.0 + i as f64 * step).collect()
}

/// Convert a frequency in Hz to ppm for a spectrometer frequency given in
/// Hz. When `shift` is true the axis is referenced to water.
pub fn hz_to_ppm(spectrometer_frequency_hz: f64, hz: f64, shift: bool) -> f64 {
    let cf_mhz = spectrometer_frequency_hz * 1e-6;
    let ppm = hz / cf_mhz;
    if shift {
        ppm + H2O_PPM_TO_TMS
    } else {
        ppm
    }
}

/// Convert a chemical shift in ppm to a frequency in Hz.
pub fn ppm_to_hz(spectrometer_frequency_hz: f64, ppm: f64, shift: bool) -> f64 {
    let cf_mhz = spectrometer_frequency_hz * 1e-6;
    if shift {
        (ppm - H2O_PPM_TO_TMS) * cf_mhz
    } else {
        ppm * cf_mhz
    }
}

/// ppm axis matching [`fid_to_spec`] ordering.
pub fn ppm_axis(bandwidth: f64, n: usize, spectrometer_frequency_hz: f64, shift: bool) -> Vec<f64> {
    frequency_axis(bandwidth, n)
        .into_iter()
        .map(|f| hz_to_ppm(spectrometer_frequency_hz, f, shift))
        .collect()
}

/// Contiguous bin range of the spectrum whose (shifted) ppm value falls in
/// the window. Limits may be given in either order; the range may be empty
/// if the window lies outside the sampled bandwidth.
pub fn ppm_window_range(
    bandwidth: f64,
    n: usize,
    spectrometer_frequency_hz: f64,
    ppmlim: (f64, f64),
    shift: bool,
) -> std::ops::Range<usize> {
    let (lo, hi) = if ppmlim.0 <= ppmlim.1 {
        (ppmlim.0, ppmlim.1)
    } else {
        (ppmlim.1, ppmlim.0)
    };
    let axis = ppm_axis(bandwidth, n, spectrometer_frequency_hz, shift);
    let start = axis.partition_point(|&p| p < lo);
    let end = axis.partition_point(|&p| p <= hi);
    start..end.max(start)
}

/// Extract the portion of a FID's spectrum within a ppm window.
///
/// Returns the spectrum slice and the index of its first bin within the
/// full spectrum.
pub fn extract_spectrum(
    fid: &[Complex64],
    bandwidth: f64,
    spectrometer_frequency_hz: f64,
    ppmlim: (f64, f64),
    shift: bool,
) -> (Vec<Complex64>, usize) {
    let spec = fid_to_spec(fid);
    let range = ppm_window_range(bandwidth, fid.len(), spectrometer_frequency_hz, ppmlim, shift);
    let start = range.start;
    (spec[range].to_vec(), start)
}
