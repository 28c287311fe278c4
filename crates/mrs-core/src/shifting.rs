//! Time-domain shifting, padding, truncation and resampling
//!
//! Operators that change where a FID starts and ends, how many samples it
//! carries, or where its spectrum sits on the frequency axis:
//!
//! - [`pad`] / [`truncate`]: add or drop samples at either end.
//! - [`timeshift`]: signed start/end time offsets (rounded to whole
//!   samples) followed by band-limited resampling to an explicit sample
//!   count; returns the new dwell time.
//! - [`freqshift`]: rigid spectral translation by mixing with a complex
//!   exponential.
//! - [`shift_to_ref`]: locate the largest peak in a ppm search window and
//!   shift it onto a reference chemical shift.

use num_complex::Complex64;

use crate::fft::FftProcessor;
use crate::spectral;
use crate::types::{MrsError, MrsResult, PadSide};

/// Append or prepend `n` zero samples.
pub fn pad(fid: &[Complex64], n: usize, side: PadSide) -> Vec<Complex64> {
    let zero = Complex64::new(0.0, 0.0);
    let mut out = Vec::with_capacity(fid.len() + n);
    match side {
        PadSide::First => {
            out.resize(n, zero);
            out.extend_from_slice(fid);
        }
        PadSide::Last => {
            out.extend_from_slice(fid);
            out.resize(fid.len() + n, zero);
        }
    }
    out
}

/// Drop `n` samples from one end.
pub fn truncate(fid: &[Complex64], n: usize, side: PadSide) -> MrsResult<Vec<Complex64>> {
    if n >= fid.len() {
        return Err(MrsError::InvalidArgument(format!(
            "cannot truncate {n} samples from a {}-sample FID",
            fid.len()
        )));
    }
    Ok(match side {
        PadSide::First => fid[n..].to_vec(),
        PadSide::Last => fid[..fid.len() - n].to_vec(),
    })
}

/// Band-limited resampling to `new_len` samples via spectral crop/pad.
///
/// Preserves time-domain amplitude; the sampled bandwidth shrinks or grows
/// with the sample count while the total duration is unchanged.
pub fn fourier_resample(fid: &[Complex64], new_len: usize) -> Vec<Complex64> {
    let old_len = fid.len();
    if new_len == old_len {
        return fid.to_vec();
    }

    let mut forward = FftProcessor::new(old_len);
    let spec = FftProcessor::fft_shift(&forward.fft(fid));

    let zero = Complex64::new(0.0, 0.0);
    let centered: Vec<Complex64> = if new_len > old_len {
        // Zero-pad symmetrically around the center
        let total = new_len - old_len;
        let left = total / 2;
        let mut out = vec![zero; left];
        out.extend_from_slice(&spec);
        out.resize(new_len, zero);
        out
    } else {
        // Crop symmetrically around the center
        let total = old_len - new_len;
        let left = total / 2;
        spec[left..left + new_len].to_vec()
    };

    let mut inverse = FftProcessor::new(new_len);
    let mut out = inverse.ifft(&FftProcessor::ifft_shift(&centered));
    let scale = new_len as f64 / old_len as f64;
    for x in out.iter_mut() {
        *x *= scale;
    }
    out
}

/// Shift the FID in time by `shift_start`/`shift_end` seconds (rounded to
/// whole samples) and resample to `samples` points.
///
/// A positive start shift removes samples from the start, a negative one
/// prepends zeros. A positive end shift appends zeros, a negative one
/// truncates. Returns the resampled FID and its new dwell time.
pub fn timeshift(
    fid: &[Complex64],
    dwelltime: f64,
    shift_start: f64,
    shift_end: f64,
    samples: usize,
) -> MrsResult<(Vec<Complex64>, f64)> {
    if samples == 0 {
        return Err(MrsError::InvalidArgument(
            "cannot resample to zero samples".to_string(),
        ));
    }

    let n_start = (shift_start / dwelltime).round() as i64;
    let n_end = (shift_end / dwelltime).round() as i64;

    let mut work: Vec<Complex64> = if n_start >= 0 {
        truncate(fid, n_start as usize, PadSide::First)?
    } else {
        pad(fid, (-n_start) as usize, PadSide::First)
    };
    work = if n_end >= 0 {
        pad(&work, n_end as usize, PadSide::Last)
    } else {
        truncate(&work, (-n_end) as usize, PadSide::Last)?
    };

    let duration = work.len() as f64 * dwelltime;
    let new_dwelltime = duration / samples as f64;
    Ok((fourier_resample(&work, samples), new_dwelltime))
}

/// Translate the spectrum by `amount_hz` by mixing with a complex
/// exponential in the time domain.
pub fn freqshift(fid: &[Complex64], dwelltime: f64, amount_hz: f64) -> Vec<Complex64> {
    let w = 2.0 * std::f64::consts::PI * amount_hz * dwelltime;
    fid.iter()
        .enumerate()
        .map(|(i, &x)| x * Complex64::from_polar(1.0, w * i as f64))
        .collect()
}

/// Shift the largest spectral peak inside `ppmlim` onto `ppm_ref`.
///
/// Purely positional: the applied correction is a frequency shift, no
/// phase is touched. Returns the shifted FID and the applied shift in Hz.
pub fn shift_to_ref(
    fid: &[Complex64],
    ppm_ref: f64,
    bandwidth: f64,
    spectrometer_frequency_hz: f64,
    ppmlim: (f64, f64),
) -> MrsResult<(Vec<Complex64>, f64)> {
    let n = fid.len();
    let spec = spectral::fid_to_spec(fid);
    let range = spectral::ppm_window_range(bandwidth, n, spectrometer_frequency_hz, ppmlim, true);
    if range.is_empty() {
        return Err(MrsError::InvalidArgument(format!(
            "peak search window {ppmlim:?} ppm lies outside the sampled bandwidth"
        )));
    }

    let start = range.start;
    let window = &spec[range];
    let (k, _, _) = FftProcessor::find_peak(window);

    // Parabolic refinement on the full spectrum, clamped to the interior
    let k_full = start + k;
    let delta = if k_full > 0 && k_full + 1 < n {
        let prev = spec[k_full - 1].norm();
        let curr = spec[k_full].norm();
        let next = spec[k_full + 1].norm();
        let denom = prev - 2.0 * curr + next;
        if denom.abs() < 1e-12 {
            0.0
        } else {
            (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
        }
    } else {
        0.0
    };

    let axis = spectral::ppm_axis(bandwidth, n, spectrometer_frequency_hz, true);
    let bin_ppm = if n > 1 { axis[1] - axis[0] } else { 0.0 };
    let peak_ppm = axis[k_full] + delta * bin_ppm;

    let shift_hz = spectral::ppm_to_hz(spectrometer_frequency_hz, ppm_ref - peak_ppm, false);
    Ok((freqshift(fid, 1.0 / bandwidth, shift_hz), shift_hz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn tone(n: usize, bw: f64, freq: f64) -> Vec<Complex64> {
        let dt = 1.0 / bw;
        (0..n)
            .map(|i| Complex64::from_polar(1.0, 2.0 * PI * freq * i as f64 * dt))
            .collect()
    }

    #[test]
    fn test_pad_first_last() {
        let fid = vec![c(1.0, 0.0), c(2.0, 0.0)];
        let first = pad(&fid, 2, PadSide::First);
        assert_eq!(first.len(), 4);
        assert_eq!(first[0], c(0.0, 0.0));
        assert_eq!(first[2], c(1.0, 0.0));

        let last = pad(&fid, 1, PadSide::Last);
        assert_eq!(last, vec![c(1.0, 0.0), c(2.0, 0.0), c(0.0, 0.0)]);
    }

    #[test]
    fn test_truncate() {
        let fid = vec![c(1.0, 0.0), c(2.0, 0.0), c(3.0, 0.0)];
        assert_eq!(truncate(&fid, 1, PadSide::First).unwrap(), fid[1..]);
        assert_eq!(truncate(&fid, 2, PadSide::Last).unwrap(), fid[..1]);
        assert!(truncate(&fid, 3, PadSide::First).is_err());
    }

    #[test]
    fn test_fourier_resample_identity() {
        let fid = tone(128, 1000.0, 100.0);
        let out = fourier_resample(&fid, 128);
        for (a, b) in fid.iter().zip(out.iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_fourier_resample_preserves_tone() {
        // Downsampling 256 -> 128 halves the bandwidth (1000 -> 500 Hz)
        // over the same duration. A bin-centred in-band tone comes out as
        // the same tone sampled at the new rate.
        let fid = tone(256, 1000.0, 125.0);
        let out = fourier_resample(&fid, 128);
        assert_eq!(out.len(), 128);
        let want = tone(128, 500.0, 125.0);
        for (a, b) in out.iter().zip(want.iter()) {
            assert!((a - b).norm() < 1e-9, "got {a}, want {b}");
        }
    }

    #[test]
    fn test_timeshift_pad_only() {
        let bw = 1000.0;
        let dt = 1.0 / bw;
        let fid = tone(128, bw, 50.0);
        // Prepend two zero samples, keep length 130
        let (out, new_dt) = timeshift(&fid, dt, -2.0 * dt, 0.0, 130).unwrap();
        assert_eq!(out.len(), 130);
        assert!((new_dt - dt).abs() < 1e-12);
        assert!(out[0].norm() < 1e-9);
        assert!(out[1].norm() < 1e-9);
    }

    #[test]
    fn test_timeshift_resample_conserves_duration() {
        let bw = 4000.0;
        let dt = 1.0 / bw;
        let fid = tone(512, bw, 100.0);
        let (out, new_dt) = timeshift(&fid, dt, 0.0, 0.0, 256).unwrap();
        assert_eq!(out.len(), 256);
        assert!((new_dt * 256.0 - dt * 512.0).abs() < 1e-12);
    }

    #[test]
    fn test_freqshift_moves_peak() {
        let bw = 1000.0;
        let n = 256;
        let fid = tone(n, bw, 100.0);
        let shifted = freqshift(&fid, 1.0 / bw, 50.0);
        let spec = crate::spectral::fid_to_spec(&shifted);
        let axis = crate::spectral::frequency_axis(bw, n);
        let peak = spec
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
            .unwrap()
            .0;
        assert!((axis[peak] - 150.0).abs() < 2.0 * bw / n as f64);
    }

    #[test]
    fn test_shift_to_ref() {
        let bw = 4000.0;
        let cf = 123.0e6;
        let n = 2048;
        let dt = 1.0 / bw;
        // Peak at 3.2 ppm (shifted axis): f = (3.2 - 4.65) * 123 Hz
        let f = crate::spectral::ppm_to_hz(cf, 3.2, true);
        let fid: Vec<Complex64> = (0..n)
            .map(|i| {
                let t = i as f64 * dt;
                Complex64::from_polar((-8.0 * t).exp(), 2.0 * PI * f * t)
            })
            .collect();

        let (out, applied) = shift_to_ref(&fid, 3.0, bw, cf, (2.5, 3.5)).unwrap();
        // Applied shift should be about -0.2 ppm in Hz
        let expected = crate::spectral::ppm_to_hz(cf, -0.2, false);
        assert!(
            (applied - expected).abs() < 2.0 * bw / n as f64,
            "applied={applied} expected={expected}"
        );

        // After shifting, the peak sits at 3.0 ppm
        let spec = crate::spectral::fid_to_spec(&out);
        let axis = crate::spectral::ppm_axis(bw, n, cf, true);
        let peak = spec
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
            .unwrap()
            .0;
        assert!((axis[peak] - 3.0).abs() < 0.02, "peak at {}", axis[peak]);
    }

    #[test]
    fn test_shift_to_ref_window_outside_band() {
        let fid = tone(64, 1000.0, 0.0);
        assert!(shift_to_ref(&fid, 3.0, 1000.0, 123.0e6, (400.0, 500.0)).is_err());
    }
}
