//! Outlier identification across repeated acquisitions
//!
//! Motion or lipid contamination can corrupt individual repeats. Each
//! FID is scored by the distance between the real part of its windowed
//! spectrum and the running mean spectrum of the retained set; repeats
//! whose z-scored distance exceeds `sdlimit` are flagged. The mean is
//! recomputed without the flagged repeats and the scoring repeats for a
//! caller-fixed number of iterations, so the cost is deterministic.

use num_complex::Complex64;

use crate::spectral;
use crate::types::{MrsError, MrsResult};

/// Result of an outlier pass: index partitions in original order plus the
/// final per-FID distance scores.
#[derive(Debug, Clone)]
pub struct UnlikePartition {
    pub good: Vec<usize>,
    pub bad: Vec<usize>,
    pub scores: Vec<f64>,
}

fn windowed_real_spectrum(
    fid: &[Complex64],
    bandwidth: f64,
    spectrometer_frequency_hz: f64,
    ppmlim: Option<(f64, f64)>,
) -> Vec<f64> {
    let spec = spectral::fid_to_spec(fid);
    let range = match ppmlim {
        Some(lim) => {
            let r = spectral::ppm_window_range(
                bandwidth,
                fid.len(),
                spectrometer_frequency_hz,
                lim,
                true,
            );
            if r.is_empty() {
                0..fid.len()
            } else {
                r
            }
        }
        None => 0..fid.len(),
    };
    spec[range].iter().map(|x| x.re).collect()
}

/// Partition repeated FIDs into likely-good and outlier sets.
///
/// Needs at least two repeats. `sdlimit` is the z-score threshold
/// (two-sided) and `niter` the fixed number of flag-and-remean passes.
pub fn identify_unlike(
    fids: &[Vec<Complex64>],
    bandwidth: f64,
    spectrometer_frequency_hz: f64,
    ppmlim: Option<(f64, f64)>,
    sdlimit: f64,
    niter: usize,
) -> MrsResult<UnlikePartition> {
    if fids.len() < 2 {
        return Err(MrsError::InvalidArgument(format!(
            "outlier identification needs at least 2 repeats, got {}",
            fids.len()
        )));
    }

    let spectra: Vec<Vec<f64>> = fids
        .iter()
        .map(|f| windowed_real_spectrum(f, bandwidth, spectrometer_frequency_hz, ppmlim))
        .collect();
    let m = spectra[0].len();

    let mut good: Vec<usize> = (0..fids.len()).collect();
    let mut scores = vec![0.0; fids.len()];

    for _ in 0..niter {
        // Mean spectrum over the currently retained set
        let mut mean = vec![0.0; m];
        for &i in &good {
            for (acc, &v) in mean.iter_mut().zip(spectra[i].iter()) {
                *acc += v;
            }
        }
        for v in mean.iter_mut() {
            *v /= good.len() as f64;
        }

        for (i, spec) in spectra.iter().enumerate() {
            scores[i] = spec
                .iter()
                .zip(mean.iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
        }

        let count = scores.len() as f64;
        let score_mean = scores.iter().sum::<f64>() / count;
        let score_var = scores
            .iter()
            .map(|&s| (s - score_mean) * (s - score_mean))
            .sum::<f64>()
            / count;
        let score_sd = score_var.sqrt();
        if score_sd < 1e-30 {
            // All repeats equally far from the mean: nothing to flag
            good = (0..fids.len()).collect();
            break;
        }

        good = (0..fids.len())
            .filter(|&i| ((scores[i] - score_mean) / score_sd).abs() <= sdlimit)
            .collect();
        if good.is_empty() {
            // Degenerate threshold; keep everything rather than nothing
            good = (0..fids.len()).collect();
            break;
        }
    }

    let bad: Vec<usize> = (0..fids.len()).filter(|i| !good.contains(i)).collect();
    Ok(UnlikePartition { good, bad, scores })
}
