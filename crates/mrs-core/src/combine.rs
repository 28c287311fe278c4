//! Receive-coil combination
//!
//! Merges per-coil FIDs into one signal. The default path derives a
//! weight vector from the dominant eigenvector of the coil covariance so
//! the combination maximizes signal-to-noise, optionally pre-whitening
//! the coils with a noise covariance estimated from the FID tail. Weights
//! may also be computed once from a reference acquisition and re-applied
//! to every repetition sharing the same receive geometry.
//!
//! The weight vector is unit-norm and carries a deterministic global
//! phase (its largest element is rotated to the positive real axis), so
//! the combined output does not depend on coil ordering.

use num_complex::Complex64;

use crate::arithmetic;
use crate::linalg::{self, CMat};
use crate::types::{MrsError, MrsResult};

/// Power-iteration sweep count for the dominant covariance eigenvector.
const EIGEN_ITERS: usize = 200;

/// Sample covariance of the trailing `tail_points` samples across coils.
///
/// The FID tail is assumed to have decayed to noise; the estimate is the
/// usual unbiased cross-coil covariance of those samples. FIDs shorter
/// than two samples have no tail to estimate from and yield the zero
/// matrix, which downstream whitening rejects.
pub fn estimate_noise_covariance(fids: &[Vec<Complex64>], tail_points: usize) -> CMat {
    let k = fids.len();
    let n = fids[0].len();
    let tail = tail_points.max(2).min(n);
    if tail < 2 {
        return linalg::zeros(k, k);
    }
    let start = n - tail;

    let mut cov = linalg::zeros(k, k);
    for t in start..n {
        for i in 0..k {
            for j in 0..k {
                cov[i][j] += fids[i][t] * fids[j][t].conj();
            }
        }
    }
    let scale = 1.0 / (tail - 1) as f64;
    for row in cov.iter_mut() {
        for v in row.iter_mut() {
            *v *= scale;
        }
    }
    cov
}

fn coil_covariance(fids: &[Vec<Complex64>]) -> CMat {
    let k = fids.len();
    let n = fids[0].len();
    let mut cov = linalg::zeros(k, k);
    for t in 0..n {
        for i in 0..k {
            for j in 0..k {
                cov[i][j] += fids[i][t] * fids[j][t].conj();
            }
        }
    }
    cov
}

/// Rotate the largest element onto the positive real axis and normalize.
fn anchor_phase(weights: &mut [Complex64]) {
    let mut max_idx = 0;
    let mut max_norm = 0.0;
    for (i, w) in weights.iter().enumerate() {
        if w.norm() > max_norm {
            max_norm = w.norm();
            max_idx = i;
        }
    }
    if max_norm > 1e-30 {
        let rot = Complex64::from_polar(1.0, -weights[max_idx].arg());
        for w in weights.iter_mut() {
            *w *= rot;
        }
    }
    let norm = linalg::vec_norm(weights);
    if norm > 1e-30 {
        for w in weights.iter_mut() {
            *w /= norm;
        }
    }
}

/// Derive combination weights from a batch of per-coil FIDs.
///
/// With `prewhiten` set, the coils are first decorrelated using the noise
/// covariance of the final quarter of the FID; if that covariance is not
/// positive definite (noiseless input) whitening is skipped with a logged
/// warning. The returned weights apply to the raw, unwhitened coils.
pub fn svd_weights(fids: &[Vec<Complex64>], prewhiten: bool) -> MrsResult<Vec<Complex64>> {
    let k = fids.len();
    if k == 0 {
        return Err(MrsError::InvalidArgument(
            "cannot derive coil weights from an empty batch".to_string(),
        ));
    }
    let n = fids[0].len();
    if fids.iter().any(|f| f.len() != n) {
        return Err(MrsError::ShapeMismatch {
            expected: n.to_string(),
            actual: "mixed coil FID lengths".to_string(),
        });
    }

    let whitener = if prewhiten {
        let noise = estimate_noise_covariance(fids, n / 4);
        match linalg::cholesky(&noise) {
            Ok(l) => Some(l),
            Err(err) => {
                tracing::warn!("noise covariance not usable, combining without whitening: {err}");
                None
            }
        }
    } else {
        None
    };

    let work: Vec<Vec<Complex64>> = match &whitener {
        Some(l) => {
            // Decorrelate coils sample by sample: y_t = L^-1 x_t
            let mut out = vec![vec![Complex64::new(0.0, 0.0); n]; k];
            for t in 0..n {
                let x: Vec<Complex64> = fids.iter().map(|f| f[t]).collect();
                let y = linalg::forward_substitute(l, &x);
                for (i, &v) in y.iter().enumerate() {
                    out[i][t] = v;
                }
            }
            out
        }
        None => fids.to_vec(),
    };

    let cov = coil_covariance(&work);
    let start = vec![Complex64::new(1.0, 0.0); k];
    let mut weights = linalg::dominant_eigenvector(&cov, &start, EIGEN_ITERS);

    // Map whitened-space weights back onto the raw coils: v = L^-H w
    if let Some(l) = &whitener {
        weights = linalg::solve_complex_system(&linalg::hermitian(l), &weights);
    }

    anchor_phase(&mut weights);
    Ok(weights)
}

/// Combine per-coil FIDs with an explicit weight vector: `w^H x` per
/// sample.
pub fn weighted_combine(
    fids: &[Vec<Complex64>],
    weights: &[Complex64],
) -> MrsResult<Vec<Complex64>> {
    if fids.len() != weights.len() {
        return Err(MrsError::DimensionMismatch(format!(
            "{} coils but {} weights",
            fids.len(),
            weights.len()
        )));
    }
    let n = fids[0].len();
    Ok((0..n)
        .map(|t| {
            fids.iter()
                .zip(weights.iter())
                .map(|(f, &w)| w.conj() * f[t])
                .sum()
        })
        .collect())
}

/// Unweighted mean across coils.
pub fn mean_combine(fids: &[Vec<Complex64>]) -> Vec<Complex64> {
    arithmetic::mean_fids(fids)
}

/// SNR-weighted combination of one coil batch.
///
/// Weights come from `reference` when supplied (its coil count must match
/// the data) and from the data itself otherwise. Returns the combined FID
/// and the weights used.
pub fn svd_combine(
    fids: &[Vec<Complex64>],
    reference: Option<&[Vec<Complex64>]>,
    prewhiten: bool,
) -> MrsResult<(Vec<Complex64>, Vec<Complex64>)> {
    let weights = match reference {
        Some(r) => {
            if r.len() != fids.len() {
                return Err(MrsError::DimensionMismatch(format!(
                    "reference has {} coils, data has {}",
                    r.len(),
                    fids.len()
                )));
            }
            svd_weights(r, prewhiten)?
        }
        None => svd_weights(fids, prewhiten)?,
    };
    let combined = weighted_combine(fids, &weights)?;
    Ok((combined, weights))
}
