//! Eddy-current correction
//!
//! Field drift during the readout imprints a time-varying phase on every
//! acquisition. A reference FID acquired without water suppression sees
//! the same drift, so subtracting its instantaneous phase trajectory
//! sample-for-sample removes the distortion while leaving the data's
//! magnitude untouched.

use num_complex::Complex64;

use crate::types::{MrsError, MrsResult};

/// Subtract the reference FID's instantaneous phase from the data FID.
///
/// Both signals must share a length; only the data's phase changes.
pub fn eddy_correct(data: &[Complex64], reference: &[Complex64]) -> MrsResult<Vec<Complex64>> {
    if data.len() != reference.len() {
        return Err(MrsError::ShapeMismatch {
            expected: data.len().to_string(),
            actual: reference.len().to_string(),
        });
    }
    Ok(data
        .iter()
        .zip(reference.iter())
        .map(|(&x, &r)| x * Complex64::from_polar(1.0, -r.arg()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_removes_reference_phase() {
        // Data carries the same drift trajectory as the reference
        let n = 64;
        let drift: Vec<f64> = (0..n).map(|i| 0.01 * (i * i) as f64 % PI).collect();
        let reference: Vec<Complex64> = drift
            .iter()
            .map(|&p| Complex64::from_polar(3.0, p))
            .collect();
        let data: Vec<Complex64> = drift
            .iter()
            .enumerate()
            .map(|(i, &p)| Complex64::from_polar((-0.05 * i as f64).exp(), p))
            .collect();

        let out = eddy_correct(&data, &reference).unwrap();
        for (i, x) in out.iter().enumerate() {
            assert!(x.arg().abs() < 1e-12, "residual phase at {i}");
            assert!((x.norm() - data[i].norm()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_magnitude_of_reference_irrelevant() {
        let reference = vec![Complex64::from_polar(0.001, 1.0); 4];
        let scaled = vec![Complex64::from_polar(1000.0, 1.0); 4];
        let data = vec![Complex64::new(1.0, 1.0); 4];
        let a = eddy_correct(&data, &reference).unwrap();
        let b = eddy_correct(&data, &scaled).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).norm() < 1e-12);
        }
    }

    #[test]
    fn test_length_mismatch_errors() {
        let data = vec![Complex64::new(1.0, 0.0); 4];
        let reference = vec![Complex64::new(1.0, 0.0); 5];
        assert!(eddy_correct(&data, &reference).is_err());
    }
}
