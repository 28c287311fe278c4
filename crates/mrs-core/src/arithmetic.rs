//! Element-wise arithmetic on FIDs
//!
//! Add, subtract and conjugate operations used by the sub-spectra
//! combination stages. Two scaling conventions exist deliberately:
//!
//! - The plain [`add`]/[`subtract`] pair operates on two slices taken
//!   along a length-2 dimension (no rescaling).
//! - The [`add_halved`]/[`subtract_halved`] pair operates between two
//!   whole datasets and divides by two so the result keeps the scale of
//!   a single average.
//!
//! Downstream consumers depend on both conventions; they are not unified.
//!
//! ## Example
//!
//! ```rust
//! use mrs_core::arithmetic::{add_halved, subtract_halved};
//! use num_complex::Complex64;
//!
//! let a = vec![Complex64::new(4.0, 2.0)];
//! let b = vec![Complex64::new(2.0, 0.0)];
//! let s = add_halved(&a, &b);
//! let d = subtract_halved(&a, &b);
//! // s + d recovers a, s - d recovers b
//! assert_eq!(s[0] + d[0], a[0]);
//! assert_eq!(s[0] - d[0], b[0]);
//! ```

use num_complex::Complex64;

/// Add two FIDs element-wise.
pub fn add(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    a.iter().zip(b.iter()).map(|(&x, &y)| x + y).collect()
}

/// Subtract two FIDs element-wise: `a - b`.
pub fn subtract(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    a.iter().zip(b.iter()).map(|(&x, &y)| x - y).collect()
}

/// Average-style addition of two whole datasets: `(a + b) / 2`.
pub fn add_halved(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x + y) / 2.0)
        .collect()
}

/// Average-style subtraction of two whole datasets: `(a - b) / 2`.
pub fn subtract_halved(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y) / 2.0)
        .collect()
}

/// Complex conjugate of every sample.
pub fn conjugate(a: &[Complex64]) -> Vec<Complex64> {
    a.iter().map(|x| x.conj()).collect()
}

/// Element-wise mean of a batch of FIDs.
///
/// All FIDs must share a length; the batch must be non-empty.
pub fn mean_fids(fids: &[Vec<Complex64>]) -> Vec<Complex64> {
    assert!(!fids.is_empty());
    let n = fids[0].len();
    let scale = 1.0 / fids.len() as f64;
    (0..n)
        .map(|i| fids.iter().map(|f| f[i]).sum::<Complex64>() * scale)
        .collect()
}
