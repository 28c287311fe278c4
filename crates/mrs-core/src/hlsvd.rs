//! Subspace modelling of damped complex exponentials (HLSVD)
//!
//! Decomposes a FID into a small sum of damped complex exponentials by
//! way of a Hankel matrix, a reduced-rank SVD and an eigen-decomposition
//! of the shift operator restricted to the retained singular subspace.
//! Each retained component is a Lorentzian line described by frequency,
//! damping rate, amplitude and phase.
//!
//! Two consumers exist: nuisance-peak removal subtracts the in-window
//! reconstruction from the signal ([`remove_peaks`]), while baseline
//! modelling returns the reconstruction itself ([`model_peaks`]). The
//! removal window may be given in Hz, plain ppm, or water-referenced ppm
//! via [`LimitUnits`].

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::linalg::{self, CMat};
use crate::types::{LimitUnits, MrsError, MrsResult, H2O_PPM_TO_TMS};

/// Retained singular values when the caller does not choose a rank.
pub const DEFAULT_RANK: usize = 20;

/// One damped complex exponential extracted from a signal.
///
/// The time-domain contribution is
/// `amplitude * exp(i*phase) * exp((damping + i*2*pi*frequency_hz) * t)`,
/// so a decaying line has negative `damping` (per second).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LorentzianComponent {
    pub frequency_hz: f64,
    pub damping: f64,
    pub amplitude: f64,
    pub phase: f64,
}

impl LorentzianComponent {
    /// Sample this component at time `t` (seconds).
    pub fn evaluate(&self, t: f64) -> Complex64 {
        let envelope = self.amplitude * (self.damping * t).exp();
        Complex64::from_polar(envelope, self.phase + 2.0 * PI * self.frequency_hz * t)
    }
}

/// Decompose a FID into up to `rank` damped complex exponentials.
///
/// Builds a Hankel matrix with `n/2` rows, takes its `rank` dominant
/// singular triplets, and recovers the signal poles from the
/// shift-invariance of the left singular subspace. Amplitudes and phases
/// follow from a least-squares fit of the pole basis to the signal.
/// Strongly growing or vanishing poles are discarded as unphysical.
pub fn decompose(
    fid: &[Complex64],
    dwelltime: f64,
    rank: usize,
) -> MrsResult<Vec<LorentzianComponent>> {
    let n = fid.len();
    let rows = n / 2;
    if rows < 2 {
        return Err(MrsError::InvalidArgument(format!(
            "signal of {n} samples is too short for subspace decomposition"
        )));
    }
    let cols = n - rows + 1;
    let rank = rank.min(rows - 1).min(cols);
    if rank == 0 {
        return Err(MrsError::InvalidArgument(
            "decomposition rank must be at least 1".to_string(),
        ));
    }

    let hankel: CMat = (0..rows).map(|i| fid[i..i + cols].to_vec()).collect();
    let (u_cols, _, _) = linalg::truncated_svd(&hankel, rank)?;

    // Shift operator restricted to the singular subspace:
    // solve (Ub^H Ub) Z = Ub^H Ut where Ub/Ut drop the last/first row
    let ub: CMat = (0..rows - 1)
        .map(|i| u_cols.iter().map(|col| col[i]).collect())
        .collect();
    let ut: CMat = (1..rows)
        .map(|i| u_cols.iter().map(|col| col[i]).collect())
        .collect();
    let ubh = linalg::hermitian(&ub);
    let gram = linalg::matmul(&ubh, &ub);
    let rhs = linalg::matmul(&ubh, &ut);

    let mut shift_op = linalg::zeros(rank, rank);
    for j in 0..rank {
        let b: Vec<Complex64> = (0..rank).map(|i| rhs[i][j]).collect();
        let col = linalg::solve_complex_system(&gram, &b);
        for (i, &v) in col.iter().enumerate() {
            shift_op[i][j] = v;
        }
    }

    let poles: Vec<Complex64> = linalg::eigenvalues_qr(&shift_op)
        .into_iter()
        .filter(|z| {
            let r = z.norm();
            r.is_finite() && r > 1e-8 && r < 1.5
        })
        .collect();
    if poles.is_empty() {
        return Err(MrsError::Numerical(
            "no usable signal poles recovered".to_string(),
        ));
    }

    // Amplitude/phase from a least-squares fit of the pole basis:
    // fid[m] = sum_j a_j * z_j^m, solved via the normal equations
    let k = poles.len();
    let mut basis = linalg::zeros(n, k);
    for (j, &z) in poles.iter().enumerate() {
        let mut p = Complex64::new(1.0, 0.0);
        for row in basis.iter_mut() {
            row[j] = p;
            p *= z;
        }
    }
    let bh = linalg::hermitian(&basis);
    let gram = linalg::matmul(&bh, &basis);
    let rhs = linalg::mat_vec(&bh, fid);
    let amplitudes = linalg::solve_complex_system(&gram, &rhs);

    Ok(poles
        .iter()
        .zip(amplitudes.iter())
        .map(|(&z, &a)| {
            let q = z.ln();
            LorentzianComponent {
                frequency_hz: q.im / (2.0 * PI * dwelltime),
                damping: q.re / dwelltime,
                amplitude: a.norm(),
                phase: a.arg(),
            }
        })
        .collect())
}

/// Sum the components over `n` samples spaced by `dwelltime`.
pub fn reconstruct(
    components: &[LorentzianComponent],
    dwelltime: f64,
    n: usize,
) -> Vec<Complex64> {
    (0..n)
        .map(|i| {
            let t = i as f64 * dwelltime;
            components.iter().map(|c| c.evaluate(t)).sum()
        })
        .collect()
}

/// Normalize a removal window to ascending Hz.
pub fn frequency_window(
    limits: (f64, f64),
    units: LimitUnits,
    spectrometer_frequency_hz: f64,
) -> (f64, f64) {
    let cf_mhz = spectrometer_frequency_hz * 1e-6;
    let convert = |v: f64| match units {
        LimitUnits::Hz => v,
        LimitUnits::Ppm => v * cf_mhz,
        LimitUnits::PpmShift => (v - H2O_PPM_TO_TMS) * cf_mhz,
    };
    let a = convert(limits.0);
    let b = convert(limits.1);
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Reconstruction of the components whose frequency falls inside the
/// window.
pub fn model_peaks(
    fid: &[Complex64],
    dwelltime: f64,
    spectrometer_frequency_hz: f64,
    limits: (f64, f64),
    units: LimitUnits,
) -> MrsResult<Vec<Complex64>> {
    let (lo, hi) = frequency_window(limits, units, spectrometer_frequency_hz);
    let selected: Vec<LorentzianComponent> = decompose(fid, dwelltime, DEFAULT_RANK)?
        .into_iter()
        .filter(|c| c.frequency_hz >= lo && c.frequency_hz <= hi)
        .collect();
    Ok(reconstruct(&selected, dwelltime, fid.len()))
}

/// Subtract the in-window reconstruction from the signal.
pub fn remove_peaks(
    fid: &[Complex64],
    dwelltime: f64,
    spectrometer_frequency_hz: f64,
    limits: (f64, f64),
    units: LimitUnits,
) -> MrsResult<Vec<Complex64>> {
    let model = model_peaks(fid, dwelltime, spectrometer_frequency_hz, limits, units)?;
    Ok(fid
        .iter()
        .zip(model.iter())
        .map(|(&x, &m)| x - m)
        .collect())
}
