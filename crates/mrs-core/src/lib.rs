//! # MRS Preprocessing Core
//!
//! This crate implements the preprocessing pipeline for magnetic
//! resonance spectroscopy (MRS) time-domain data: complex free induction
//! decays (FIDs) acquired per coil, repetition, and editing condition.
//!
//! ## Overview
//!
//! Raw MRS acquisitions need several corrections before quantification:
//!
//! - **Coil combination**: whitened SVD weighting of receive channels
//! - **Alignment**: frequency and phase correction across repetitions
//! - **Eddy current correction**: phase subtraction against a reference
//! - **Peak removal**: HLSVD subspace modeling of nuisance resonances
//! - **Shaping**: apodization, zero-filling, temporal resampling
//! - **Phasing**: zero- and first-order phase correction
//! - **Outlier rejection**: z-scored spectral distance partitioning
//!
//! The [`volume::MrsVolume`] data object carries the N-dimensional
//! complex array plus sampling metadata and a provenance ledger; the
//! [`proc`] module exposes one stage function per operation, each
//! driving the core operators over the tagged dimensions and appending
//! a provenance record to its output.
//!
//! ## Signal Flow
//!
//! ```text
//! Raw FIDs → Coil combination → Alignment → Outlier removal → Averaging
//!          → Eddy current correction → Peak removal → Shaping → Phasing
//! ```
//!
//! ## Example
//!
//! ```rust
//! use mrs_core::proc;
//! use mrs_core::report::NullReporter;
//! use mrs_core::types::DimensionTag;
//! use mrs_core::volume::MrsVolume;
//! use num_complex::Complex64;
//!
//! // Two noiseless repeats of the same FID
//! let fid: Vec<Complex64> = (0..512)
//!     .map(|i| Complex64::from_polar((-(i as f64) / 256.0).exp(), 0.1 * i as f64))
//!     .collect();
//! let mut vol = MrsVolume::new(
//!     vec![1, 1, 1, 512, 2],
//!     vec![DimensionTag::Dynamic],
//!     1.0 / 4000.0,
//!     123.2e6,
//!     "1H",
//! )
//! .unwrap();
//! vol.set_fid_at(&[0, 0, 0, 0], &fid);
//! vol.set_fid_at(&[0, 0, 0, 1], &fid);
//!
//! let averaged = proc::average(&vol, DimensionTag::Dynamic, &mut NullReporter).unwrap();
//! assert_eq!(averaged.shape(), &[1, 1, 1, 512]);
//! assert_eq!(averaged.fid_at(&[0, 0, 0]), fid);
//! ```

pub mod align;
pub mod arithmetic;
pub mod combine;
pub mod eddy;
pub mod fft;
pub mod filtering;
pub mod hlsvd;
pub mod iterate;
pub mod linalg;
pub mod phasing;
pub mod proc;
pub mod provenance;
pub mod report;
pub mod shifting;
pub mod spectral;
pub mod synthetic;
pub mod types;
pub mod unlike;
pub mod volume;

pub use filtering::ApodizationKind;
pub use iterate::Axis;
pub use provenance::ProvenanceRecord;
pub use report::{NullReporter, StageReporter};
pub use types::{
    CombineOp, DimensionTag, Fid, LimitUnits, MrsError, MrsResult, PadSide, H2O_PPM_TO_TMS,
};
pub use volume::MrsVolume;

pub mod prelude {
    pub use crate::filtering::ApodizationKind;
    pub use crate::iterate::Axis;
    pub use crate::proc;
    pub use crate::report::{NullReporter, StageReporter};
    pub use crate::types::{CombineOp, DimensionTag, Fid, LimitUnits, MrsResult, PadSide};
    pub use crate::volume::MrsVolume;
}
