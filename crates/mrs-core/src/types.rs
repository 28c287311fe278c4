//! Core types for MRS signal processing
//!
//! This module defines the fundamental types used throughout the crate:
//! complex sample aliases, the closed dimension-tag vocabulary of the
//! labeled N-D array, and the crate error type.
//!
//! ## FIDs
//!
//! A free-induction decay (FID) is a time-ordered, equally spaced complex
//! signal. Every core operator in this crate consumes and produces FIDs;
//! higher-dimensional acquisitions are decomposed into FIDs by the
//! iteration engine in [`crate::iterate`].

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Type alias for complex numbers using f64 precision
pub type Complex = Complex64;

/// A single complex time-domain sample
pub type Sample = Complex64;

/// A free-induction decay: one complex 1-D time-domain signal
pub type Fid = Vec<Complex64>;

/// Chemical shift of water relative to the TMS reference, in ppm.
///
/// Used when a ppm axis or ppm window is interpreted relative to the
/// water resonance (`ppm+shift` limit units).
pub const H2O_PPM_TO_TMS: f64 = 4.65;

/// Result type for MRS processing operations
pub type MrsResult<T> = Result<T, MrsError>;

/// Errors that can occur during MRS processing
#[derive(Debug, Clone, thiserror::Error)]
pub enum MrsError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("dimension {0} not present in object")]
    MissingDimension(DimensionTag),

    #[error("operation only defined for single-voxel data")]
    NotSingleVoxel,

    #[error("operation requires a dynamic (repetition) dimension: {0}")]
    MissingDynamicDimension(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("numerically degenerate input: {0}")]
    Numerical(String),
}

/// Semantic tag attached to each array axis beyond the three spatial axes
/// and the time axis.
///
/// Tags are unique within an object and their order defines the reshape
/// and iteration order of the extra axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionTag {
    /// Receive-coil channel
    Coil,
    /// Dynamic repetition (signal average)
    Dynamic,
    /// Editing condition (e.g. MEGA on/off)
    Edit,
    /// User-defined dimension, numbered 0-9
    User(u8),
}

impl std::fmt::Display for DimensionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionTag::Coil => write!(f, "DIM_COIL"),
            DimensionTag::Dynamic => write!(f, "DIM_DYN"),
            DimensionTag::Edit => write!(f, "DIM_EDIT"),
            DimensionTag::User(n) => write!(f, "DIM_USER_{n}"),
        }
    }
}

/// How two sub-spectra are combined when forming a difference spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineOp {
    /// Difference formed by addition of the two conditions
    Add,
    /// Difference formed by subtraction of the two conditions
    Subtract,
}

impl std::fmt::Display for CombineOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombineOp::Add => write!(f, "add"),
            CombineOp::Subtract => write!(f, "sub"),
        }
    }
}

/// Units of a spectral removal/search window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitUnits {
    /// Plain frequency in Hz
    Hz,
    /// Chemical shift in ppm, no reference offset
    Ppm,
    /// Chemical shift in ppm relative to the water reference
    /// (axis offset by [`H2O_PPM_TO_TMS`])
    PpmShift,
}

impl std::fmt::Display for LimitUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitUnits::Hz => write!(f, "Hz"),
            LimitUnits::Ppm => write!(f, "ppm"),
            LimitUnits::PpmShift => write!(f, "ppm+shift"),
        }
    }
}

/// End of the FID at which samples are added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PadSide {
    /// Start of the FID
    First,
    /// End of the FID
    Last,
}

impl std::fmt::Display for PadSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PadSide::First => write!(f, "first"),
            PadSide::Last => write!(f, "last"),
        }
    }
}
