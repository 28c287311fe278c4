//! Labeled N-dimensional complex array
//!
//! The central data object of the pipeline: a row-major complex array
//! with three leading spatial axes (size 1 each for single-voxel data),
//! one time axis, and zero or more tagged extra axes (coil, repetition,
//! editing condition). Sampling metadata (dwell time, spectrometer
//! frequency, nucleus) is object-wide, and a JSON header extension holds
//! the provenance history and any other named fields.
//!
//! Stages never mutate their input: they allocate a structurally derived
//! output with one of the `empty_*` constructors and write results by
//! index.

use num_complex::Complex64;
use serde_json::{Map, Value};

use crate::types::{DimensionTag, Fid, MrsError, MrsResult};

/// Axis index of the time dimension.
pub const TIME_AXIS: usize = 3;

/// Labeled N-D complex array with object-wide sampling metadata.
#[derive(Debug, Clone)]
pub struct MrsVolume {
    data: Vec<Complex64>,
    shape: Vec<usize>,
    tags: Vec<DimensionTag>,
    dwelltime: f64,
    spectrometer_frequency_hz: f64,
    nucleus: String,
    hdr_ext: Map<String, Value>,
}

impl MrsVolume {
    /// Create a zero-filled volume.
    ///
    /// `shape` must carry exactly `4 + tags.len()` axes, all non-empty,
    /// and the tags must be unique.
    pub fn new(
        shape: Vec<usize>,
        tags: Vec<DimensionTag>,
        dwelltime: f64,
        spectrometer_frequency_hz: f64,
        nucleus: impl Into<String>,
    ) -> MrsResult<Self> {
        if shape.len() != 4 + tags.len() {
            return Err(MrsError::DimensionMismatch(format!(
                "shape has {} axes but {} tags were given",
                shape.len(),
                tags.len()
            )));
        }
        if shape.iter().any(|&s| s == 0) {
            return Err(MrsError::InvalidArgument(
                "all axes must be non-empty".to_string(),
            ));
        }
        for (i, tag) in tags.iter().enumerate() {
            if tags[..i].contains(tag) {
                return Err(MrsError::DimensionMismatch(format!(
                    "duplicate dimension tag {tag}"
                )));
            }
        }
        if dwelltime <= 0.0 {
            return Err(MrsError::InvalidArgument(
                "dwelltime must be positive".to_string(),
            ));
        }

        let len = shape.iter().product();
        Ok(Self {
            data: vec![Complex64::new(0.0, 0.0); len],
            shape,
            tags,
            dwelltime,
            spectrometer_frequency_hz,
            nucleus: nucleus.into(),
            hdr_ext: Map::new(),
        })
    }

    /// Single-voxel volume holding one FID.
    pub fn from_fid(
        fid: &[Complex64],
        dwelltime: f64,
        spectrometer_frequency_hz: f64,
        nucleus: impl Into<String>,
    ) -> MrsResult<Self> {
        let mut vol = Self::new(
            vec![1, 1, 1, fid.len()],
            vec![],
            dwelltime,
            spectrometer_frequency_hz,
            nucleus,
        )?;
        vol.data.copy_from_slice(fid);
        Ok(vol)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn tags(&self) -> &[DimensionTag] {
        &self.tags
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dwelltime(&self) -> f64 {
        self.dwelltime
    }

    /// Changed by resampling stages only.
    pub fn set_dwelltime(&mut self, dwelltime: f64) {
        self.dwelltime = dwelltime;
    }

    pub fn bandwidth(&self) -> f64 {
        1.0 / self.dwelltime
    }

    pub fn spectrometer_frequency_hz(&self) -> f64 {
        self.spectrometer_frequency_hz
    }

    pub fn nucleus(&self) -> &str {
        &self.nucleus
    }

    pub fn time_points(&self) -> usize {
        self.shape[TIME_AXIS]
    }

    pub fn is_single_voxel(&self) -> bool {
        self.shape[..TIME_AXIS].iter().all(|&s| s == 1)
    }

    /// Axis index of a tagged dimension.
    pub fn dim_position(&self, tag: DimensionTag) -> MrsResult<usize> {
        self.tags
            .iter()
            .position(|&t| t == tag)
            .map(|i| 4 + i)
            .ok_or(MrsError::MissingDimension(tag))
    }

    /// Extent of a tagged dimension.
    pub fn dim_size(&self, tag: DimensionTag) -> MrsResult<usize> {
        Ok(self.shape[self.dim_position(tag)?])
    }

    fn offset(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.shape.len());
        let mut off = 0;
        for (axis, &i) in index.iter().enumerate() {
            debug_assert!(i < self.shape[axis]);
            off = off * self.shape[axis] + i;
        }
        off
    }

    /// Sample at a full index tuple.
    pub fn get(&self, index: &[usize]) -> Complex64 {
        self.data[self.offset(index)]
    }

    /// Set the sample at a full index tuple.
    pub fn set(&mut self, index: &[usize], value: Complex64) {
        let off = self.offset(index);
        self.data[off] = value;
    }

    fn full_index(&self, fid_index: &[usize], t: usize) -> Vec<usize> {
        debug_assert_eq!(fid_index.len(), self.shape.len() - 1);
        let mut full = Vec::with_capacity(self.shape.len());
        full.extend_from_slice(&fid_index[..TIME_AXIS]);
        full.push(t);
        full.extend_from_slice(&fid_index[TIME_AXIS..]);
        full
    }

    /// FID at a time-omitted index `[x, y, z, extras...]`.
    pub fn fid_at(&self, fid_index: &[usize]) -> Fid {
        (0..self.time_points())
            .map(|t| self.get(&self.full_index(fid_index, t)))
            .collect()
    }

    /// Write a FID at a time-omitted index `[x, y, z, extras...]`.
    pub fn set_fid_at(&mut self, fid_index: &[usize], fid: &[Complex64]) {
        assert_eq!(fid.len(), self.time_points());
        for (t, &v) in fid.iter().enumerate() {
            self.set(&self.full_index(fid_index, t), v);
        }
    }

    /// Zero-filled volume with this volume's shape and metadata.
    pub fn empty_like(&self) -> Self {
        let mut out = self.clone();
        out.data.fill(Complex64::new(0.0, 0.0));
        out
    }

    /// Zero-filled volume with one tagged dimension removed.
    pub fn empty_without_dim(&self, tag: DimensionTag) -> MrsResult<Self> {
        let pos = self.dim_position(tag)?;
        let mut shape = self.shape.clone();
        shape.remove(pos);
        let tags = self.tags.iter().copied().filter(|&t| t != tag).collect();
        let mut out = Self::new(
            shape,
            tags,
            self.dwelltime,
            self.spectrometer_frequency_hz,
            self.nucleus.clone(),
        )?;
        out.hdr_ext = self.hdr_ext.clone();
        Ok(out)
    }

    /// Zero-filled volume with one tagged dimension resized.
    pub fn empty_with_dim_size(&self, tag: DimensionTag, size: usize) -> MrsResult<Self> {
        let pos = self.dim_position(tag)?;
        let mut shape = self.shape.clone();
        shape[pos] = size;
        let mut out = Self::new(
            shape,
            self.tags.clone(),
            self.dwelltime,
            self.spectrometer_frequency_hz,
            self.nucleus.clone(),
        )?;
        out.hdr_ext = self.hdr_ext.clone();
        Ok(out)
    }

    /// Zero-filled volume with a different time-axis length.
    pub fn empty_with_time_points(&self, points: usize) -> MrsResult<Self> {
        let mut shape = self.shape.clone();
        shape[TIME_AXIS] = points;
        let mut out = Self::new(
            shape,
            self.tags.clone(),
            self.dwelltime,
            self.spectrometer_frequency_hz,
            self.nucleus.clone(),
        )?;
        out.hdr_ext = self.hdr_ext.clone();
        Ok(out)
    }

    /// Header extension map.
    pub fn hdr_ext(&self) -> &Map<String, Value> {
        &self.hdr_ext
    }

    /// Add or replace a named header extension field.
    pub fn add_hdr_field(&mut self, key: impl Into<String>, value: Value) {
        self.hdr_ext.insert(key.into(), value);
    }
}
