//! Dimensional iteration engine
//!
//! Decomposes an [`MrsVolume`] into the FID batches a core operator
//! consumes, in a deterministic row-major order:
//!
//! - [`iter_fids`]: every FID one at a time, with its time-omitted index.
//! - [`iter_over_dim`]: the full extent of one tagged dimension as a
//!   batch, iterating every other axis one coordinate at a time; the
//!   yielded index omits the target coordinate so it can address a
//!   dimension-removed output directly.
//! - [`iter_all`]: all extra axes flattened into one batch per voxel.
//!
//! A single-voxel, single-repetition object still yields exactly one
//! item, so operators never special-case cardinality 1. The write-back
//! helpers mirror the iteration order into a freshly allocated output.

use crate::types::{DimensionTag, Fid, MrsResult};
use crate::volume::{MrsVolume, TIME_AXIS};

/// Iteration target: one tagged dimension, or every extra axis at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Dim(DimensionTag),
    All,
}

/// Row-major multi-index counter. An empty size list yields one empty
/// index.
pub struct Odometer {
    sizes: Vec<usize>,
    next: Option<Vec<usize>>,
}

/// Counter over the given axis extents, last axis fastest.
pub fn odometer(sizes: &[usize]) -> Odometer {
    Odometer {
        sizes: sizes.to_vec(),
        next: Some(vec![0; sizes.len()]),
    }
}

impl Iterator for Odometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut succ = current.clone();
        for axis in (0..self.sizes.len()).rev() {
            succ[axis] += 1;
            if succ[axis] < self.sizes[axis] {
                self.next = Some(succ);
                return Some(current);
            }
            succ[axis] = 0;
        }
        // Wrapped around: iteration is exhausted
        Some(current)
    }
}

fn fid_index_shape(vol: &MrsVolume) -> Vec<usize> {
    let mut sizes: Vec<usize> = vol.shape().to_vec();
    sizes.remove(TIME_AXIS);
    sizes
}

/// Insert a coordinate into a reduced index at the given position.
pub fn insert_index(reduced: &[usize], position: usize, coord: usize) -> Vec<usize> {
    let mut full = Vec::with_capacity(reduced.len() + 1);
    full.extend_from_slice(&reduced[..position]);
    full.push(coord);
    full.extend_from_slice(&reduced[position..]);
    full
}

/// Lazy iterator over every FID with its time-omitted index.
pub struct FidIter<'a> {
    vol: &'a MrsVolume,
    inner: Odometer,
}

pub fn iter_fids(vol: &MrsVolume) -> FidIter<'_> {
    FidIter {
        vol,
        inner: odometer(&fid_index_shape(vol)),
    }
}

impl Iterator for FidIter<'_> {
    type Item = (Fid, Vec<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.inner.next()?;
        Some((self.vol.fid_at(&index), index))
    }
}

/// Lazy iterator exposing one tagged dimension as a FID batch.
pub struct DimIter<'a> {
    vol: &'a MrsVolume,
    inner: Odometer,
    /// Position of the target coordinate within a time-omitted index.
    position: usize,
    dim_len: usize,
}

/// Iterate every axis except `tag`, yielding the full extent of `tag` as
/// a batch plus the index with the target coordinate omitted.
pub fn iter_over_dim(vol: &MrsVolume, tag: DimensionTag) -> MrsResult<DimIter<'_>> {
    let position = vol.dim_position(tag)? - 1;
    let dim_len = vol.dim_size(tag)?;
    let mut sizes = fid_index_shape(vol);
    sizes.remove(position);
    Ok(DimIter {
        vol,
        inner: odometer(&sizes),
        position,
        dim_len,
    })
}

impl DimIter<'_> {
    /// Where the target coordinate sits within a time-omitted index.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Iterator for DimIter<'_> {
    type Item = (Vec<Fid>, Vec<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let reduced = self.inner.next()?;
        let batch = (0..self.dim_len)
            .map(|k| self.vol.fid_at(&insert_index(&reduced, self.position, k)))
            .collect();
        Some((batch, reduced))
    }
}

/// Lazy per-voxel iterator flattening every extra axis into one batch.
pub struct AllIter<'a> {
    vol: &'a MrsVolume,
    inner: Odometer,
}

/// Iterate voxels, yielding all extra-axis FIDs of each voxel as one
/// batch in row-major extra order, plus the `[x, y, z]` voxel index.
pub fn iter_all(vol: &MrsVolume) -> AllIter<'_> {
    AllIter {
        vol,
        inner: odometer(&vol.shape()[..TIME_AXIS]),
    }
}

impl Iterator for AllIter<'_> {
    type Item = (Vec<Fid>, Vec<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let voxel = self.inner.next()?;
        let extras = &self.vol.shape()[TIME_AXIS + 1..];
        let batch = odometer(extras)
            .map(|extra| {
                let mut index = voxel.clone();
                index.extend_from_slice(&extra);
                self.vol.fid_at(&index)
            })
            .collect();
        Some((batch, voxel))
    }
}

/// Write a batch back along a tagged dimension at a reduced index,
/// mirroring [`iter_over_dim`] order.
pub fn write_dim_batch(
    vol: &mut MrsVolume,
    tag: DimensionTag,
    reduced: &[usize],
    batch: &[Fid],
) -> MrsResult<()> {
    let position = vol.dim_position(tag)? - 1;
    for (k, fid) in batch.iter().enumerate() {
        vol.set_fid_at(&insert_index(reduced, position, k), fid);
    }
    Ok(())
}

/// Write a flattened per-voxel batch back, mirroring [`iter_all`] order.
pub fn write_all_batch(vol: &mut MrsVolume, voxel: &[usize], batch: &[Fid]) {
    let extras: Vec<usize> = vol.shape()[TIME_AXIS + 1..].to_vec();
    for (extra, fid) in odometer(&extras).zip(batch.iter()) {
        let mut index = voxel.to_vec();
        index.extend_from_slice(&extra);
        vol.set_fid_at(&index, fid);
    }
}
