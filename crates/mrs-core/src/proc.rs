//! Pipeline stage functions
//!
//! One entry point per operator family. Every stage validates its
//! preconditions, drives the iteration engine over the relevant axis,
//! writes results into a freshly allocated output volume, appends a
//! provenance record naming the operation and its exact parameters, and
//! returns the new object. Inputs are never mutated.
//!
//! Diagnostic reporting goes through the injected [`StageReporter`]; by
//! default only the first processed index of a stage is recorded.

use num_complex::Complex64;

use crate::align as align_op;
use crate::arithmetic;
use crate::combine;
use crate::eddy;
use crate::filtering::{self, ApodizationKind};
use crate::hlsvd;
use crate::iterate::{self, Axis};
use crate::phasing;
use crate::provenance::{self, ProvenanceRecord};
use crate::report::StageReporter;
use crate::shifting;
use crate::types::{CombineOp, DimensionTag, Fid, LimitUnits, MrsError, MrsResult, PadSide};
use crate::unlike;
use crate::volume::MrsVolume;

fn finish(vol: &mut MrsVolume, method: &str, details: String) -> MrsResult<()> {
    tracing::debug!(method, %details, "stage complete");
    provenance::append_record(vol, ProvenanceRecord::new(method, details))
}

fn should_report(reporter: &dyn StageReporter, index: &[usize]) -> bool {
    reporter.report_all() || index.iter().all(|&i| i == 0)
}

/// Apply one FID-to-FID operator across the whole volume.
fn map_fids<F>(
    data: &MrsVolume,
    reporter: &mut dyn StageReporter,
    method: &str,
    details: &str,
    mut op: F,
) -> MrsResult<MrsVolume>
where
    F: FnMut(&Fid) -> MrsResult<Fid>,
{
    let mut out = data.empty_like();
    for (fid, index) in iterate::iter_fids(data) {
        out.set_fid_at(&index, &op(&fid)?);
        if should_report(reporter, &index) {
            reporter.record_stage(method, &index, details);
        }
    }
    Ok(out)
}

/// Combine the coil dimension, optionally deriving weights from a
/// reference acquisition sharing the receive geometry.
pub fn coilcombine(
    data: &MrsVolume,
    reference: Option<&MrsVolume>,
    prewhiten: bool,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let ncoils = data.dim_size(DimensionTag::Coil)?;

    // Reference batches either map one-to-one onto the data iteration or
    // broadcast from a single batch
    let ref_batches: Option<Vec<Vec<Fid>>> = match reference {
        Some(r) => {
            if r.dim_size(DimensionTag::Coil)? != ncoils {
                return Err(MrsError::DimensionMismatch(format!(
                    "reference has {} coils, data has {ncoils}",
                    r.dim_size(DimensionTag::Coil)?
                )));
            }
            Some(
                iterate::iter_over_dim(r, DimensionTag::Coil)?
                    .map(|(batch, _)| batch)
                    .collect(),
            )
        }
        None => None,
    };

    let mut out = data.empty_without_dim(DimensionTag::Coil)?;
    let details = format!(
        "mrs_core::proc::coilcombine, reference={}, prewhiten={prewhiten}.",
        reference.is_some()
    );
    for (i, (batch, reduced)) in iterate::iter_over_dim(data, DimensionTag::Coil)?.enumerate() {
        let reference_batch = match &ref_batches {
            Some(batches) if batches.len() == 1 => Some(batches[0].as_slice()),
            Some(batches) => Some(
                batches
                    .get(i)
                    .ok_or_else(|| {
                        MrsError::ShapeMismatch {
                            expected: "reference iterable over the same extent as data".to_string(),
                            actual: format!("{} reference batches", batches.len()),
                        }
                    })?
                    .as_slice(),
            ),
            None => None,
        };
        let (combined, _) = combine::svd_combine(&batch, reference_batch, prewhiten)?;
        out.set_fid_at(&reduced, &combined);
        if should_report(reporter, &reduced) {
            reporter.record_stage("RF coil combination", &reduced, &details);
        }
    }

    finish(&mut out, "RF coil combination", details)?;
    Ok(out)
}

/// Average along a tagged dimension, collapsing it.
pub fn average(
    data: &MrsVolume,
    dim: DimensionTag,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let mut out = data.empty_without_dim(dim)?;
    let details = format!("mrs_core::proc::average, dim={dim}.");
    for (batch, reduced) in iterate::iter_over_dim(data, dim)? {
        out.set_fid_at(&reduced, &arithmetic::mean_fids(&batch));
        if should_report(reporter, &reduced) {
            reporter.record_stage("Signal averaging", &reduced, &details);
        }
    }
    finish(&mut out, "Signal averaging", details)?;
    Ok(out)
}

/// Align repeated FIDs in frequency and phase along one dimension, or
/// across all extra dimensions at once.
#[allow(clippy::too_many_arguments)]
pub fn align(
    data: &MrsVolume,
    axis: Axis,
    target: Option<&[Complex64]>,
    ppmlim: Option<(f64, f64)>,
    apodize_hz: Option<f64>,
    niter: usize,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let bw = data.bandwidth();
    let cf = data.spectrometer_frequency_hz();
    let mut out = data.empty_like();
    let details = format!(
        "mrs_core::proc::align, dim={}, target={}, ppmlim={ppmlim:?}, niter={niter}, apodize={apodize_hz:?}.",
        match axis {
            Axis::Dim(tag) => tag.to_string(),
            Axis::All => "all".to_string(),
        },
        target.is_some()
    );

    match axis {
        Axis::Dim(tag) => {
            for (batch, reduced) in iterate::iter_over_dim(data, tag)? {
                let (aligned, _) =
                    align_op::align_batch(&batch, target, bw, cf, ppmlim, apodize_hz, niter)?;
                iterate::write_dim_batch(&mut out, tag, &reduced, &aligned)?;
                if should_report(reporter, &reduced) {
                    reporter.record_stage("Frequency and phase correction", &reduced, &details);
                }
            }
        }
        Axis::All => {
            for (batch, voxel) in iterate::iter_all(data) {
                let (aligned, _) =
                    align_op::align_batch(&batch, target, bw, cf, ppmlim, apodize_hz, niter)?;
                iterate::write_all_batch(&mut out, &voxel, &aligned);
                if should_report(reporter, &voxel) {
                    reporter.record_stage("Frequency and phase correction", &voxel, &details);
                }
            }
        }
    }

    finish(&mut out, "Frequency and phase correction", details)?;
    Ok(out)
}

/// Align editing condition pairs through their combined signal.
///
/// `dim_diff` must have length 2 and differ from `dim_align`; the
/// correction estimated from `cond0 op cond1` against `target` (the mean
/// combined signal when `None`) is applied to condition 0 only.
#[allow(clippy::too_many_arguments)]
pub fn aligndiff(
    data: &MrsVolume,
    dim_align: DimensionTag,
    dim_diff: DimensionTag,
    target: Option<&[Complex64]>,
    op: CombineOp,
    ppmlim: Option<(f64, f64)>,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    if dim_align == dim_diff {
        return Err(MrsError::InvalidArgument(format!(
            "alignment and difference dimensions must differ, both are {dim_align}"
        )));
    }
    if data.dim_size(dim_diff)? != 2 {
        return Err(MrsError::DimensionMismatch(format!(
            "difference dimension must have length 2, found {}",
            data.dim_size(dim_diff)?
        )));
    }
    let pos_align = data.dim_position(dim_align)? - 1;
    let pos_diff = data.dim_position(dim_diff)? - 1;
    let align_len = data.dim_size(dim_align)?;

    // Iterate every axis except the align and diff dimensions
    let mut sizes: Vec<usize> = data.shape().to_vec();
    sizes.remove(crate::volume::TIME_AXIS);
    let (p_lo, p_hi) = if pos_align < pos_diff {
        (pos_align, pos_diff)
    } else {
        (pos_diff, pos_align)
    };
    sizes.remove(p_hi);
    sizes.remove(p_lo);

    let index_for = |outer: &[usize], align_coord: usize, diff_coord: usize| -> Vec<usize> {
        let (lo_coord, hi_coord) = if pos_align < pos_diff {
            (align_coord, diff_coord)
        } else {
            (diff_coord, align_coord)
        };
        let with_lo = iterate::insert_index(outer, p_lo, lo_coord);
        iterate::insert_index(&with_lo, p_hi, hi_coord)
    };

    let mut out = data.clone();
    let details = format!(
        "mrs_core::proc::aligndiff, dim_align={dim_align}, dim_diff={dim_diff}, target={}, diff_type={op}, ppmlim={ppmlim:?}.",
        target.is_some()
    );
    for outer in iterate::odometer(&sizes) {
        let cond0: Vec<Fid> = (0..align_len)
            .map(|k| data.fid_at(&index_for(&outer, k, 0)))
            .collect();
        let cond1: Vec<Fid> = (0..align_len)
            .map(|k| data.fid_at(&index_for(&outer, k, 1)))
            .collect();
        let (corrected, _) = align_op::align_diff(
            &cond0,
            &cond1,
            target,
            op,
            data.bandwidth(),
            data.spectrometer_frequency_hz(),
            ppmlim,
        )?;
        for (k, fid) in corrected.iter().enumerate() {
            out.set_fid_at(&index_for(&outer, k, 0), fid);
        }
        if should_report(reporter, &outer) {
            reporter.record_stage("Alignment of subtraction sub-spectra", &outer, &details);
        }
    }

    finish(&mut out, "Alignment of subtraction sub-spectra", details)?;
    Ok(out)
}

/// Eddy-current correction against a reference acquisition.
///
/// The reference either matches the data shape exactly or carries only
/// the spatial and time axes, in which case its per-voxel FID is
/// broadcast across all repetitions.
pub fn ecc(
    data: &MrsVolume,
    reference: &MrsVolume,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let matched = reference.shape() == data.shape();
    let per_voxel = reference.ndim() == 4 && reference.shape()[..4] == data.shape()[..4];
    if !matched && !per_voxel {
        return Err(MrsError::ShapeMismatch {
            expected: format!("{:?} or its first four axes", data.shape()),
            actual: format!("{:?}", reference.shape()),
        });
    }

    let details = "mrs_core::proc::ecc.".to_string();
    let mut out = data.empty_like();
    for (fid, index) in iterate::iter_fids(data) {
        let ref_fid = if matched {
            reference.fid_at(&index)
        } else {
            reference.fid_at(&index[..3])
        };
        out.set_fid_at(&index, &eddy::eddy_correct(&fid, &ref_fid)?);
        if should_report(reporter, &index) {
            reporter.record_stage("Eddy current correction", &index, &details);
        }
    }

    finish(&mut out, "Eddy current correction", details)?;
    Ok(out)
}

/// Subtract subspace-modelled peaks inside a spectral window.
pub fn remove_peaks(
    data: &MrsVolume,
    limits: (f64, f64),
    limit_units: LimitUnits,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let dt = data.dwelltime();
    let cf = data.spectrometer_frequency_hz();
    let details =
        format!("mrs_core::proc::remove_peaks, limits={limits:?}, limit_units={limit_units}.");
    let mut out = map_fids(data, reporter, "Nuisance peak removal", &details, |fid| {
        hlsvd::remove_peaks(fid, dt, cf, limits, limit_units)
    })?;
    finish(&mut out, "Nuisance peak removal", details)?;
    Ok(out)
}

/// Replace each FID with its subspace model of the in-window peaks.
pub fn hlsvd_model_peaks(
    data: &MrsVolume,
    limits: (f64, f64),
    limit_units: LimitUnits,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let dt = data.dwelltime();
    let cf = data.spectrometer_frequency_hz();
    let details =
        format!("mrs_core::proc::hlsvd_model_peaks, limits={limits:?}, limit_units={limit_units}.");
    let mut out = map_fids(data, reporter, "HLSVD modeling", &details, |fid| {
        hlsvd::model_peaks(fid, dt, cf, limits, limit_units)
    })?;
    finish(&mut out, "HLSVD modeling", details)?;
    Ok(out)
}

/// Time-shift both ends of each FID and resample to `samples` points
/// (the current length when `None`). Updates the object dwell time.
pub fn tshift(
    data: &MrsVolume,
    shift_start: f64,
    shift_end: f64,
    samples: Option<usize>,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let samples = samples.unwrap_or_else(|| data.time_points());
    let dt = data.dwelltime();
    let details = format!(
        "mrs_core::proc::tshift, tshift_start={shift_start}, tshift_end={shift_end}, samples={samples}."
    );

    let mut out = data.empty_with_time_points(samples)?;
    let mut new_dwelltime = dt;
    for (fid, index) in iterate::iter_fids(data) {
        let (shifted, ndt) = shifting::timeshift(&fid, dt, shift_start, shift_end, samples)?;
        new_dwelltime = ndt;
        out.set_fid_at(&index, &shifted);
        if should_report(reporter, &index) {
            reporter.record_stage("Temporal resample", &index, &details);
        }
    }
    out.set_dwelltime(new_dwelltime);

    finish(&mut out, "Temporal resample", details)?;
    Ok(out)
}

/// Pad (`npoints > 0`) or truncate (`npoints < 0`) the time axis.
pub fn truncate_or_pad(
    data: &MrsVolume,
    npoints: i64,
    position: PadSide,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let new_len = data.time_points() as i64 + npoints;
    if new_len <= 0 {
        return Err(MrsError::InvalidArgument(format!(
            "cannot truncate {} samples from a {}-sample time axis",
            -npoints,
            data.time_points()
        )));
    }
    let details =
        format!("mrs_core::proc::truncate_or_pad, npoints={npoints}, position={position}.");

    let mut out = data.empty_with_time_points(new_len as usize)?;
    for (fid, index) in iterate::iter_fids(data) {
        let changed = match npoints.cmp(&0) {
            std::cmp::Ordering::Greater => shifting::pad(&fid, npoints as usize, position),
            std::cmp::Ordering::Less => shifting::truncate(&fid, (-npoints) as usize, position)?,
            std::cmp::Ordering::Equal => fid.clone(),
        };
        out.set_fid_at(&index, &changed);
        if should_report(reporter, &index) {
            reporter.record_stage("Zero-filling", &index, &details);
        }
    }

    finish(&mut out, "Zero-filling", details)?;
    Ok(out)
}

/// Apodize every FID.
pub fn apodize(
    data: &MrsVolume,
    kind: ApodizationKind,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let dt = data.dwelltime();
    let details = format!("mrs_core::proc::apodize, filter={kind}.");
    let mut out = map_fids(data, reporter, "Apodization", &details, |fid| {
        Ok(filtering::apodize(fid, dt, kind))
    })?;
    finish(&mut out, "Apodization", details)?;
    Ok(out)
}

/// Shift every spectrum by a fixed frequency offset.
pub fn fshift(
    data: &MrsVolume,
    amount_hz: f64,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let dt = data.dwelltime();
    let details = format!("mrs_core::proc::fshift, amount={amount_hz}.");
    let mut out = map_fids(
        data,
        reporter,
        "Frequency and phase correction",
        &details,
        |fid| Ok(shifting::freqshift(fid, dt, amount_hz)),
    )?;
    finish(&mut out, "Frequency and phase correction", details)?;
    Ok(out)
}

/// Shift the largest peak inside `peak_search` onto `ppm_ref`.
pub fn shift_to_reference(
    data: &MrsVolume,
    ppm_ref: f64,
    peak_search: (f64, f64),
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let bw = data.bandwidth();
    let cf = data.spectrometer_frequency_hz();
    let details = format!(
        "mrs_core::proc::shift_to_reference, ppm_ref={ppm_ref}, peak_search={peak_search:?}."
    );
    let mut out = map_fids(
        data,
        reporter,
        "Frequency and phase correction",
        &details,
        |fid| shifting::shift_to_ref(fid, ppm_ref, bw, cf, peak_search).map(|(f, _)| f),
    )?;
    finish(&mut out, "Frequency and phase correction", details)?;
    Ok(out)
}

/// Partition repeats along the dynamic dimension into good and bad
/// objects. Only defined for single-voxel data whose sole extra
/// dimension is the dynamic one. The bad object is `None` when every
/// repeat passes.
pub fn remove_unlike(
    data: &MrsVolume,
    ppmlim: Option<(f64, f64)>,
    sdlimit: f64,
    niter: usize,
    reporter: &mut dyn StageReporter,
) -> MrsResult<(MrsVolume, Option<MrsVolume>)> {
    if !data.is_single_voxel() {
        return Err(MrsError::NotSingleVoxel);
    }
    if data.tags() != [DimensionTag::Dynamic] {
        return Err(MrsError::MissingDynamicDimension(format!(
            "expected a lone dynamic dimension, found tags {:?}",
            data.tags()
        )));
    }

    let repeats = data.dim_size(DimensionTag::Dynamic)?;
    let batch: Vec<Fid> = (0..repeats).map(|k| data.fid_at(&[0, 0, 0, k])).collect();
    let partition = unlike::identify_unlike(
        &batch,
        data.bandwidth(),
        data.spectrometer_frequency_hz(),
        ppmlim,
        sdlimit,
        niter,
    )?;
    reporter.record_stage(
        "Outlier removal",
        &[0, 0, 0],
        &format!("good={:?}, bad={:?}", partition.good, partition.bad),
    );

    let mut good = data.empty_with_dim_size(DimensionTag::Dynamic, partition.good.len())?;
    for (k, &i) in partition.good.iter().enumerate() {
        good.set_fid_at(&[0, 0, 0, k], &batch[i]);
    }

    let bad = if partition.bad.is_empty() {
        None
    } else {
        let mut vol = data.empty_with_dim_size(DimensionTag::Dynamic, partition.bad.len())?;
        for (k, &i) in partition.bad.iter().enumerate() {
            vol.set_fid_at(&[0, 0, 0, k], &batch[i]);
        }
        Some(vol)
    };

    let details = format!(
        "mrs_core::proc::remove_unlike, ppmlim={ppmlim:?}, sdlimit={sdlimit}, niter={niter}."
    );
    finish(&mut good, "Outlier removal", details)?;
    Ok((good, bad))
}

/// Zero-order phase correction on the largest in-window peak.
pub fn phase_correct(
    data: &MrsVolume,
    ppmlim: (f64, f64),
    use_hlsvd: bool,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let bw = data.bandwidth();
    let cf = data.spectrometer_frequency_hz();
    let details = format!("mrs_core::proc::phase_correct, ppmlim={ppmlim:?}, hlsvd={use_hlsvd}.");
    let mut out = map_fids(data, reporter, "Phasing", &details, |fid| {
        phasing::phase_correct(fid, bw, cf, ppmlim, true, use_hlsvd).map(|(f, _, _)| f)
    })?;
    finish(&mut out, "Phasing", details)?;
    Ok(out)
}

/// Apply caller-chosen zero- and first-order phase terms.
pub fn apply_fixed_phase(
    data: &MrsVolume,
    p0_degrees: f64,
    p1_seconds: f64,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let dt = data.dwelltime();
    let details = format!("mrs_core::proc::apply_fixed_phase, p0={p0_degrees}, p1={p1_seconds}.");
    let mut out = map_fids(data, reporter, "Phasing", &details, |fid| {
        phasing::apply_fixed_phase(fid, dt, p0_degrees, p1_seconds)
    })?;
    finish(&mut out, "Phasing", details)?;
    Ok(out)
}

fn check_same_shape(a: &MrsVolume, b: &MrsVolume) -> MrsResult<()> {
    if a.shape() != b.shape() {
        return Err(MrsError::ShapeMismatch {
            expected: format!("{:?}", a.shape()),
            actual: format!("{:?}", b.shape()),
        });
    }
    Ok(())
}

fn combine_pair(
    data0: &MrsVolume,
    data1: Option<&MrsVolume>,
    dim: Option<DimensionTag>,
    op: CombineOp,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    let (method, name) = match op {
        CombineOp::Add => ("Addition of sub-spectra", "add"),
        CombineOp::Subtract => ("Subtraction of sub-spectra", "sub"),
    };
    let details = format!(
        "mrs_core::proc::{name}, data1={}, dim={dim:?}.",
        data1.is_some()
    );

    let mut out = match (data1, dim) {
        (None, Some(dim)) => {
            if data0.dim_size(dim)? != 2 {
                return Err(MrsError::DimensionMismatch(format!(
                    "combination dimension must have length 2, found {}",
                    data0.dim_size(dim)?
                )));
            }
            let mut out = data0.empty_without_dim(dim)?;
            for (batch, reduced) in iterate::iter_over_dim(data0, dim)? {
                let combined = match op {
                    CombineOp::Add => arithmetic::add(&batch[0], &batch[1]),
                    CombineOp::Subtract => arithmetic::subtract(&batch[0], &batch[1]),
                };
                out.set_fid_at(&reduced, &combined);
                if should_report(reporter, &reduced) {
                    reporter.record_stage(method, &reduced, &details);
                }
            }
            out
        }
        (Some(other), None) => {
            check_same_shape(data0, other)?;
            let mut out = data0.empty_like();
            for (fid, index) in iterate::iter_fids(data0) {
                let other_fid = other.fid_at(&index);
                let combined = match op {
                    CombineOp::Add => arithmetic::add_halved(&fid, &other_fid),
                    CombineOp::Subtract => arithmetic::subtract_halved(&fid, &other_fid),
                };
                out.set_fid_at(&index, &combined);
                if should_report(reporter, &index) {
                    reporter.record_stage(method, &index, &details);
                }
            }
            out
        }
        _ => {
            return Err(MrsError::InvalidArgument(
                "exactly one of data1 or dim must be given".to_string(),
            ))
        }
    };

    finish(&mut out, method, details)?;
    Ok(out)
}

/// Add two objects (halved, average-style) or collapse a length-2
/// dimension by addition. Exactly one of `data1`/`dim` must be given.
pub fn add(
    data0: &MrsVolume,
    data1: Option<&MrsVolume>,
    dim: Option<DimensionTag>,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    combine_pair(data0, data1, dim, CombineOp::Add, reporter)
}

/// Subtract two objects (halved) or collapse a length-2 dimension by
/// subtraction. Exactly one of `data1`/`dim` must be given.
pub fn subtract(
    data0: &MrsVolume,
    data1: Option<&MrsVolume>,
    dim: Option<DimensionTag>,
    reporter: &mut dyn StageReporter,
) -> MrsResult<MrsVolume> {
    combine_pair(data0, data1, dim, CombineOp::Subtract, reporter)
}

/// Conjugate every sample.
pub fn conjugate(data: &MrsVolume, reporter: &mut dyn StageReporter) -> MrsResult<MrsVolume> {
    let details = "mrs_core::proc::conjugate.".to_string();
    let mut out = map_fids(data, reporter, "Conjugation", &details, |fid| {
        Ok(arithmetic::conjugate(fid))
    })?;
    finish(&mut out, "Conjugation", details)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CollectingReporter, NullReporter};
    use rand::SeedableRng;
    use std::f64::consts::PI;

    const BW: f64 = 4000.0;
    const CF: f64 = 123.0e6;

    fn peak_fid(n: usize, ppm: f64, amp: f64, phase: f64) -> Fid {
        let dt = 1.0 / BW;
        let f = crate::spectral::ppm_to_hz(CF, ppm, true);
        (0..n)
            .map(|i| {
                let t = i as f64 * dt;
                Complex64::from_polar(amp * (-8.0 * t).exp(), 2.0 * PI * f * t + phase)
            })
            .collect()
    }

    fn dyn_volume(fids: &[Fid]) -> MrsVolume {
        let mut vol = MrsVolume::new(
            vec![1, 1, 1, fids[0].len(), fids.len()],
            vec![DimensionTag::Dynamic],
            1.0 / BW,
            CF,
            "1H",
        )
        .unwrap();
        for (k, fid) in fids.iter().enumerate() {
            vol.set_fid_at(&[0, 0, 0, k], fid);
        }
        vol
    }

    #[test]
    fn test_average_collapses_dimension() {
        let a = peak_fid(256, 3.0, 1.0, 0.0);
        let b = peak_fid(256, 3.0, 3.0, 0.0);
        let vol = dyn_volume(&[a.clone(), b.clone()]);
        let out = average(&vol, DimensionTag::Dynamic, &mut NullReporter).unwrap();
        assert_eq!(out.shape(), &[1, 1, 1, 256]);
        let mean = out.fid_at(&[0, 0, 0]);
        for i in 0..256 {
            assert!((mean[i] - (a[i] + b[i]) / 2.0).norm() < 1e-12);
        }
        assert_eq!(provenance::history(&out).len(), 1);
        assert_eq!(provenance::history(&out)[0].method, "Signal averaging");
    }

    #[test]
    fn test_average_size_one_dimension() {
        let a = peak_fid(64, 3.0, 1.0, 0.0);
        let vol = dyn_volume(&[a.clone()]);
        let out = average(&vol, DimensionTag::Dynamic, &mut NullReporter).unwrap();
        assert_eq!(out.fid_at(&[0, 0, 0]), a);
    }

    #[test]
    fn test_add_requires_exactly_one_mode() {
        let vol = dyn_volume(&[peak_fid(32, 3.0, 1.0, 0.0), peak_fid(32, 3.0, 1.0, 0.0)]);
        assert!(matches!(
            add(&vol, None, None, &mut NullReporter),
            Err(MrsError::InvalidArgument(_))
        ));
        assert!(matches!(
            add(&vol, Some(&vol), Some(DimensionTag::Dynamic), &mut NullReporter),
            Err(MrsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_add_subtract_symmetry_through_stages() {
        let a = dyn_volume(&[peak_fid(128, 3.0, 1.0, 0.3)]);
        let b = dyn_volume(&[peak_fid(128, 2.0, 0.5, -0.2)]);
        let sum = add(&a, Some(&b), None, &mut NullReporter).unwrap();
        let diff = subtract(&a, Some(&b), None, &mut NullReporter).unwrap();
        let fa = a.fid_at(&[0, 0, 0, 0]);
        let fb = b.fid_at(&[0, 0, 0, 0]);
        let fs = sum.fid_at(&[0, 0, 0, 0]);
        let fd = diff.fid_at(&[0, 0, 0, 0]);
        for i in 0..128 {
            assert!((fs[i] + fd[i] - fa[i]).norm() < 1e-12);
            assert!((fs[i] - fd[i] - fb[i]).norm() < 1e-12);
        }
    }

    #[test]
    fn test_dim_add_collapses() {
        let a = peak_fid(64, 3.0, 1.0, 0.0);
        let b = peak_fid(64, 2.0, 1.0, 0.0);
        let mut vol = MrsVolume::new(
            vec![1, 1, 1, 64, 2],
            vec![DimensionTag::Edit],
            1.0 / BW,
            CF,
            "1H",
        )
        .unwrap();
        vol.set_fid_at(&[0, 0, 0, 0], &a);
        vol.set_fid_at(&[0, 0, 0, 1], &b);

        let out = add(&vol, None, Some(DimensionTag::Edit), &mut NullReporter).unwrap();
        assert_eq!(out.shape(), &[1, 1, 1, 64]);
        let fid = out.fid_at(&[0, 0, 0]);
        // Dimension-collapse path does not halve
        for i in 0..64 {
            assert!((fid[i] - (a[i] + b[i])).norm() < 1e-12);
        }
    }

    #[test]
    fn test_conjugate_stage() {
        let a = peak_fid(64, 3.0, 1.0, 0.4);
        let vol = dyn_volume(&[a.clone()]);
        let out = conjugate(&vol, &mut NullReporter).unwrap();
        let fid = out.fid_at(&[0, 0, 0, 0]);
        for i in 0..64 {
            assert_eq!(fid[i], a[i].conj());
        }
    }

    #[test]
    fn test_reporter_first_index_only() {
        let fids: Vec<Fid> = (0..3).map(|_| peak_fid(64, 3.0, 1.0, 0.0)).collect();
        let vol = dyn_volume(&fids);

        let mut first_only = CollectingReporter::default();
        conjugate(&vol, &mut first_only).unwrap();
        assert_eq!(first_only.records.len(), 1);

        let mut all = CollectingReporter {
            all_indices: true,
            ..Default::default()
        };
        conjugate(&vol, &mut all).unwrap();
        assert_eq!(all.records.len(), 3);
    }

    #[test]
    fn test_input_never_mutated() {
        let a = peak_fid(64, 3.0, 1.0, 0.0);
        let vol = dyn_volume(&[a.clone(), a.clone()]);
        let snapshot = vol.clone();
        let _ = average(&vol, DimensionTag::Dynamic, &mut NullReporter).unwrap();
        let _ = fshift(&vol, 10.0, &mut NullReporter).unwrap();
        for (fid, idx) in iterate::iter_fids(&snapshot) {
            assert_eq!(vol.fid_at(&idx), fid);
        }
        assert!(provenance::history(&vol).is_empty());
    }

    #[test]
    fn test_truncate_or_pad_lengths() {
        let vol = dyn_volume(&[peak_fid(64, 3.0, 1.0, 0.0)]);
        let padded = truncate_or_pad(&vol, 16, PadSide::Last, &mut NullReporter).unwrap();
        assert_eq!(padded.time_points(), 80);
        let trunc = truncate_or_pad(&vol, -16, PadSide::First, &mut NullReporter).unwrap();
        assert_eq!(trunc.time_points(), 48);
        assert!(truncate_or_pad(&vol, -64, PadSide::First, &mut NullReporter).is_err());
    }

    #[test]
    fn test_remove_unlike_requires_dynamic() {
        let fid = peak_fid(64, 3.0, 1.0, 0.0);
        let vol = MrsVolume::from_fid(&fid, 1.0 / BW, CF, "1H").unwrap();
        assert!(matches!(
            remove_unlike(&vol, None, 1.96, 2, &mut NullReporter),
            Err(MrsError::MissingDynamicDimension(_))
        ));
    }

    #[test]
    fn test_remove_unlike_flags_corrupt_repeat() {
        let mut fids: Vec<Fid> = (0..8).map(|_| peak_fid(256, 3.0, 1.0, 0.0)).collect();
        fids[5] = peak_fid(256, 1.0, 5.0, 1.0);
        let vol = dyn_volume(&fids);

        let (good, bad) = remove_unlike(&vol, None, 1.96, 2, &mut NullReporter).unwrap();
        assert_eq!(good.dim_size(DimensionTag::Dynamic).unwrap(), 7);
        let bad = bad.unwrap();
        assert_eq!(bad.dim_size(DimensionTag::Dynamic).unwrap(), 1);
        assert_eq!(bad.fid_at(&[0, 0, 0, 0]), fids[5]);
        assert_eq!(provenance::history(&good)[0].method, "Outlier removal");
    }

    #[test]
    fn test_remove_unlike_keeps_consistent_data() {
        let fids: Vec<Fid> = (0..6).map(|_| peak_fid(256, 3.0, 1.0, 0.0)).collect();
        let vol = dyn_volume(&fids);
        let (good, bad) = remove_unlike(&vol, None, 1.96, 2, &mut NullReporter).unwrap();
        assert_eq!(good.dim_size(DimensionTag::Dynamic).unwrap(), 6);
        assert!(bad.is_none());
    }

    #[test]
    fn test_ecc_restores_phase() {
        let clean = peak_fid(256, 3.0, 1.0, 0.0);
        let dt = 1.0 / BW;
        // Shared time-varying eddy phase on data and reference
        let eddy_phase =
            |i: usize| Complex64::from_polar(1.0, 0.8 * (-(i as f64) * dt * 40.0).exp());
        let corrupted: Fid = clean.iter().enumerate().map(|(i, &x)| x * eddy_phase(i)).collect();
        let reference: Fid = (0..256)
            .map(|i| Complex64::from_polar((-5.0 * i as f64 * dt).exp(), 0.0) * eddy_phase(i))
            .collect();

        let data = MrsVolume::from_fid(&corrupted, dt, CF, "1H").unwrap();
        let refvol = MrsVolume::from_fid(&reference, dt, CF, "1H").unwrap();
        let out = ecc(&data, &refvol, &mut NullReporter).unwrap();
        let fid = out.fid_at(&[0, 0, 0]);
        for i in 0..256 {
            assert!((fid[i] - clean[i]).norm() < 1e-10);
        }
    }

    #[test]
    fn test_ecc_broadcasts_reference_over_dynamics() {
        let clean = peak_fid(128, 3.0, 1.0, 0.0);
        let data = dyn_volume(&[clean.clone(), clean.clone()]);
        let reference =
            MrsVolume::from_fid(&peak_fid(128, 0.0, 1.0, 0.0), 1.0 / BW, CF, "1H").unwrap();
        assert!(ecc(&data, &reference, &mut NullReporter).is_ok());

        let short = MrsVolume::from_fid(&peak_fid(64, 0.0, 1.0, 0.0), 1.0 / BW, CF, "1H").unwrap();
        assert!(matches!(
            ecc(&data, &short, &mut NullReporter),
            Err(MrsError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_align_stage_over_dynamics() {
        let dt = 1.0 / BW;
        let target = peak_fid(512, 3.0, 1.0, 0.0);
        let shifted = shifting::freqshift(&peak_fid(512, 3.0, 1.0, 0.25), dt, 30.0);
        let vol = dyn_volume(&[target.clone(), shifted]);

        let out = align(
            &vol,
            Axis::Dim(DimensionTag::Dynamic),
            None,
            None,
            Some(10.0),
            2,
            &mut NullReporter,
        )
        .unwrap();
        assert_eq!(out.shape(), vol.shape());

        // Aligned repeats should agree far better than the inputs did
        let spread = |v: &MrsVolume| {
            let a = v.fid_at(&[0, 0, 0, 0]);
            let b = v.fid_at(&[0, 0, 0, 1]);
            a.iter().zip(&b).map(|(x, y)| (x - y).norm_sqr()).sum::<f64>().sqrt()
        };
        assert!(spread(&out) < 0.3 * spread(&vol));
        assert_eq!(
            provenance::history(&out)[0].method,
            "Frequency and phase correction"
        );
    }

    fn coil_volume(fids: &[Fid]) -> MrsVolume {
        let mut vol = MrsVolume::new(
            vec![1, 1, 1, fids[0].len(), fids.len()],
            vec![DimensionTag::Coil],
            1.0 / BW,
            CF,
            "1H",
        )
        .unwrap();
        for (k, fid) in fids.iter().enumerate() {
            vol.set_fid_at(&[0, 0, 0, k], fid);
        }
        vol
    }

    #[test]
    fn test_pipeline_combine_then_phase() {
        let config = crate::synthetic::SyntheticConfig {
            coil_amps: vec![1.0, 2.0],
            coil_phases: vec![0.0, PI / 4.0],
            noise_covariance: vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            spectrometer_frequency_hz: CF,
            ..Default::default()
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let coils = crate::synthetic::synthetic_fids(&config, &mut rng).unwrap();
        let truth = crate::synthetic::ground_truth_fid(&config).unwrap();
        let vol = coil_volume(&coils);

        let combined = coilcombine(&vol, None, false, &mut NullReporter).unwrap();
        assert_eq!(combined.shape(), &[1, 1, 1, config.points]);

        // Noiseless coherent coils: combination preserves the spectral shape
        let normalized = |fid: &Fid| {
            let spec = crate::spectral::fid_to_spec(fid);
            let peak = spec.iter().map(|x| x.norm()).fold(0.0, f64::max);
            spec.iter().map(|x| x.norm() / peak).collect::<Vec<f64>>()
        };
        let got = normalized(&combined.fid_at(&[0, 0, 0]));
        let want = normalized(&truth);
        for i in 0..config.points {
            assert!((got[i] - want[i]).abs() < 1e-6, "bin {i}");
        }

        // Dephase then rephase on the 3 ppm peak (7.65 in shifted units).
        // The injected rotation drops out entirely: phasing the dephased
        // data lands on the same signal as phasing the combined data,
        // whatever global phase the coil weights left behind.
        let dephased = apply_fixed_phase(&combined, 70.0, 0.0, &mut NullReporter).unwrap();
        let rephased = phase_correct(&dephased, (6.65, 8.65), false, &mut NullReporter).unwrap();
        let direct = phase_correct(&combined, (6.65, 8.65), false, &mut NullReporter).unwrap();
        let fa = rephased.fid_at(&[0, 0, 0]);
        let fb = direct.fid_at(&[0, 0, 0]);
        for i in 0..config.points {
            assert!((fa[i] - fb[i]).norm() < 1e-9, "sample {i}");
        }

        let history = provenance::history(&rephased);
        let methods: Vec<&str> = history.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(
            methods,
            vec!["RF coil combination", "Phasing", "Phasing"]
        );
    }

    #[test]
    fn test_end_to_end_two_metabolite_scenario() {
        // Two noiseless coils carrying a 2-peak signal: -2 and 3 ppm,
        // damping 5 1/s, amplitude 0.1 each
        let config = crate::synthetic::SyntheticConfig {
            coil_amps: vec![1.0, 1.0],
            coil_phases: vec![0.0, 0.0],
            noise_covariance: vec![vec![0.0; 2]; 2],
            chemical_shifts_ppm: vec![-2.0, 3.0],
            amplitudes: vec![0.1, 0.1],
            phases: vec![0.0, 0.0],
            dampings: vec![5.0, 5.0],
            gauss_fractions: vec![0.0, 0.0],
            spectrometer_frequency_hz: CF,
            ..Default::default()
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let coils = crate::synthetic::synthetic_fids(&config, &mut rng).unwrap();
        let truth = crate::synthetic::ground_truth_fid(&config).unwrap();

        let combined = coilcombine(&coil_volume(&coils), None, false, &mut NullReporter).unwrap();
        let phased = phase_correct(&combined, (6.65, 8.65), false, &mut NullReporter).unwrap();

        // Phasing and combination leave the magnitude spectrum at the
        // ground truth shape
        let magnitudes = |fid: &Fid| {
            let spec = crate::spectral::fid_to_spec(fid);
            let peak = spec.iter().map(|x| x.norm()).fold(0.0, f64::max);
            spec.iter().map(|x| x.norm() / peak).collect::<Vec<f64>>()
        };
        let got = magnitudes(&phased.fid_at(&[0, 0, 0]));
        let want = magnitudes(&truth);
        for i in 0..config.points {
            assert!((got[i] - want[i]).abs() < 1e-2, "bin {i}");
        }
    }

    #[test]
    fn test_coilcombine_invariant_to_coil_order() {
        let config = crate::synthetic::SyntheticConfig {
            coil_amps: vec![1.0, 0.5, 1.5],
            coil_phases: vec![0.1, -0.7, 0.4],
            noise_covariance: vec![vec![0.0; 3]; 3],
            points: 512,
            spectrometer_frequency_hz: CF,
            ..Default::default()
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
        let coils = crate::synthetic::synthetic_fids(&config, &mut rng).unwrap();

        let a = coilcombine(&coil_volume(&coils), None, false, &mut NullReporter).unwrap();
        let permuted = vec![coils[2].clone(), coils[0].clone(), coils[1].clone()];
        let b = coilcombine(&coil_volume(&permuted), None, false, &mut NullReporter).unwrap();

        let fa = a.fid_at(&[0, 0, 0]);
        let fb = b.fid_at(&[0, 0, 0]);
        for i in 0..512 {
            assert!((fa[i] - fb[i]).norm() < 1e-8);
        }
    }

    #[test]
    fn test_coilcombine_rejects_mismatched_reference() {
        let config = crate::synthetic::SyntheticConfig {
            coil_amps: vec![1.0, 1.0],
            coil_phases: vec![0.0, 0.0],
            noise_covariance: vec![vec![0.0; 2]; 2],
            points: 128,
            ..Default::default()
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let coils = crate::synthetic::synthetic_fids(&config, &mut rng).unwrap();
        let data = coil_volume(&coils);
        let reference = coil_volume(&[coils[0].clone()]);
        assert!(matches!(
            coilcombine(&data, Some(&reference), false, &mut NullReporter),
            Err(MrsError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_provenance_chain_across_stages() {
        let vol = dyn_volume(&[peak_fid(128, 3.0, 1.0, 0.0), peak_fid(128, 3.0, 1.0, 0.1)]);
        let averaged = average(&vol, DimensionTag::Dynamic, &mut NullReporter).unwrap();
        let apodized = apodize(
            &averaged,
            ApodizationKind::Exponential {
                line_broadening_hz: 10.0,
            },
            &mut NullReporter,
        )
        .unwrap();
        let shifted = fshift(&apodized, 5.0, &mut NullReporter).unwrap();

        let history = provenance::history(&shifted);
        let methods: Vec<&str> = history.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(
            methods,
            vec![
                "Signal averaging",
                "Apodization",
                "Frequency and phase correction"
            ]
        );
        // Earlier records survive later stages untouched
        assert_eq!(provenance::history(&apodized)[0], history[0]);
        for record in &history {
            assert_eq!(record.program, env!("CARGO_PKG_NAME"));
        }
    }

    #[test]
    fn test_tshift_updates_dwelltime() {
        let vol = dyn_volume(&[peak_fid(128, 3.0, 1.0, 0.0)]);
        let out = tshift(&vol, 0.0, 0.0, Some(256), &mut NullReporter).unwrap();
        assert_eq!(out.time_points(), 256);
        // Same acquisition duration over twice the samples
        assert!((out.dwelltime() - vol.dwelltime() * 128.0 / 256.0).abs() < 1e-15);
    }

    #[test]
    fn test_aligndiff_requires_length_two_diff_dim() {
        let mut vol = MrsVolume::new(
            vec![1, 1, 1, 64, 2, 3],
            vec![DimensionTag::Dynamic, DimensionTag::Edit],
            1.0 / BW,
            CF,
            "1H",
        )
        .unwrap();
        for d in 0..2 {
            for e in 0..3 {
                vol.set_fid_at(&[0, 0, 0, d, e], &peak_fid(64, 3.0, 1.0, 0.0));
            }
        }
        assert!(matches!(
            aligndiff(
                &vol,
                DimensionTag::Dynamic,
                DimensionTag::Edit,
                None,
                CombineOp::Add,
                None,
                &mut NullReporter
            ),
            Err(MrsError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_aligndiff_rejects_equal_dimensions() {
        let vol = dyn_volume(&[peak_fid(64, 3.0, 1.0, 0.0), peak_fid(64, 3.0, 1.0, 0.0)]);
        assert!(matches!(
            aligndiff(
                &vol,
                DimensionTag::Dynamic,
                DimensionTag::Dynamic,
                None,
                CombineOp::Add,
                None,
                &mut NullReporter
            ),
            Err(MrsError::InvalidArgument(_))
        ));
    }

    fn edit_pair_volume(cond0: [&Fid; 2], cond1: &Fid) -> MrsVolume {
        let mut vol = MrsVolume::new(
            vec![1, 1, 1, cond1.len(), 2, 2],
            vec![DimensionTag::Dynamic, DimensionTag::Edit],
            1.0 / BW,
            CF,
            "1H",
        )
        .unwrap();
        vol.set_fid_at(&[0, 0, 0, 0, 0], cond0[0]);
        vol.set_fid_at(&[0, 0, 0, 1, 0], cond0[1]);
        vol.set_fid_at(&[0, 0, 0, 0, 1], cond1);
        vol.set_fid_at(&[0, 0, 0, 1, 1], cond1);
        vol
    }

    #[test]
    fn test_aligndiff_leaves_condition_one_untouched() {
        let base = peak_fid(512, 3.0, 1.0, 0.0);
        let drifted = phasing::apply_phase(&base, 0.4);
        let other = peak_fid(512, 1.0, 0.8, 0.0);
        let vol = edit_pair_volume([&base, &drifted], &other);

        let out = aligndiff(
            &vol,
            DimensionTag::Dynamic,
            DimensionTag::Edit,
            None,
            CombineOp::Add,
            Some((2.5, 3.5)),
            &mut NullReporter,
        )
        .unwrap();
        // Condition 1 passes through byte for byte
        assert_eq!(out.fid_at(&[0, 0, 0, 0, 1]), other);
        assert_eq!(out.fid_at(&[0, 0, 0, 1, 1]), other);
        // Condition 0 repeats converge
        let a = out.fid_at(&[0, 0, 0, 0, 0]);
        let b = out.fid_at(&[0, 0, 0, 1, 0]);
        let residual: f64 = a.iter().zip(&b).map(|(x, y)| (x - y).norm_sqr()).sum();
        let original: f64 = vol
            .fid_at(&[0, 0, 0, 0, 0])
            .iter()
            .zip(&vol.fid_at(&[0, 0, 0, 1, 0]))
            .map(|(x, y)| (x - y).norm_sqr())
            .sum();
        assert!(residual < 0.1 * original, "residual {residual} vs {original}");
    }

    #[test]
    fn test_aligndiff_with_explicit_target() {
        let base = peak_fid(512, 3.0, 1.0, 0.0);
        let rotated = phasing::apply_phase(&base, 0.3);
        let other = peak_fid(512, 1.0, 0.8, 0.0);
        let vol = edit_pair_volume([&rotated, &rotated], &other);
        let target = arithmetic::add(&base, &other);

        let out = aligndiff(
            &vol,
            DimensionTag::Dynamic,
            DimensionTag::Edit,
            Some(&target),
            CombineOp::Add,
            Some((2.5, 3.5)),
            &mut NullReporter,
        )
        .unwrap();
        // Both pairs are pulled onto the supplied target, undoing the
        // shared rotation of condition 0
        for d in 0..2 {
            let fid = out.fid_at(&[0, 0, 0, d, 0]);
            let err: f64 = fid
                .iter()
                .zip(base.iter())
                .map(|(x, y)| (x - y).norm_sqr())
                .sum::<f64>()
                .sqrt();
            let scale: f64 = base.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
            assert!(err / scale < 0.05, "repeat {d}: relative error {}", err / scale);
        }
    }
}
