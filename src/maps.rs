//! Hazard maps: the intensity level reached with a given probability of
//! exceedance, interpolated from hazard curves.

use std::collections::BTreeMap;

use anyhow::{anyhow, ensure, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::logging::{log, obj, v_num, v_str, Domain, Level};

/// Floor applied to PoEs before taking logarithms.
pub const EPSILON: f64 = 1e-30;

/// Curves accepted by [`compute_hazard_maps`]: one row per location. A single
/// curve becomes a one-row matrix.
#[derive(Debug, Clone)]
pub struct HazardCurves<'a>(ArrayView2<'a, f64>);

impl<'a> From<ArrayView2<'a, f64>> for HazardCurves<'a> {
    fn from(view: ArrayView2<'a, f64>) -> Self {
        HazardCurves(view)
    }
}

impl<'a> From<&'a Array2<f64>> for HazardCurves<'a> {
    fn from(curves: &'a Array2<f64>) -> Self {
        HazardCurves(curves.view())
    }
}

impl<'a> From<&'a Array1<f64>> for HazardCurves<'a> {
    fn from(curve: &'a Array1<f64>) -> Self {
        HazardCurves(curve.view().insert_axis(Axis(0)))
    }
}

impl<'a> From<&'a [f64]> for HazardCurves<'a> {
    fn from(curve: &'a [f64]) -> Self {
        HazardCurves(ArrayView1::from(curve).insert_axis(Axis(0)))
    }
}

/// Target probabilities: a scalar or a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Poes(pub Vec<f64>);

impl From<f64> for Poes {
    fn from(poe: f64) -> Self {
        Poes(vec![poe])
    }
}

impl From<Vec<f64>> for Poes {
    fn from(poes: Vec<f64>) -> Self {
        Poes(poes)
    }
}

impl From<&[f64]> for Poes {
    fn from(poes: &[f64]) -> Self {
        Poes(poes.to_vec())
    }
}

/// Interpolate a hazard map at each of `poes` for every curve.
///
/// Each curve holds the PoEs of `imls`, which increase with the index, so the
/// PoEs are expected to be non-increasing. Results for non-monotonic curves are
/// unspecified. Returns a (curves x poes) matrix.
///
/// A target PoE above the largest PoE of a curve maps to 0: the intensity is
/// extrapolated to zero, so an all-zero curve yields an all-zero map.
///
/// # Panics
/// If the curve length differs from the number of `imls`.
pub fn compute_hazard_maps<'a>(
    curves: impl Into<HazardCurves<'a>>,
    imls: &[f64],
    poes: impl Into<Poes>,
) -> Array2<f64> {
    let HazardCurves(curves) = curves.into();
    let Poes(poes) = poes.into();
    assert_eq!(
        curves.ncols(),
        imls.len(),
        "curves have {} levels but {} imls were given",
        curves.ncols(),
        imls.len()
    );

    let log_imls: Vec<f64> = imls.iter().rev().map(|iml| iml.ln()).collect();
    let mut result = Array2::<f64>::zeros((curves.nrows(), poes.len()));
    for (mut hmap, curve) in result.rows_mut().into_iter().zip(curves.rows()) {
        // floor first, then log
        let curve_cutoff: Vec<f64> = curve.iter().rev().map(|poe| poe.max(EPSILON)).collect();
        let log_curve: Vec<f64> = curve_cutoff.iter().map(|poe| poe.ln()).collect();
        let max_poe = curve_cutoff.last().copied().unwrap_or(EPSILON);
        for (val, poe) in hmap.iter_mut().zip(&poes) {
            *val = if *poe > max_poe {
                0.0
            } else {
                interp(poe.ln(), &log_curve, &log_imls).exp()
            };
        }
    }
    result
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, `xp` ascending.
/// Outside the range the end values are returned.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    assert_eq!(xp.len(), fp.len(), "xp and fp must have the same length");
    let n = xp.len();
    if x < xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let j = xp.partition_point(|v| *v <= x).saturating_sub(1).min(n - 2);
    let slope = (fp[j + 1] - fp[j]) / (xp[j + 1] - xp[j]);
    slope * (x - xp[j]) + fp[j]
}

/// Hazard maps for every IMT: each curve matrix (sites x levels) becomes a
/// map matrix (sites x poes). A curve length that differs from the IMT's
/// levels is an error.
pub fn hazard_maps_by_imt(
    curves_by_imt: &BTreeMap<String, Array2<f64>>,
    imtls: &BTreeMap<String, Vec<f64>>,
    poes: &[f64],
) -> Result<BTreeMap<String, Array2<f64>>> {
    let mut maps = BTreeMap::new();
    for (imt, curves) in curves_by_imt {
        let imls = imtls
            .get(imt)
            .ok_or_else(|| anyhow!("no intensity levels for {}", imt))?;
        ensure!(
            curves.ncols() == imls.len(),
            "curves for {} have {} levels but {} imls were given",
            imt,
            curves.ncols(),
            imls.len()
        );
        maps.insert(imt.clone(), compute_hazard_maps(curves, imls, poes));
        log(
            Level::Debug,
            Domain::Maps,
            "maps_built",
            obj(&[("imt", v_str(imt)), ("poes", v_num(poes.len() as f64))]),
        );
    }
    Ok(maps)
}
