//! Hazard curves from simulated ground motion.
//!
//! Assumes Poissonian occurrence: an exceedance rate observed over the
//! simulated duration is turned into a probability over the investigation
//! time. Not valid for non-Poissonian source models.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use ndarray::Array2;
use serde::Serialize;

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::site::{Location, SiteCollection};

/// Probabilities of exceedance of `imls` given one ground-motion value per
/// simulated rupture.
///
/// `duration` is the simulated time span, i.e. investigation time times the
/// number of stochastic event sets.
pub fn gmvs_to_haz_curve(gmvs: &[f64], imls: &[f64], invest_time: f64, duration: f64) -> Vec<f64> {
    let ratio = invest_time / duration;
    imls.iter()
        .map(|iml| {
            let num_exceeding = gmvs.iter().filter(|gmv| *gmv >= iml).count() as f64;
            1.0 - (-ratio * num_exceeding).exp()
        })
        .collect()
}

/// Curves for every site and IMT. Each GMF matrix is (sites x ruptures) and
/// gives an output matrix (sites x levels).
pub fn hazard_curves_by_imt(
    gmfs_by_imt: &BTreeMap<String, Array2<f64>>,
    imtls: &BTreeMap<String, Vec<f64>>,
    invest_time: f64,
    duration: f64,
) -> Result<BTreeMap<String, Array2<f64>>> {
    let mut curves_by_imt = BTreeMap::new();
    for (imt, imls) in imtls {
        let gmfs = gmfs_by_imt
            .get(imt)
            .ok_or_else(|| anyhow!("no ground-motion fields for {}", imt))?;
        let mut curves = Array2::<f64>::zeros((gmfs.nrows(), imls.len()));
        for (mut curve, gmvs) in curves.rows_mut().into_iter().zip(gmfs.rows()) {
            let gmvs = gmvs.to_vec();
            for (poe, value) in curve.iter_mut().zip(gmvs_to_haz_curve(&gmvs, imls, invest_time, duration)) {
                *poe = value;
            }
        }
        log(
            Level::Debug,
            Domain::Curves,
            "curves_built",
            obj(&[("imt", v_str(imt)), ("sites", v_num(gmfs.nrows() as f64))]),
        );
        curves_by_imt.insert(imt.clone(), curves);
    }
    Ok(curves_by_imt)
}

/// PoEs of one site, aligned with the IMLs of one IMT.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardCurve {
    pub location: Location,
    pub poes: Vec<f64>,
}

impl HazardCurve {
    /// Pair each site with its row of `curves` (sites x levels).
    pub fn from_rows(sites: &SiteCollection, curves: &Array2<f64>) -> Vec<HazardCurve> {
        sites
            .iter()
            .zip(curves.rows())
            .map(|(site, row)| HazardCurve {
                location: site.location,
                poes: row.to_vec(),
            })
            .collect()
    }
}
