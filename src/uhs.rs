//! Uniform hazard spectra.

use std::collections::BTreeMap;

use anyhow::{anyhow, ensure, Result};
use ndarray::Array2;
use serde::Serialize;

use crate::imt::{fmt_float, get_imts_periods};

/// Per site and PoE, hazard-map values across spectral periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniformHazardSpectra {
    /// Spectral IMT labels, by increasing period.
    pub imts: Vec<String>,
    pub periods: Vec<f64>,
    /// One name per PoE, `poe~<value>`.
    pub field_names: Vec<String>,
    /// `spectra[site][poe]` holds one value per entry of `imts`.
    pub spectra: Vec<Vec<Vec<f32>>>,
}

impl UniformHazardSpectra {
    pub fn num_sites(&self) -> usize {
        self.spectra.len()
    }

    /// The spectrum stored under `field_name` for site `site`.
    pub fn get(&self, site: usize, field_name: &str) -> Option<&[f32]> {
        let j = self.field_names.iter().position(|f| f == field_name)?;
        self.spectra.get(site).map(|row| row[j].as_slice())
    }
}

/// `poe~` followed by the PoE, e.g. `poe~0.1`, `poe~1e-05`, `poe~1.0`.
pub fn uhs_field_name(poe: f64) -> String {
    format!("poe~{}", fmt_float(poe))
}

/// Build uniform hazard spectra from hazard maps.
///
/// `maps` holds, for each IMT label, a (sites x poes) matrix with columns in
/// the order of `poes`. Only SA and PGA enter the spectra. Sites keep their
/// order.
pub fn make_uhs(maps: &BTreeMap<String, Array2<f64>>, poes: &[f64]) -> Result<UniformHazardSpectra> {
    let (imts, periods) = get_imts_periods(maps.keys())?;
    let num_sites = maps.values().next().map(|m| m.nrows()).unwrap_or(0);

    let mut spectral = Vec::with_capacity(imts.len());
    for imt in &imts {
        let hmap = maps
            .get(imt)
            .ok_or_else(|| anyhow!("no hazard map for {}", imt))?;
        ensure!(
            hmap.dim() == (num_sites, poes.len()),
            "hazard map for {} has shape {:?}, expected ({}, {})",
            imt,
            hmap.dim(),
            num_sites,
            poes.len()
        );
        spectral.push(hmap);
    }

    let spectra: Vec<Vec<Vec<f32>>> = (0..num_sites)
        .map(|i| {
            (0..poes.len())
                .map(|j| spectral.iter().map(|hmap| hmap[[i, j]] as f32).collect())
                .collect()
        })
        .collect();

    Ok(UniformHazardSpectra {
        imts,
        periods,
        field_names: poes.iter().map(|p| uhs_field_name(*p)).collect(),
        spectra,
    })
}
