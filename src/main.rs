//! Command-line front end.
//!
//! ```text
//! hazardcalc curves <input.json>   ground-motion values -> hazard curves
//! hazardcalc maps <input.json>     hazard curves -> hazard maps + UHS
//! ```
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use hazardcalc::curves::hazard_curves_by_imt;
use hazardcalc::logging::{log, obj, v_num, v_str, Domain, Level};
use hazardcalc::maps::hazard_maps_by_imt;
use hazardcalc::uhs::make_uhs;
use ndarray::Array2;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct CurvesInput {
    imtls: BTreeMap<String, Vec<f64>>,
    investigation_time: f64,
    #[serde(default = "one")]
    ses_per_logic_tree_path: u32,
    /// Per IMT, one row of ground-motion values per site.
    gmfs: BTreeMap<String, Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct MapsInput {
    imtls: BTreeMap<String, Vec<f64>>,
    poes: Vec<f64>,
    /// Per IMT, one curve per site.
    curves: BTreeMap<String, Vec<Vec<f64>>>,
}

fn one() -> u32 {
    1
}

fn to_array2(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != ncols) {
        bail!("ragged matrix: rows must all have {} values", ncols);
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(Array2::from_shape_vec((rows.len(), ncols), flat)?)
}

fn to_arrays(input: &BTreeMap<String, Vec<Vec<f64>>>) -> Result<BTreeMap<String, Array2<f64>>> {
    input
        .iter()
        .map(|(imt, rows)| -> Result<(String, Array2<f64>)> {
            Ok((imt.clone(), to_array2(rows).with_context(|| imt.clone())?))
        })
        .collect()
}

fn to_rows(arrays: &BTreeMap<String, Array2<f64>>) -> BTreeMap<String, Vec<Vec<f64>>> {
    arrays
        .iter()
        .map(|(imt, a)| (imt.clone(), a.rows().into_iter().map(|r| r.to_vec()).collect()))
        .collect()
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run_curves(path: &Path) -> Result<serde_json::Value> {
    let input: CurvesInput = read_json(path)?;
    let duration = input.investigation_time * input.ses_per_logic_tree_path as f64;
    let gmfs = to_arrays(&input.gmfs)?;
    let curves = hazard_curves_by_imt(&gmfs, &input.imtls, input.investigation_time, duration)?;
    Ok(json!({ "curves": to_rows(&curves) }))
}

fn run_maps(path: &Path) -> Result<serde_json::Value> {
    let input: MapsInput = read_json(path)?;
    let curves = to_arrays(&input.curves)?;
    let maps = hazard_maps_by_imt(&curves, &input.imtls, &input.poes)?;
    let uhs = make_uhs(&maps, &input.poes)?;
    Ok(json!({ "maps": to_rows(&maps), "uhs": uhs }))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let (command, path) = match args.as_slice() {
        [_, command, path] => (command.as_str(), Path::new(path)),
        _ => return Err(anyhow!("usage: hazardcalc <curves|maps> <input.json>")),
    };

    let started = std::time::Instant::now();
    let output = match command {
        "curves" => run_curves(path)?,
        "maps" => run_maps(path)?,
        other => bail!("unknown command {:?}", other),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    log(
        Level::Info,
        Domain::System,
        "done",
        obj(&[
            ("command", v_str(command)),
            ("elapsed_ms", v_num(started.elapsed().as_secs_f64() * 1000.0)),
        ]),
    );
    Ok(())
}
