//! Scenario ground-motion fields for a single rupture.

use std::collections::BTreeMap;

use anyhow::Result;
use ndarray::Array2;

use crate::config::JobConfig;
use crate::error::exactly_one;
use crate::filters::rupture_site_distance_filter;
use crate::gmf::{CorrelationModel, GmfEngine, GmfRequest, GroundMotionModel};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::site::SiteCollection;

/// Turns the model names of a job into objects. Rupture and GSIM libraries
/// live outside this crate.
pub trait ModelResolver<R> {
    fn correlation_model(&self, config: &JobConfig) -> Result<Option<Box<dyn CorrelationModel>>>;

    fn gsims(&self, config: &JobConfig) -> Result<Vec<Box<dyn GroundMotionModel<R>>>>;

    fn rupture(&self, config: &JobConfig) -> Result<R>;
}

/// Build all the ground-motion fields for the whole site collection in a
/// single step.
///
/// Fails with [`ConfigError::AmbiguousGsim`](crate::error::ConfigError) unless
/// the job resolves to exactly one ground-motion model, and with
/// `ConfigError::InvalidValue` on a negative or non-finite truncation level;
/// the engine is not called in either case.
pub fn calc_gmfs_fast<R, M, E>(
    config: &JobConfig,
    resolver: &M,
    sites: &SiteCollection,
    engine: &E,
) -> Result<BTreeMap<String, Array2<f64>>>
where
    M: ModelResolver<R> + ?Sized,
    E: GmfEngine<R> + ?Sized,
{
    let max_dist = config.maximum_distance;
    let correl_model = resolver.correlation_model(config)?;
    let seed = config.random_seed;
    let imts = config.imts()?;
    let gsim = exactly_one(resolver.gsims(config)?)?;
    let trunc_level = config.checked_truncation_level()?;
    let n_gmfs = config.number_of_ground_motion_fields;
    let rupture = resolver.rupture(config)?;

    log(
        Level::Info,
        Domain::Gmf,
        "scenario_start",
        obj(&[
            ("gsim", v_str(gsim.name())),
            ("sites", v_num(sites.len() as f64)),
            ("fields", v_num(n_gmfs as f64)),
            ("seed", v_num(seed as f64)),
        ]),
    );

    engine.compute_fields(&GmfRequest {
        rupture: &rupture,
        sites,
        imts: &imts,
        gsim: gsim.as_ref(),
        truncation_level: trunc_level,
        realizations: n_gmfs,
        correlation_model: correl_model.as_deref(),
        distance_filter: rupture_site_distance_filter(max_dist),
        seed,
    })
}
