//! Probabilistic seismic hazard building blocks.
//!
//! The pipeline runs from sources to uniform hazard spectra:
//! - [`ruptures`]: ruptures close to a site collection, filtered in two stages
//! - [`scenario`]: ground-motion fields for a single rupture
//! - [`curves`]: hazard curves from simulated ground motion
//! - [`maps`]: hazard maps interpolated from hazard curves
//! - [`uhs`]: uniform hazard spectra from hazard maps
//!
//! Source models, ground-motion models and writers are plugged in through the
//! traits in [`source`], [`gmf`] and [`scenario`].

pub mod config;
pub mod curves;
pub mod error;
pub mod filters;
pub mod gmf;
pub mod imt;
pub mod logging;
pub mod maps;
pub mod monitor;
pub mod ruptures;
pub mod scenario;
pub mod site;
pub mod source;
pub mod uhs;
