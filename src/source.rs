//! Capabilities the calculators need from seismic sources and ruptures.
//!
//! Source models live outside this crate; they only have to say which sites
//! are close enough to matter and enumerate their ruptures.

use crate::site::SiteCollection;

/// A single earthquake realization.
pub trait Rupture {
    fn magnitude(&self) -> f64;

    /// Joyner-Boore distance in km from the rupture to each site, aligned
    /// with the collection order.
    fn distances_to(&self, sites: &SiteCollection) -> Vec<f64>;
}

/// A seismogenic zone or fault.
pub trait SeismicSource {
    type Rupture: Rupture;

    fn source_id(&self) -> &str;

    /// Coarse filter: the sites within `maximum_distance` of the source as a
    /// whole, or `None` when no site is close enough.
    fn filter_sites_by_distance(
        &self,
        maximum_distance: f64,
        sites: &SiteCollection,
    ) -> Option<SiteCollection>;

    /// Enumerate the ruptures of the source. Must be finite.
    fn iter_ruptures(&self) -> Box<dyn Iterator<Item = Self::Rupture> + '_>;
}

/// A rupture together with its source and the sites it affects.
pub struct SourceRuptureSites<'a, S: SeismicSource> {
    pub source: &'a S,
    pub rupture: S::Rupture,
    pub sites: SiteCollection,
}
