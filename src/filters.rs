//! Rupture-site distance filtering.

use crate::site::SiteCollection;
use crate::source::Rupture;

/// Sites whose Joyner-Boore distance to `rupture` is within
/// `integration_distance`, or `None` if there are none.
pub fn filter_sites_by_distance_to_rupture<R: Rupture + ?Sized>(
    rupture: &R,
    integration_distance: f64,
    sites: &SiteCollection,
) -> Option<SiteCollection> {
    let mask: Vec<bool> = rupture
        .distances_to(sites)
        .into_iter()
        .map(|d| d <= integration_distance)
        .collect();
    sites.filter(&mask)
}

/// Rupture-site filter bound to a maximum distance, handed to GMF engines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceFilter {
    pub integration_distance: f64,
}

impl DistanceFilter {
    pub fn apply<R: Rupture + ?Sized>(&self, rupture: &R, sites: &SiteCollection) -> Option<SiteCollection> {
        filter_sites_by_distance_to_rupture(rupture, self.integration_distance, sites)
    }
}

pub fn rupture_site_distance_filter(integration_distance: f64) -> DistanceFilter {
    DistanceFilter { integration_distance }
}
