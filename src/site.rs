//! Geographic locations, sites and site collections.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Mean earth radius in km.
pub const EARTH_RADIUS: f64 = 6371.0;

/// A point on the earth surface; `x` is the longitude and `y` the latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
}

impl Location {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn x(&self) -> f64 {
        self.lon
    }

    pub fn y(&self) -> f64 {
        self.lat
    }

    /// Great-circle distance in km (haversine).
    pub fn distance_to(&self, other: &Location) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS * a.sqrt().min(1.0).asin()
    }

    /// Reproducible ordering by `(x, y)`.
    pub fn cmp_xy(&self, other: &Location) -> Ordering {
        self.lon
            .total_cmp(&other.lon)
            .then_with(|| self.lat.total_cmp(&other.lat))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub location: Location,
    /// Average shear-wave velocity in the top 30 m (m/s).
    #[serde(default = "default_vs30")]
    pub vs30: f64,
}

fn default_vs30() -> f64 {
    760.0
}

impl Site {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            location: Location::new(lon, lat),
            vs30: default_vs30(),
        }
    }

    pub fn with_vs30(mut self, vs30: f64) -> Self {
        self.vs30 = vs30;
        self
    }
}

/// Ordered sites. `sids[i]` is the position of `sites[i]` in the complete
/// collection this one was filtered from.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCollection {
    sites: Vec<Site>,
    sids: Vec<usize>,
    total_sites: usize,
}

impl SiteCollection {
    pub fn new(sites: Vec<Site>) -> Self {
        let n = sites.len();
        Self {
            sites,
            sids: (0..n).collect(),
            total_sites: n,
        }
    }

    pub fn single(site: Site) -> Self {
        Self::new(vec![site])
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Size of the complete collection this one belongs to.
    pub fn total_sites(&self) -> usize {
        self.total_sites
    }

    pub fn sids(&self) -> &[usize] {
        &self.sids
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Site> {
        self.sites.iter()
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> + '_ {
        self.sites.iter().map(|s| &s.location)
    }

    /// Keep the sites whose mask entry is true; `None` if none survive.
    ///
    /// # Panics
    /// If `mask` is shorter than the collection.
    pub fn filter(&self, mask: &[bool]) -> Option<SiteCollection> {
        let mut sites = Vec::new();
        let mut sids = Vec::new();
        for (i, site) in self.sites.iter().enumerate() {
            if mask[i] {
                sites.push(site.clone());
                sids.push(self.sids[i]);
            }
        }
        if sites.is_empty() {
            return None;
        }
        Some(SiteCollection {
            sites,
            sids,
            total_sites: self.total_sites,
        })
    }
}

impl<'a> IntoIterator for &'a SiteCollection {
    type Item = &'a Site;
    type IntoIter = std::slice::Iter<'a, Site>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}
