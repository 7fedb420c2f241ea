//! Rupture generation with two-stage spatial filtering.
//!
//! Sources are first checked against the whole site collection with their own
//! coarse filter; only the survivors have their ruptures enumerated, and each
//! rupture is then tested exactly against the sites that passed the coarse
//! stage.

use std::borrow::Cow;

use crate::filters::filter_sites_by_distance_to_rupture;
use crate::logging::log_source_skipped;
use crate::monitor::{Monitor, MonitorFactory};
use crate::site::{Site, SiteCollection};
use crate::source::{SeismicSource, SourceRuptureSites};

/// Lazy iterator over `(source, rupture, affected sites)`.
///
/// Preserves source order and, within a source, rupture order.
pub struct RuptureGenerator<'a, I, S: SeismicSource> {
    sources: I,
    sites: Cow<'a, SiteCollection>,
    maximum_distance: f64,
    filtsources_mon: Monitor,
    genruptures_mon: Monitor,
    filtruptures_mon: Monitor,
    current: Option<ActiveSource<'a, S>>,
}

struct ActiveSource<'a, S: SeismicSource> {
    source: &'a S,
    sites: SiteCollection,
    ruptures: std::vec::IntoIter<S::Rupture>,
}

impl<'a, S: SeismicSource> ActiveSource<'a, S> {
    fn next_affecting(&mut self, maximum_distance: f64, mon: &Monitor) -> Option<SourceRuptureSites<'a, S>> {
        for rupture in self.ruptures.by_ref() {
            let r_sites = {
                let _scope = mon.measure();
                filter_sites_by_distance_to_rupture(&rupture, maximum_distance, &self.sites)
            };
            if let Some(sites) = r_sites {
                return Some(SourceRuptureSites {
                    source: self.source,
                    rupture,
                    sites,
                });
            }
        }
        None
    }
}

impl<'a, I, S> RuptureGenerator<'a, I, S>
where
    I: Iterator<Item = &'a S>,
    S: SeismicSource + 'a,
{
    fn new<M: MonitorFactory + ?Sized>(
        sources: I,
        sites: Cow<'a, SiteCollection>,
        maximum_distance: f64,
        monitor: &M,
    ) -> Self {
        Self {
            sources,
            sites,
            maximum_distance,
            filtsources_mon: monitor.monitor("filtering sources"),
            genruptures_mon: monitor.monitor("generating ruptures"),
            filtruptures_mon: monitor.monitor("filtering ruptures"),
            current: None,
        }
    }

    /// Run the coarse filter and enumerate ruptures for the next source that
    /// has any close site and at least one rupture.
    fn activate_next(&mut self) -> Option<ActiveSource<'a, S>> {
        loop {
            let source = self.sources.next()?;
            let s_sites = {
                let _scope = self.filtsources_mon.measure();
                source.filter_sites_by_distance(self.maximum_distance, &self.sites)
            };
            let Some(s_sites) = s_sites else {
                log_source_skipped(source.source_id(), "too far");
                continue;
            };
            let ruptures: Vec<S::Rupture> = {
                let _scope = self.genruptures_mon.measure();
                source.iter_ruptures().collect()
            };
            if ruptures.is_empty() {
                log_source_skipped(source.source_id(), "no ruptures");
                continue;
            }
            return Some(ActiveSource {
                source,
                sites: s_sites,
                ruptures: ruptures.into_iter(),
            });
        }
    }
}

impl<'a, I, S> Iterator for RuptureGenerator<'a, I, S>
where
    I: Iterator<Item = &'a S>,
    S: SeismicSource + 'a,
{
    type Item = SourceRuptureSites<'a, S>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(active) = self.current.as_mut() {
                if let Some(item) = active.next_affecting(self.maximum_distance, &self.filtruptures_mon) {
                    return Some(item);
                }
            }
            self.current = Some(self.activate_next()?);
        }
    }
}

/// Yield `(source, rupture, affected sites)` for every rupture of `sources`
/// within `maximum_distance` of at least one site.
pub fn gen_ruptures<'a, I, S, M>(
    sources: I,
    site_coll: &'a SiteCollection,
    maximum_distance: f64,
    monitor: &M,
) -> RuptureGenerator<'a, I::IntoIter, S>
where
    I: IntoIterator<Item = &'a S>,
    S: SeismicSource + 'a,
    M: MonitorFactory + ?Sized,
{
    RuptureGenerator::new(sources.into_iter(), Cow::Borrowed(site_coll), maximum_distance, monitor)
}

/// Ruptures close to a single site, grouped by source.
///
/// Grouping only merges consecutive ruptures of the same source: a source
/// showing up again after another one starts a new group.
pub struct SiteRuptures<'a, I, S: SeismicSource> {
    inner: RuptureGenerator<'a, I, S>,
    pending: Option<SourceRuptureSites<'a, S>>,
}

impl<'a, I, S> Iterator for SiteRuptures<'a, I, S>
where
    I: Iterator<Item = &'a S>,
    S: SeismicSource + 'a,
{
    type Item = (&'a S, Vec<S::Rupture>);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.pending.take().or_else(|| self.inner.next())?;
        let source = first.source;
        let mut ruptures = vec![first.rupture];
        for row in self.inner.by_ref() {
            if std::ptr::eq(row.source, source) {
                ruptures.push(row.rupture);
            } else {
                self.pending = Some(row);
                break;
            }
        }
        Some((source, ruptures))
    }
}

/// Yield `(source, ruptures close to site)`.
pub fn gen_ruptures_for_site<'a, I, S, M>(
    site: Site,
    sources: I,
    maximum_distance: f64,
    monitor: &M,
) -> SiteRuptures<'a, I::IntoIter, S>
where
    I: IntoIterator<Item = &'a S>,
    S: SeismicSource + 'a,
    M: MonitorFactory + ?Sized,
{
    let inner = RuptureGenerator::new(
        sources.into_iter(),
        Cow::Owned(SiteCollection::single(site)),
        maximum_distance,
        monitor,
    );
    SiteRuptures { inner, pending: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{NoopMonitor, PerformanceMonitor};
    use crate::site::Location;
    use crate::source::Rupture;
    use std::cell::Cell;

    #[derive(Debug, Clone)]
    struct PointRupture {
        mag: f64,
        loc: Location,
    }

    impl Rupture for PointRupture {
        fn magnitude(&self) -> f64 {
            self.mag
        }

        fn distances_to(&self, sites: &SiteCollection) -> Vec<f64> {
            sites.locations().map(|l| l.distance_to(&self.loc)).collect()
        }
    }

    struct PointSource {
        id: String,
        loc: Location,
        ruptures: Vec<PointRupture>,
        enumerated: Cell<u32>,
    }

    impl PointSource {
        fn new(id: &str, lon: f64, ruptures: &[(f64, f64)]) -> Self {
            Self {
                id: id.to_string(),
                loc: Location::new(lon, 0.0),
                ruptures: ruptures
                    .iter()
                    .map(|&(mag, rlon)| PointRupture { mag, loc: Location::new(rlon, 0.0) })
                    .collect(),
                enumerated: Cell::new(0),
            }
        }
    }

    impl SeismicSource for PointSource {
        type Rupture = PointRupture;

        fn source_id(&self) -> &str {
            &self.id
        }

        fn filter_sites_by_distance(&self, maximum_distance: f64, sites: &SiteCollection) -> Option<SiteCollection> {
            // pad by roughly one degree for the rupture extent
            let mask: Vec<bool> = sites
                .locations()
                .map(|l| l.distance_to(&self.loc) <= maximum_distance + 112.0)
                .collect();
            sites.filter(&mask)
        }

        fn iter_ruptures(&self) -> Box<dyn Iterator<Item = PointRupture> + '_> {
            self.enumerated.set(self.enumerated.get() + 1);
            Box::new(self.ruptures.iter().cloned())
        }
    }

    fn sites() -> SiteCollection {
        SiteCollection::new(vec![Site::new(0.0, 0.0), Site::new(1.0, 0.0)])
    }

    #[test]
    fn test_far_source_is_never_enumerated() {
        let near = PointSource::new("near", 0.0, &[(5.0, 0.0)]);
        let far = PointSource::new("far", 40.0, &[(7.0, 40.0)]);
        let sites = sites();
        let out: Vec<_> = gen_ruptures([&near, &far], &sites, 100.0, &NoopMonitor).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source.id, "near");
        assert_eq!(far.enumerated.get(), 0);
        assert_eq!(near.enumerated.get(), 1);
    }

    #[test]
    fn test_rupture_filter_uses_source_filtered_sites() {
        // the source reaches site 0 only; the first rupture sits on site 1,
        // which the coarse stage already removed
        let src = PointSource::new("s", -1.5, &[(5.0, 1.0), (6.0, -0.5)]);
        let sites = sites();
        let out: Vec<_> = gen_ruptures([&src], &sites, 100.0, &NoopMonitor).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rupture.mag, 6.0);
        assert_eq!(out[0].sites.sids(), &[0]);
    }

    #[test]
    fn test_monitors_are_created_and_fed() {
        let src = PointSource::new("s", 0.0, &[(5.0, 0.0), (5.5, 0.1)]);
        let sites = sites();
        let pm = PerformanceMonitor::new();
        let n = gen_ruptures([&src], &sites, 100.0, &pm).count();
        assert_eq!(n, 2);
        let report = pm.report();
        let names: Vec<_> = report.iter().map(|r| r.operation.as_str()).collect();
        assert_eq!(names, vec!["filtering sources", "generating ruptures", "filtering ruptures"]);
        assert_eq!(report[0].counts, 1);
        assert_eq!(report[1].counts, 1);
        assert_eq!(report[2].counts, 2);
    }

    #[test]
    fn test_site_query_groups_contiguous_runs() {
        let a = PointSource::new("a", 0.0, &[(5.0, 0.0), (5.1, 0.0)]);
        let b = PointSource::new("b", 0.0, &[(6.0, 0.0)]);
        let groups: Vec<_> =
            gen_ruptures_for_site(Site::new(0.0, 0.0), [&a, &b, &a], 50.0, &NoopMonitor).collect();
        assert_eq!(groups.len(), 3);
        let ids: Vec<_> = groups.iter().map(|(s, _)| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1.len(), 1);
        assert_eq!(groups[2].1.len(), 2);
    }
}
