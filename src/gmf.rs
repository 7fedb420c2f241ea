//! Ground-motion field simulation.
//!
//! [`GmfEngine`] is the contract the scenario calculator delegates to;
//! [`StochasticGmfEngine`] samples fields from a ground-motion model with
//! inter- and intra-event residuals. [`GmfCollection`] reshapes computed
//! matrices into per-rupture fields for writers that need a stable order.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{ensure, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::filters::DistanceFilter;
use crate::imt::{fmt_float, Imt};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::site::{Location, SiteCollection};
use crate::source::Rupture;

/// Mean and standard deviations of ln(ground motion), one entry per site.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanStddevs {
    pub mean: Vec<f64>,
    pub inter_event: Vec<f64>,
    pub intra_event: Vec<f64>,
}

/// Ground-motion prediction model (GSIM).
pub trait GroundMotionModel<R: ?Sized> {
    fn name(&self) -> &str;

    fn mean_and_stddevs(&self, rupture: &R, sites: &SiteCollection, imt: &Imt) -> Result<MeanStddevs>;
}

/// Spatial correlation of intra-event residuals.
pub trait CorrelationModel {
    /// Correlate `residuals` (sites x fields, standard-normal samples) in place.
    fn apply_correlation(&self, sites: &SiteCollection, imt: &Imt, residuals: &mut Array2<f64>);
}

/// Everything an engine needs for one rupture.
pub struct GmfRequest<'a, R: ?Sized> {
    pub rupture: &'a R,
    pub sites: &'a SiteCollection,
    pub imts: &'a [Imt],
    pub gsim: &'a dyn GroundMotionModel<R>,
    pub truncation_level: Option<f64>,
    pub realizations: usize,
    pub correlation_model: Option<&'a dyn CorrelationModel>,
    pub distance_filter: DistanceFilter,
    pub seed: u64,
}

pub trait GmfEngine<R: ?Sized> {
    /// Fields keyed by IMT label, each matrix shaped (sites x realizations).
    fn compute_fields(&self, request: &GmfRequest<'_, R>) -> Result<BTreeMap<String, Array2<f64>>>;
}

/// Samples fields from the GSIM distribution with a seeded generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct StochasticGmfEngine;

impl<R: Rupture + ?Sized> GmfEngine<R> for StochasticGmfEngine {
    fn compute_fields(&self, req: &GmfRequest<'_, R>) -> Result<BTreeMap<String, Array2<f64>>> {
        if let Some(t) = req.truncation_level {
            ensure!(
                t.is_finite() && t >= 0.0,
                "truncation level must be finite and non-negative, got {}",
                t
            );
        }
        let total = req.sites.len();
        let shape = (total, req.realizations);
        let mut result = BTreeMap::new();

        let Some(sites) = req.distance_filter.apply(req.rupture, req.sites) else {
            log(
                Level::Debug,
                Domain::Gmf,
                "no_sites_in_range",
                obj(&[("gsim", v_str(req.gsim.name()))]),
            );
            for imt in req.imts {
                result.insert(imt.to_string(), Array2::zeros(shape));
            }
            return Ok(result);
        };

        // positions of the surviving sites within the request collection
        let rows: Vec<usize> = {
            let mut by_sid = vec![usize::MAX; req.sites.total_sites()];
            for (i, sid) in req.sites.sids().iter().enumerate() {
                by_sid[*sid] = i;
            }
            sites.sids().iter().map(|sid| by_sid[*sid]).collect()
        };

        let mut rng = StdRng::seed_from_u64(req.seed);
        for imt in req.imts {
            let ms = req.gsim.mean_and_stddevs(req.rupture, &sites, imt)?;
            ensure!(
                ms.mean.len() == sites.len()
                    && ms.inter_event.len() == sites.len()
                    && ms.intra_event.len() == sites.len(),
                "{} returned {} means for {} sites",
                req.gsim.name(),
                ms.mean.len(),
                sites.len()
            );
            let field = sample_field(&ms, &sites, imt, req, &mut rng);
            let mut full = Array2::<f64>::zeros(shape);
            for (i, row) in rows.iter().enumerate() {
                full.row_mut(*row).assign(&field.row(i));
            }
            result.insert(imt.to_string(), full);
        }
        Ok(result)
    }
}

fn sample_field<R: ?Sized>(
    ms: &MeanStddevs,
    sites: &SiteCollection,
    imt: &Imt,
    req: &GmfRequest<'_, R>,
    rng: &mut StdRng,
) -> Array2<f64> {
    let n = sites.len();
    if req.truncation_level == Some(0.0) {
        return Array2::from_shape_fn((n, req.realizations), |(i, _)| ms.mean[i].exp());
    }

    let mut intra = Array2::from_shape_fn((n, req.realizations), |_| sample_normal(rng, req.truncation_level));
    if let Some(correlation) = req.correlation_model {
        correlation.apply_correlation(sites, imt, &mut intra);
    }
    let inter: Vec<f64> = (0..req.realizations)
        .map(|_| sample_normal(rng, req.truncation_level))
        .collect();

    Array2::from_shape_fn((n, req.realizations), |(i, j)| {
        (ms.mean[i] + intra[[i, j]] * ms.intra_event[i] + inter[j] * ms.inter_event[i]).exp()
    })
}

/// Standard normal sample, limited to `[-t, t]` when truncated.
///
/// Truncated samples come from the inverse CDF over the retained probability
/// mass, so the cost does not depend on `t`.
fn sample_normal(rng: &mut StdRng, truncation_level: Option<f64>) -> f64 {
    match truncation_level {
        None => {
            // Box-Muller; 1 - u keeps the log argument in (0, 1]
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = rng.gen();
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
        }
        Some(t) => {
            // half the mass of N(0, 1) within [-t, t]
            let half_mass = 0.5 * erf(t / std::f64::consts::SQRT_2);
            let u = 0.5 + half_mass * (2.0 * rng.gen::<f64>() - 1.0);
            let z = inverse_normal_cdf(u.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON / 2.0));
            z.clamp(-t, t)
        }
    }
}

/// Error function. Taylor series near zero, complementary expansion in the
/// tails; absolute error below 1e-11.
fn erf(x: f64) -> f64 {
    let ax = x.abs();
    if ax > 3.0 {
        // Chebyshev fit of erfc, relative error < 1.2e-7
        let t = 1.0 / (1.0 + 0.5 * ax);
        let poly = -1.265_512_23
            + t * (1.000_023_68
                + t * (0.374_091_96
                    + t * (0.096_784_18
                        + t * (-0.186_288_06
                            + t * (0.278_868_07
                                + t * (-1.135_203_98
                                    + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
        let erfc = t * (-ax * ax + poly).exp();
        return (1.0 - erfc).copysign(x);
    }
    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    let mut n = 0.0;
    while term.abs() > 1e-17 * sum.abs().max(f64::MIN_POSITIVE) {
        n += 1.0;
        term *= -x2 / n;
        sum += term / (2.0 * n + 1.0);
    }
    2.0 / std::f64::consts::PI.sqrt() * sum
}

/// Quantile function of N(0, 1) for `p` in (0, 1), relative error ~1e-9.
fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p > 1.0 - P_LOW {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}

// =============================================================================
// Export model
// =============================================================================

/// Ground-motion value at one location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmfNode {
    pub gmv: f64,
    pub location: Location,
}

impl fmt::Display for GmfNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<X={:9.5}, Y={:9.5}, GMV={:9.7}>",
            self.location.x(),
            self.location.y(),
            self.gmv
        )
    }
}

/// The field generated by one rupture for one IMT.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundMotionField {
    pub imt: String,
    pub sa_period: Option<f64>,
    pub sa_damping: Option<f64>,
    pub rupture_tag: String,
    pub nodes: Vec<GmfNode>,
}

impl GroundMotionField {
    /// Nodes in reproducible `(x, y)` order.
    pub fn sorted_nodes(&self) -> Vec<GmfNode> {
        let mut nodes = self.nodes.clone();
        nodes.sort_by(|a, b| a.location.cmp_xy(&b.location));
        nodes
    }
}

impl fmt::Display for GroundMotionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<f64>| v.map(fmt_float).unwrap_or_else(|| "None".to_string());
        write!(
            f,
            "GMF(imt={} sa_period={} sa_damping={} rupture_id={}",
            self.imt,
            opt(self.sa_period),
            opt(self.sa_damping),
            self.rupture_tag
        )?;
        for node in self.sorted_nodes() {
            write!(f, "\n{}", node)?;
        }
        f.write_str(")")
    }
}

/// The fields of one stochastic event set.
#[derive(Debug, Clone, PartialEq)]
pub struct GmfSet {
    pub investigation_time: f64,
    pub stochastic_event_set_id: u32,
    pub fields: Vec<GroundMotionField>,
}

impl fmt::Display for GmfSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // sorted by text: independent of IMT and rupture order
        let mut fields: Vec<String> = self.fields.iter().map(|g| g.to_string()).collect();
        fields.sort();
        write!(
            f,
            "GMFsPerSES(investigation_time={:.6}, stochastic_event_set_id={},\n{})",
            self.investigation_time,
            self.stochastic_event_set_id,
            fields.join("\n")
        )
    }
}

/// Fields of several ruptures over one site collection.
pub struct GmfCollection<'a> {
    sites: &'a SiteCollection,
    rupture_tags: &'a [String],
    gmfs_by_imt: &'a BTreeMap<String, Array2<f64>>,
}

impl<'a> GmfCollection<'a> {
    pub fn new(
        sites: &'a SiteCollection,
        rupture_tags: &'a [String],
        gmfs_by_imt: &'a BTreeMap<String, Array2<f64>>,
    ) -> Self {
        Self {
            sites,
            rupture_tags,
            gmfs_by_imt,
        }
    }

    /// One field per (IMT, rupture), IMTs in label order. Column `j` of each
    /// matrix belongs to `rupture_tags[j]`.
    pub fn fields(&self) -> Result<Vec<GroundMotionField>> {
        let mut fields = Vec::new();
        for (label, gmfs) in self.gmfs_by_imt {
            let imt: Imt = label.parse()?;
            for (tag, column) in self.rupture_tags.iter().zip(gmfs.columns()) {
                let nodes = self
                    .sites
                    .iter()
                    .zip(column.iter())
                    .map(|(site, gmv)| GmfNode {
                        gmv: *gmv,
                        location: site.location,
                    })
                    .collect();
                fields.push(GroundMotionField {
                    imt: imt.name().to_string(),
                    sa_period: imt.period(),
                    sa_damping: imt.damping(),
                    rupture_tag: tag.clone(),
                    nodes,
                });
            }
        }
        Ok(fields)
    }

    /// All fields wrapped as the single event set of a scenario.
    pub fn gmf_set(&self, investigation_time: f64) -> Result<GmfSet> {
        Ok(GmfSet {
            investigation_time,
            stochastic_event_set_id: 1,
            fields: self.fields()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::rupture_site_distance_filter;
    use crate::site::Site;

    struct AtOrigin;

    impl Rupture for AtOrigin {
        fn magnitude(&self) -> f64 {
            6.5
        }

        fn distances_to(&self, sites: &SiteCollection) -> Vec<f64> {
            sites.locations().map(|l| l.distance_to(&Location::new(0.0, 0.0))).collect()
        }
    }

    struct ConstantGsim {
        mean: f64,
        stddev: f64,
    }

    impl<R: ?Sized> GroundMotionModel<R> for ConstantGsim {
        fn name(&self) -> &str {
            "ConstantGsim"
        }

        fn mean_and_stddevs(&self, _rupture: &R, sites: &SiteCollection, _imt: &Imt) -> Result<MeanStddevs> {
            Ok(MeanStddevs {
                mean: vec![self.mean; sites.len()],
                inter_event: vec![self.stddev; sites.len()],
                intra_event: vec![self.stddev; sites.len()],
            })
        }
    }

    fn request<'a>(
        sites: &'a SiteCollection,
        imts: &'a [Imt],
        gsim: &'a ConstantGsim,
        truncation_level: Option<f64>,
        seed: u64,
    ) -> GmfRequest<'a, AtOrigin> {
        GmfRequest {
            rupture: &AtOrigin,
            sites,
            imts,
            gsim,
            truncation_level,
            realizations: 50,
            correlation_model: None,
            distance_filter: rupture_site_distance_filter(200.0),
            seed,
        }
    }

    fn sites() -> SiteCollection {
        SiteCollection::new(vec![Site::new(0.0, 0.0), Site::new(10.0, 0.0), Site::new(0.5, 0.5)])
    }

    #[test]
    fn test_zero_truncation_gives_median() {
        let sites = sites();
        let imts = [Imt::Pga];
        let gsim = ConstantGsim { mean: (0.2f64).ln(), stddev: 0.6 };
        let out = StochasticGmfEngine.compute_fields(&request(&sites, &imts, &gsim, Some(0.0), 1)).unwrap();
        let pga = &out["PGA"];
        assert_eq!(pga.dim(), (3, 50));
        for v in pga.row(0) {
            assert!((v - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_far_sites_are_zero() {
        let sites = sites();
        let imts = [Imt::Pga, Imt::sa(1.0)];
        let gsim = ConstantGsim { mean: -1.0, stddev: 0.5 };
        let out = StochasticGmfEngine.compute_fields(&request(&sites, &imts, &gsim, None, 3)).unwrap();
        let sa = &out["SA(1.0)"];
        assert!(sa.row(1).iter().all(|v| *v == 0.0));
        assert!(sa.row(0).iter().all(|v| *v > 0.0));
        assert!(sa.row(2).iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_same_seed_same_fields() {
        let sites = sites();
        let imts = [Imt::Pga];
        let gsim = ConstantGsim { mean: -1.0, stddev: 0.5 };
        let a = StochasticGmfEngine.compute_fields(&request(&sites, &imts, &gsim, Some(3.0), 42)).unwrap();
        let b = StochasticGmfEngine.compute_fields(&request(&sites, &imts, &gsim, Some(3.0), 42)).unwrap();
        let c = StochasticGmfEngine.compute_fields(&request(&sites, &imts, &gsim, Some(3.0), 43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_truncation_bounds_samples() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..10_000 {
            assert!(sample_normal(&mut rng, Some(1.0)).abs() <= 1.0);
        }
    }

    #[test]
    fn test_truncated_samples_follow_normal_shape() {
        // P(|Z| < 0.5 | |Z| < 1) = 0.3829 / 0.6827
        let mut rng = StdRng::seed_from_u64(17);
        let n = 20_000;
        let inner = (0..n)
            .filter(|_| sample_normal(&mut rng, Some(1.0)).abs() < 0.5)
            .count();
        let frac = inner as f64 / n as f64;
        assert!((frac - 0.5609).abs() < 0.02, "{}", frac);
    }

    #[test]
    fn test_tiny_truncation_terminates() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1_000 {
            assert!(sample_normal(&mut rng, Some(1e-9)).abs() <= 1e-9);
        }
    }

    #[test]
    fn test_negative_truncation_is_error() {
        let sites = sites();
        let imts = [Imt::Pga];
        let gsim = ConstantGsim { mean: -1.0, stddev: 0.5 };
        for t in [-1.0, f64::NAN] {
            let req = request(&sites, &imts, &gsim, Some(t), 1);
            assert!(StochasticGmfEngine.compute_fields(&req).is_err());
        }
    }

    #[test]
    fn test_erf_and_quantiles() {
        assert!((erf(0.5) - 0.520_499_877_8).abs() < 1e-9);
        assert!((erf(1.0) - 0.842_700_792_9).abs() < 1e-9);
        assert!((erf(-2.0) + 0.995_322_265_0).abs() < 1e-9);
        assert!((erf(3.5) - 0.999_999_256_9).abs() < 1e-9);
        assert_eq!(erf(0.0), 0.0);
        assert!((inverse_normal_cdf(0.975) - 1.959_964).abs() < 1e-6);
        assert!((inverse_normal_cdf(0.5)).abs() < 1e-12);
        assert!((inverse_normal_cdf(0.001) + 3.090_232).abs() < 1e-5);
    }

    #[test]
    fn test_collection_orders_by_imt_and_sorts_nodes() {
        let sites = SiteCollection::new(vec![Site::new(2.0, 1.0), Site::new(1.0, 3.0), Site::new(1.0, 2.0)]);
        let tags = vec!["rup-0".to_string(), "rup-1".to_string()];
        let mut gmfs = BTreeMap::new();
        gmfs.insert("SA(0.1)".to_string(), Array2::from_elem((3, 2), 0.5));
        gmfs.insert("PGA".to_string(), Array2::from_elem((3, 2), 0.1));
        let fields = GmfCollection::new(&sites, &tags, &gmfs).fields().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].imt, "PGA");
        assert_eq!(fields[1].rupture_tag, "rup-1");
        assert_eq!(fields[2].sa_period, Some(0.1));
        let xs: Vec<(f64, f64)> = fields[0].sorted_nodes().iter().map(|n| (n.location.x(), n.location.y())).collect();
        assert_eq!(xs, vec![(1.0, 2.0), (1.0, 3.0), (2.0, 1.0)]);
    }

    #[test]
    fn test_field_display_sorts_nodes() {
        let field = GroundMotionField {
            imt: "SA".to_string(),
            sa_period: Some(1.0),
            sa_damping: Some(5.0),
            rupture_tag: "rup-7".to_string(),
            nodes: vec![
                GmfNode { gmv: 0.2, location: Location::new(2.0, 0.0) },
                GmfNode { gmv: 0.1, location: Location::new(1.0, 0.0) },
            ],
        };
        assert_eq!(
            field.to_string(),
            "GMF(imt=SA sa_period=1.0 sa_damping=5.0 rupture_id=rup-7\n\
             <X=  1.00000, Y=  0.00000, GMV=0.1000000>\n\
             <X=  2.00000, Y=  0.00000, GMV=0.2000000>)"
        );
    }

    #[test]
    fn test_gmf_set_display() {
        let sites = SiteCollection::new(vec![Site::new(0.5, 0.5)]);
        let tags = vec!["b".to_string(), "a".to_string()];
        let mut gmfs = BTreeMap::new();
        gmfs.insert("PGA".to_string(), Array2::from_elem((1, 2), 0.3));
        let set = GmfCollection::new(&sites, &tags, &gmfs).gmf_set(50.0).unwrap();
        assert_eq!(set.stochastic_event_set_id, 1);
        assert_eq!(
            set.to_string(),
            "GMFsPerSES(investigation_time=50.000000, stochastic_event_set_id=1,\n\
             GMF(imt=PGA sa_period=None sa_damping=None rupture_id=a\n\
             <X=  0.50000, Y=  0.50000, GMV=0.3000000>)\n\
             GMF(imt=PGA sa_period=None sa_damping=None rupture_id=b\n\
             <X=  0.50000, Y=  0.50000, GMV=0.3000000>))"
        );
    }

    #[test]
    fn test_node_display() {
        let node = GmfNode { gmv: 0.25, location: Location::new(1.5, -2.0) };
        assert_eq!(node.to_string(), "<X=  1.50000, Y= -2.00000, GMV=0.2500000>");
    }
}
