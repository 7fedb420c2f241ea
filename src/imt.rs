//! Intensity measure types.
//!
//! Labels follow the usual conventions: `PGA`, `PGV`, `PGD`, `IA`, `CAV`,
//! `RSD`, `MMI` and `SA(period)` or `SA(period, damping)`, damping defaulting
//! to 5 percent.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_DAMPING: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Imt {
    Pga,
    Pgv,
    Pgd,
    Sa { period: f64, damping: f64 },
    Ia,
    Cav,
    Rsd,
    Mmi,
}

impl Imt {
    pub fn sa(period: f64) -> Self {
        Imt::Sa {
            period,
            damping: DEFAULT_DAMPING,
        }
    }

    /// Spectral period; `None` for anything but SA.
    pub fn period(&self) -> Option<f64> {
        match self {
            Imt::Sa { period, .. } => Some(*period),
            _ => None,
        }
    }

    pub fn damping(&self) -> Option<f64> {
        match self {
            Imt::Sa { damping, .. } => Some(*damping),
            _ => None,
        }
    }

    /// SA or PGA, the latter being SA at zero period.
    pub fn is_spectral(&self) -> bool {
        matches!(self, Imt::Pga | Imt::Sa { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Imt::Pga => "PGA",
            Imt::Pgv => "PGV",
            Imt::Pgd => "PGD",
            Imt::Sa { .. } => "SA",
            Imt::Ia => "IA",
            Imt::Cav => "CAV",
            Imt::Rsd => "RSD",
            Imt::Mmi => "MMI",
        }
    }
}

/// Render a float for labels and field names: integral values keep one
/// decimal, very small or very large magnitudes use an exponent with at least
/// two digits (`1e-05`, `2.5e+16`).
pub(crate) fn fmt_float(v: f64) -> String {
    if !v.is_finite() {
        return format!("{}", v);
    }
    let mag = v.abs();
    if mag != 0.0 && !(1e-4..1e16).contains(&mag) {
        let sci = format!("{:e}", v);
        if let Some((mantissa, exp)) = sci.split_once('e') {
            if let Ok(exp) = exp.parse::<i32>() {
                let sign = if exp < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exp.abs());
            }
        }
        return sci;
    }
    if v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

impl fmt::Display for Imt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imt::Sa { period, .. } => write!(f, "SA({})", fmt_float(*period)),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Imt {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidImt(s.to_string());
        let label = s.trim();
        match label {
            "PGA" => return Ok(Imt::Pga),
            "PGV" => return Ok(Imt::Pgv),
            "PGD" => return Ok(Imt::Pgd),
            "IA" => return Ok(Imt::Ia),
            "CAV" => return Ok(Imt::Cav),
            "RSD" => return Ok(Imt::Rsd),
            "MMI" => return Ok(Imt::Mmi),
            _ => {}
        }
        let args = label
            .strip_prefix("SA(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let mut parts = args.split(',').map(str::trim);
        let period: f64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let damping: f64 = match parts.next() {
            Some(d) => d.parse().map_err(|_| invalid())?,
            None => DEFAULT_DAMPING,
        };
        if parts.next().is_some() || !period.is_finite() || period < 0.0 {
            return Err(invalid());
        }
        Ok(Imt::Sa { period, damping })
    }
}

/// Spectral IMTs (SA and PGA) among `labels`, sorted by period.
///
/// Returns the labels and the matching periods, PGA having period 0.0.
/// Labels that are neither `PGA` nor start with `SA` are ignored.
pub fn get_imts_periods<I, S>(labels: I) -> Result<(Vec<String>, Vec<f64>), ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut imts = Vec::new();
    for label in labels {
        let label = label.as_ref();
        if label.starts_with("SA") || label == "PGA" {
            imts.push(label.parse::<Imt>()?);
        }
    }
    let period = |imt: &Imt| imt.period().unwrap_or(0.0);
    imts.sort_by(|a, b| period(a).total_cmp(&period(b)));
    let periods = imts.iter().map(period).collect();
    Ok((imts.iter().map(Imt::to_string).collect(), periods))
}
