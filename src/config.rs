//! Job configuration.
//!
//! A job is a JSON document; every field has a default so partial documents
//! are accepted. A handful of parameters can be overridden from the
//! environment for quick sensitivity runs.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::imt::Imt;
use crate::logging::log_job_loaded;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Integration distance in km.
    pub maximum_distance: f64,
    pub random_seed: u64,
    /// Truncation of the ground-motion residuals, in standard deviations.
    /// `None` means untruncated; zero disables sampling.
    pub truncation_level: Option<f64>,
    pub number_of_ground_motion_fields: usize,
    pub intensity_measure_types: Vec<String>,
    pub intensity_measure_types_and_levels: BTreeMap<String, Vec<f64>>,
    pub gsim: Option<String>,
    pub ground_motion_correlation_model: Option<String>,
    /// Years.
    pub investigation_time: f64,
    pub ses_per_logic_tree_path: u32,
    pub poes: Vec<f64>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            maximum_distance: 200.0,
            random_seed: 42,
            truncation_level: Some(3.0),
            number_of_ground_motion_fields: 1,
            intensity_measure_types: Vec::new(),
            intensity_measure_types_and_levels: BTreeMap::new(),
            gsim: None,
            ground_motion_correlation_model: None,
            investigation_time: 50.0,
            ses_per_logic_tree_path: 1,
            poes: Vec::new(),
        }
    }
}

impl JobConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read, parse and validate a job file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(ConfigError::from)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg = Self::from_json_str(&text)?.with_env_overrides();
        cfg.validate()?;
        log_job_loaded(&path.to_string_lossy(), &cfg.checksum());
        Ok(cfg)
    }

    pub fn with_env_overrides(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok();
        if let Some(v) = var("HAZARD_MAXIMUM_DISTANCE").and_then(|v| v.parse().ok()) {
            self.maximum_distance = v;
        }
        if let Some(v) = var("HAZARD_RANDOM_SEED").and_then(|v| v.parse().ok()) {
            self.random_seed = v;
        }
        if let Some(v) = var("HAZARD_TRUNCATION_LEVEL").and_then(|v| v.parse().ok()) {
            self.truncation_level = Some(v);
        }
        if let Some(v) = var("HAZARD_NUMBER_OF_FIELDS").and_then(|v| v.parse().ok()) {
            self.number_of_ground_motion_fields = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.maximum_distance > 0.0) {
            return Err(ConfigError::invalid("maximum_distance", "must be positive"));
        }
        self.checked_truncation_level()?;
        if self.number_of_ground_motion_fields == 0 {
            return Err(ConfigError::invalid("number_of_ground_motion_fields", "must be at least 1"));
        }
        if !(self.investigation_time > 0.0) {
            return Err(ConfigError::invalid("investigation_time", "must be positive"));
        }
        if self.ses_per_logic_tree_path == 0 {
            return Err(ConfigError::invalid("ses_per_logic_tree_path", "must be at least 1"));
        }
        if let Some(p) = self.poes.iter().find(|p| !(**p > 0.0 && **p <= 1.0)) {
            return Err(ConfigError::invalid("poes", format!("{} is outside (0, 1]", p)));
        }
        for (imt, levels) in &self.intensity_measure_types_and_levels {
            if levels.is_empty() {
                return Err(ConfigError::invalid(
                    "intensity_measure_types_and_levels",
                    format!("no levels for {}", imt),
                ));
            }
        }
        self.imts()?;
        Ok(())
    }

    /// The truncation level, rejected unless absent or finite and
    /// non-negative.
    pub fn checked_truncation_level(&self) -> Result<Option<f64>, ConfigError> {
        match self.truncation_level {
            Some(t) if !(t.is_finite() && t >= 0.0) => Err(ConfigError::invalid(
                "truncation_level",
                format!("{} is not a finite non-negative number", t),
            )),
            level => Ok(level),
        }
    }

    /// Parsed IMTs sorted by label. The keys of
    /// `intensity_measure_types_and_levels` win over `intensity_measure_types`.
    pub fn imts(&self) -> Result<Vec<Imt>, ConfigError> {
        let mut labels: Vec<&String> = if self.intensity_measure_types_and_levels.is_empty() {
            self.intensity_measure_types.iter().collect()
        } else {
            self.intensity_measure_types_and_levels.keys().collect()
        };
        labels.sort();
        labels.dedup();
        labels.into_iter().map(|l| l.parse()).collect()
    }

    /// Time span covered by the stochastic event sets, in years.
    pub fn ses_duration(&self) -> f64 {
        self.investigation_time * self.ses_per_logic_tree_path as f64
    }

    /// SHA-256 of the canonical JSON form.
    pub fn checksum(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let cfg = JobConfig::from_json_str(r#"{"random_seed": 7, "intensity_measure_types": ["PGA"]}"#).unwrap();
        assert_eq!(cfg.random_seed, 7);
        assert_eq!(cfg.maximum_distance, 200.0);
        assert_eq!(cfg.truncation_level, Some(3.0));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_imts_prefer_levels_and_sort() {
        let cfg = JobConfig::from_json_str(
            r#"{"intensity_measure_types": ["PGV"],
                "intensity_measure_types_and_levels": {"SA(0.5)": [0.1], "PGA": [0.1, 0.2]}}"#,
        )
        .unwrap();
        let imts: Vec<String> = cfg.imts().unwrap().iter().map(|i| i.to_string()).collect();
        assert_eq!(imts, vec!["PGA", "SA(0.5)"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = JobConfig::default();
        cfg.poes = vec![0.1, 1.5];
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue { .. })));

        let mut cfg = JobConfig::default();
        cfg.intensity_measure_types = vec!["SA(bad)".to_string()];
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidImt(_))));

        let mut cfg = JobConfig::default();
        cfg.maximum_distance = 0.0;
        assert!(cfg.validate().is_err());

        for t in [-1.0, f64::INFINITY, f64::NAN] {
            let mut cfg = JobConfig::default();
            cfg.truncation_level = Some(t);
            assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue { .. })), "{}", t);
        }
    }

    #[test]
    fn test_checked_truncation_level() {
        let mut cfg = JobConfig::default();
        assert_eq!(cfg.checked_truncation_level().unwrap(), Some(3.0));
        cfg.truncation_level = None;
        assert_eq!(cfg.checked_truncation_level().unwrap(), None);
        cfg.truncation_level = Some(0.0);
        assert_eq!(cfg.checked_truncation_level().unwrap(), Some(0.0));
        cfg.truncation_level = Some(-0.5);
        assert!(cfg.checked_truncation_level().is_err());
    }

    #[test]
    fn test_ses_duration() {
        let cfg = JobConfig {
            investigation_time: 50.0,
            ses_per_logic_tree_path: 20,
            ..JobConfig::default()
        };
        assert_eq!(cfg.ses_duration(), 1000.0);
    }

    #[test]
    fn test_checksum_is_stable_and_sensitive() {
        let a = JobConfig::default();
        let mut b = JobConfig::default();
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);
        b.random_seed += 1;
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, r#"{"intensity_measure_types_and_levels": {"PGA": [0.1, 0.2]}, "poes": [0.1]}"#)
            .unwrap();
        let cfg = JobConfig::load(&path).unwrap();
        assert_eq!(cfg.poes, vec![0.1]);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = JobConfig::load(Path::new("/nonexistent/job.json")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Io(_))));
    }
}
