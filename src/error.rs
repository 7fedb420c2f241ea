//! Configuration errors.
//!
//! Everything else in the crate propagates through `anyhow`; configuration
//! problems get a concrete type so callers can tell them apart with
//! `err.downcast_ref::<ConfigError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The job resolved to zero or several ground-motion models.
    #[error("ambiguous or missing ground-motion model: expected exactly one, found {found}")]
    AmbiguousGsim { found: usize },

    #[error("invalid intensity measure type: {0:?}")]
    InvalidImt(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("cannot read job file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse job file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Unpack a resolution that must yield exactly one ground-motion model.
pub fn exactly_one<T>(items: Vec<T>) -> Result<T, ConfigError> {
    let found = items.len();
    let mut iter = items.into_iter();
    match (iter.next(), iter.next()) {
        (Some(item), None) => Ok(item),
        _ => Err(ConfigError::AmbiguousGsim { found }),
    }
}
