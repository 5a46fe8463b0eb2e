//! Digest Configuration
//!
//! A scope is tuned by a small [`DigestConfig`]. It can be built in code or
//! parsed from JSON; any field left out takes its default.
//!
//! ```rust,ignore
//! let config = DigestConfig::from_json(r#"{ "max_iterations": 20 }"#)?;
//! ```

use serde::Deserialize;

use crate::error::ConfigError;

/// Number of scans a digest may run before giving up.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DigestConfig {
    /// Scans allowed per digest before it fails with a convergence error.
    pub max_iterations: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl DigestConfig {
    /// Parse and validate a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Reject settings under which no digest could ever run a scan.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_ten_iterations() {
        assert_eq!(DigestConfig::default().max_iterations, 10);
    }

    #[test]
    fn parses_partial_json() {
        let config = DigestConfig::from_json("{}").unwrap();
        assert_eq!(config, DigestConfig::default());

        let config = DigestConfig::from_json(r#"{ "max_iterations": 3 }"#).unwrap();
        assert_eq!(config.max_iterations, 3);
    }

    #[test]
    fn rejects_zero_iterations() {
        let err = DigestConfig::from_json(r#"{ "max_iterations": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = DigestConfig::from_json(r#"{ "ttl": 3 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
