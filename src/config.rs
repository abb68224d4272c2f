//! Engine configuration
//!
//! Defaults can be overridden from the environment:
//!
//! ```bash
//! # Name the root value `root` instead of `$`
//! export RELSET_ROOT=root
//!
//! # Let more updates queue before senders wait
//! export RELSET_QUEUE_DEPTH=256
//! ```
//!
//! or from a TOML document with the same field names.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROOT_NAME: &str = "$";
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name the root value is bound under when expressions are evaluated
    pub root_name: String,
    /// Capacity of the engine's command channel
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.to_string(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RELSET_ROOT` and `RELSET_QUEUE_DEPTH`
    ///
    /// Unset, empty or unparsable variables keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let root_name = std::env::var("RELSET_ROOT")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.root_name);
        let queue_depth = std::env::var("RELSET_QUEUE_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.queue_depth);
        Self {
            root_name,
            queue_depth,
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_name.is_empty() {
            bail!("root_name must not be empty");
        }
        if self.queue_depth == 0 {
            bail!("queue_depth must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.root_name, "$");
        assert_eq!(config.queue_depth, 64);
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str("root_name = \"db\"\nqueue_depth = 8\n").unwrap();
        assert_eq!(config.root_name, "db");
        assert_eq!(config.queue_depth, 8);

        let partial = EngineConfig::from_toml_str("queue_depth = 2").unwrap();
        assert_eq!(partial.root_name, "$");
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(EngineConfig::from_toml_str("queue_depth = 0").is_err());
        assert!(EngineConfig::from_toml_str("root_name = \"\"").is_err());
        assert!(EngineConfig::from_toml_str("queue_depth = \"many\"").is_err());
    }

    #[test]
    fn test_from_env_falls_back() {
        // Only asserts the invariants that hold whatever the environment holds
        let config = EngineConfig::from_env();
        assert!(!config.root_name.is_empty());
        assert!(config.queue_depth > 0);
    }
}
