//! Controller configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const CONFIG_FILE: &str = "/etc/disruption-controller/config";
const ENV_PREFIX: &str = "DISRUPTION";

/// Which notifications start a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// NodeClaims whose Expired condition turned true
    Expiry,
    /// Node events with reason DisruptionBlocked
    Blocked,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Expiry => f.write_str("expiry"),
            TriggerMode::Blocked => f.write_str("blocked"),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Server-side dry run for every patch
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    #[serde(default = "default_trigger_mode")]
    pub trigger_mode: TriggerMode,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Triggers reconciled in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per trigger when the workload lookup fails
    #[serde(default = "default_lookup_retry_attempts")]
    pub lookup_retry_attempts: u32,

    #[serde(default = "default_lookup_retry_backoff_secs")]
    pub lookup_retry_backoff_secs: u64,
}

fn default_dry_run() -> bool {
    true
}

fn default_trigger_mode() -> TriggerMode {
    TriggerMode::Expiry
}

fn default_api_port() -> u16 {
    8080
}

fn default_concurrency() -> usize {
    4
}

fn default_lookup_retry_attempts() -> u32 {
    3
}

fn default_lookup_retry_backoff_secs() -> u64 {
    5
}

impl ControllerConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        Self::from_sources(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_sources(environment: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to read controller configuration")?;

        let config: ControllerConfig = settings
            .try_deserialize()
            .context("Invalid controller configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.lookup_retry_attempts == 0 {
            bail!("lookup_retry_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn lookup_retry_backoff(&self) -> Duration {
        Duration::from_secs(self.lookup_retry_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_sources(env(&[])).unwrap();

        assert!(config.dry_run);
        assert_eq!(config.trigger_mode, TriggerMode::Expiry);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.lookup_retry_attempts, 3);
        assert_eq!(config.lookup_retry_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_environment_overrides() {
        let config = ControllerConfig::from_sources(env(&[
            ("DISRUPTION_DRY_RUN", "false"),
            ("DISRUPTION_TRIGGER_MODE", "blocked"),
            ("DISRUPTION_CONCURRENCY", "8"),
            ("DISRUPTION_LOOKUP_RETRY_ATTEMPTS", "5"),
        ]))
        .unwrap();

        assert!(!config.dry_run);
        assert_eq!(config.trigger_mode, TriggerMode::Blocked);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.lookup_retry_attempts, 5);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let result = ControllerConfig::from_sources(env(&[("DISRUPTION_CONCURRENCY", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let result =
            ControllerConfig::from_sources(env(&[("DISRUPTION_LOOKUP_RETRY_ATTEMPTS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_trigger_mode() {
        let result = ControllerConfig::from_sources(env(&[("DISRUPTION_TRIGGER_MODE", "drift")]));
        assert!(result.is_err());
    }
}
