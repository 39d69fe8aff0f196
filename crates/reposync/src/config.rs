//! Controller configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::source::CommitSourceSettings;
use crate::sync::frequency::{deserialize_duration, serialize_duration};

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_resync_period() -> Duration {
    Duration::from_secs(10 * 60 * 60)
}

fn default_rate_limit_cooldown() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(5 * 60)
}

/// Where derived resources are created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum TargetNamespace {
    /// The namespace of the sync resource that produced them.
    #[default]
    SyncResource,
    /// Always the same namespace.
    Fixed { namespace: String },
}

impl TargetNamespace {
    /// Returns the namespace for resources derived from a sync resource in `owner`.
    pub fn resolve<'a>(&'a self, owner: &'a str) -> &'a str {
        match self {
            TargetNamespace::SyncResource => owner,
            TargetNamespace::Fixed { namespace } => namespace,
        }
    }
}

/// Per-key exponential backoff for failed reconcile passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBackoff {
    #[serde(
        default = "default_backoff_base",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub base: Duration,

    #[serde(
        default = "default_backoff_max",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub max: Duration,
}

impl Default for ErrorBackoff {
    fn default() -> Self {
        Self {
            base: default_backoff_base(),
            max: default_backoff_max(),
        }
    }
}

impl ErrorBackoff {
    /// Delay before retry number `failures` (1-based), capped at `max`.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Top-level controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Requeue delay after a pass that ended quietly without scheduling one.
    #[serde(
        default = "default_resync_period",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub resync_period: Duration,

    /// Requeue delay after the commit source answered 403.
    #[serde(
        default = "default_rate_limit_cooldown",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub rate_limit_cooldown: Duration,

    #[serde(default)]
    pub error_backoff: ErrorBackoff,

    #[serde(default)]
    pub target_namespace: TargetNamespace,

    #[serde(default)]
    pub commit_source: CommitSourceSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resync_period: default_resync_period(),
            rate_limit_cooldown: default_rate_limit_cooldown(),
            error_backoff: ErrorBackoff::default(),
            target_namespace: TargetNamespace::default(),
            commit_source: CommitSourceSettings::default(),
        }
    }
}

impl ControllerConfig {
    /// Loads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Parses and validates configuration from YAML. An empty document yields defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: ControllerConfig = if content.trim().is_empty() {
            ControllerConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Validation(
                "workers must be greater than zero".to_string(),
            ));
        }
        if self.resync_period.is_zero() {
            return Err(ConfigError::Validation(
                "resyncPeriod must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit_cooldown.is_zero() {
            return Err(ConfigError::Validation(
                "rateLimitCooldown must be greater than zero".to_string(),
            ));
        }
        if self.error_backoff.base.is_zero() || self.error_backoff.base > self.error_backoff.max {
            return Err(ConfigError::Validation(format!(
                "errorBackoff.base must be positive and not exceed errorBackoff.max ({:?} > {:?})",
                self.error_backoff.base, self.error_backoff.max
            )));
        }
        if let TargetNamespace::Fixed { namespace } = &self.target_namespace {
            if namespace.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "targetNamespace.namespace must not be empty".to_string(),
                ));
            }
        }
        if let Some(url) = &self.commit_source.api_base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "commitSource.apiBaseUrl must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }
}
