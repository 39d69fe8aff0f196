//! Error types reported by a reconcile pass.

use std::path::PathBuf;
use thiserror::Error;

use crate::source::CommitSourceError;
use crate::store::StoreError;

/// Permanent misconfiguration of a sync resource or of the controller itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid frequency '{value}': {reason}")]
    InvalidFrequency { value: String, reason: String },

    #[error("Malformed repository URL '{url}': {reason}")]
    MalformedRepository { url: String, reason: String },

    #[error("Failed to read config file '{path}': {message}")]
    ReadFile { path: PathBuf, message: String },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(String),

    #[error("Config validation failed: {0}")]
    Validation(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseYaml(err.to_string())
    }
}

/// Errors surfaced to the controller runtime, which retries them with backoff.
///
/// Quiet failures (unexpected upstream status, templating, materialization,
/// status persistence) are not errors; they are reported as
/// [`crate::controller::DeferReason`] values instead.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to load {what}: {source}")]
    Load {
        what: String,
        #[source]
        source: StoreError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Commit source unreachable: {0}")]
    Transport(#[from] CommitSourceError),
}

impl ReconcileError {
    pub(crate) fn load(what: impl Into<String>, source: StoreError) -> Self {
        ReconcileError::Load {
            what: what.into(),
            source,
        }
    }

    /// Returns true if retrying cannot succeed until the resource is edited.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ReconcileError::Config(_))
    }

    /// Returns true if the error is likely transient and the pass can be retried.
    pub fn is_retryable(&self) -> bool {
        !self.is_permanent()
    }

    /// Returns true if the sync resource itself no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ReconcileError::Load {
                source: StoreError::NotFound { kind, .. },
                ..
            } if kind == "SyncRepo"
        )
    }

    /// Short machine-readable reason, used for status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Load { .. } => "LoadFailed",
            ReconcileError::Config(ConfigError::InvalidFrequency { .. }) => "InvalidFrequency",
            ReconcileError::Config(ConfigError::MalformedRepository { .. }) => {
                "MalformedRepository"
            }
            ReconcileError::Config(_) => "InvalidConfiguration",
            ReconcileError::Transport(_) => "CommitSourceUnreachable",
        }
    }
}

/// Result type for reconcile operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_permanent() {
        let err = ReconcileError::from(ConfigError::InvalidFrequency {
            value: "soon".to_string(),
            reason: "unknown unit".to_string(),
        });
        assert!(err.is_permanent());
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), "InvalidFrequency");
    }

    #[test]
    fn test_not_found_only_for_sync_repo() {
        let missing_repo = ReconcileError::load(
            "sync repo",
            StoreError::NotFound {
                kind: "SyncRepo".to_string(),
                key: "default/widget".to_string(),
            },
        );
        assert!(missing_repo.is_not_found());
        assert!(missing_repo.is_retryable());

        let missing_binding = ReconcileError::load(
            "trigger binding",
            StoreError::NotFound {
                kind: "TriggerBinding".to_string(),
                key: "default/widget-binding".to_string(),
            },
        );
        assert!(!missing_binding.is_not_found());
    }
}
