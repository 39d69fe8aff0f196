//! Persisted state of sync resources, bindings and templates.

pub mod cluster;
#[cfg(any(test, feature = "test-utils"))]
pub mod loader;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::resource::{SyncKey, SyncRepo, SyncRepoStatus, TriggerBinding, TriggerTemplate};

pub use cluster::ClusterStore;
#[cfg(any(test, feature = "test-utils"))]
pub use loader::ResourceLoader;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{AnyResource, InMemoryStore};

/// Errors that can occur while reading or writing stored resources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    #[error("conflict updating {key}: {message}")]
    Conflict { key: String, message: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &str, key: &SyncKey) -> Self {
        StoreError::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }
}

/// Declarative object store with optimistic concurrency on status writes.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn get_sync_repo(&self, key: &SyncKey) -> Result<SyncRepo, StoreError>;

    async fn get_binding(&self, namespace: &str, name: &str) -> Result<TriggerBinding, StoreError>;

    async fn get_template(&self, namespace: &str, name: &str)
        -> Result<TriggerTemplate, StoreError>;

    /// Replaces the status if `resource_version` is still current.
    async fn update_status(
        &self,
        key: &SyncKey,
        resource_version: Option<&str>,
        status: SyncRepoStatus,
    ) -> Result<SyncRepo, StoreError>;
}
