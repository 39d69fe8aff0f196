//! Mapping of (apiVersion, kind) to a concrete resource endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::core::GroupVersionKind;
use kube::discovery::{pinned_kind, ApiResource};
use kube::Client;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors raised by resource discovery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Invalid apiVersion '{0}'")]
    InvalidApiVersion(String),

    #[error("No resource of kind '{kind}' served for '{api_version}'")]
    UnknownKind { api_version: String, kind: String },

    #[error("discovery unavailable: {0}")]
    Unavailable(String),
}

/// Finds the resource endpoint for a manifest.
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    async fn find_resource(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ApiResource, DiscoveryError>;
}

/// Splits `group/version` (or a bare core `version`).
pub fn split_api_version(api_version: &str) -> Result<(&str, &str), DiscoveryError> {
    let invalid = || DiscoveryError::InvalidApiVersion(api_version.to_string());
    match api_version.split('/').collect::<Vec<_>>().as_slice() {
        [version] if !version.is_empty() => Ok(("", *version)),
        [group, version] if !group.is_empty() && !version.is_empty() => Ok((*group, *version)),
        _ => Err(invalid()),
    }
}

/// `group/version, Resource=plural`, the way the API server names endpoints.
pub fn describe(resource: &ApiResource) -> String {
    format!("{}, Resource={}", resource.api_version, resource.plural)
}

/// Discovery against the API server, caching every resolved kind.
pub struct ClusterDiscovery {
    client: Client,
    cache: RwLock<HashMap<(String, String), ApiResource>>,
}

impl ClusterDiscovery {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

fn discovery_error(api_version: &str, kind: &str, err: kube::Error) -> DiscoveryError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => DiscoveryError::UnknownKind {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        },
        kube::Error::Discovery(_) => DiscoveryError::UnknownKind {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        },
        other => DiscoveryError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ResourceDiscovery for ClusterDiscovery {
    async fn find_resource(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ApiResource, DiscoveryError> {
        let (group, version) = split_api_version(api_version)?;
        let key = (api_version.to_string(), kind.to_string());
        if let Some(resource) = self.cache.read().await.get(&key) {
            return Ok(resource.clone());
        }

        let gvk = GroupVersionKind::gvk(group, version, kind);
        let (resource, _) = pinned_kind(&self.client, &gvk)
            .await
            .map_err(|e| discovery_error(api_version, kind, e))?;
        debug!("Discovered {}", describe(&resource));

        self.cache.write().await.insert(key, resource.clone());
        Ok(resource)
    }
}

/// Discovery backed by an explicit registry of served kinds.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default, Clone)]
pub struct StaticDiscovery {
    resources: HashMap<(String, String), ApiResource>,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving the Tekton pipeline kinds for `v1beta1` and `v1`.
    pub fn with_tekton_defaults() -> Self {
        let mut discovery = Self::new();
        for version in ["v1beta1", "v1"] {
            for (kind, plural) in [
                ("PipelineRun", "pipelineruns"),
                ("TaskRun", "taskruns"),
                ("Pipeline", "pipelines"),
                ("Task", "tasks"),
            ] {
                discovery.register("tekton.dev", version, kind, plural);
            }
        }
        discovery.register("", "v1", "ConfigMap", "configmaps");
        discovery
    }

    /// Adds or replaces a served resource.
    pub fn register(&mut self, group: &str, version: &str, kind: &str, plural: &str) {
        let resource =
            ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural);
        self.resources
            .insert((resource.api_version.clone(), resource.kind.clone()), resource);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl ResourceDiscovery for StaticDiscovery {
    async fn find_resource(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ApiResource, DiscoveryError> {
        split_api_version(api_version)?;
        self.resources
            .get(&(api_version.to_string(), kind.to_string()))
            .cloned()
            .ok_or_else(|| DiscoveryError::UnknownKind {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })
    }
}
