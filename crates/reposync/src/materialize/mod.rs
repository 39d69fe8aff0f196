//! Creation of cluster resources from rendered manifests.

pub mod client;
pub mod discovery;
pub mod manifest;

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

pub use client::{ClusterResourceClient, CreateError, CreatedResource, ResourceClient};
#[cfg(any(test, feature = "test-utils"))]
pub use client::InMemoryResourceClient;
#[cfg(any(test, feature = "test-utils"))]
pub use discovery::StaticDiscovery;
pub use discovery::{ClusterDiscovery, DiscoveryError, ResourceDiscovery};
pub use kube::discovery::ApiResource;
pub use manifest::ResolvedManifest;

/// Why a single manifest could not be created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeFailure {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Create(#[from] CreateError),
}

/// A batch stopped at manifest `index`. Earlier manifests stay created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("manifest #{index} ({kind} {name}) failed: {cause}")]
pub struct MaterializeError {
    pub index: usize,
    pub kind: String,
    pub name: String,
    /// Resources created before the failure; they are not rolled back.
    pub created: Vec<CreatedResource>,
    #[source]
    pub cause: MaterializeFailure,
}

impl MaterializeError {
    /// Returns true when the cluster rejected our credentials or permissions.
    pub fn is_authorization(&self) -> bool {
        matches!(&self.cause, MaterializeFailure::Create(e) if e.is_authorization())
    }
}

/// Turns manifests into create calls against the right endpoints.
#[derive(Clone)]
pub struct Materializer {
    discovery: Arc<dyn ResourceDiscovery>,
    client: Arc<dyn ResourceClient>,
}

impl Materializer {
    pub fn new(discovery: Arc<dyn ResourceDiscovery>, client: Arc<dyn ResourceClient>) -> Self {
        Self { discovery, client }
    }

    /// Creates every manifest in order, stopping at the first failure.
    pub async fn materialize(
        &self,
        manifests: &[ResolvedManifest],
        namespace: &str,
    ) -> Result<Vec<CreatedResource>, MaterializeError> {
        let mut created = Vec::with_capacity(manifests.len());

        for (index, manifest) in manifests.iter().enumerate() {
            let fail = |created: Vec<CreatedResource>, cause: MaterializeFailure| MaterializeError {
                index,
                kind: manifest.kind().to_string(),
                name: manifest.display_name().to_string(),
                created,
                cause,
            };

            let resource = match self
                .discovery
                .find_resource(manifest.api_version(), manifest.kind())
                .await
            {
                Ok(resource) => resource,
                Err(e) => {
                    error!(
                        "couldn't resolve resource for {} {}: {}",
                        manifest.api_version(),
                        manifest.kind(),
                        e
                    );
                    return Err(fail(created, e.into()));
                }
            };

            info!(
                "Generating resource: kind: {}, name: {}",
                discovery::describe(&resource),
                manifest.display_name()
            );

            match self.client.create(&resource, namespace, manifest).await {
                Ok(record) => created.push(record),
                Err(e) => {
                    error!(
                        "couldn't create resource with group version kind {}: {}",
                        discovery::describe(&resource),
                        e
                    );
                    return Err(fail(created, e.into()));
                }
            }
        }

        Ok(created)
    }
}
