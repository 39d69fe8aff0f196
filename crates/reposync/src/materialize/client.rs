//! Generic create-by-manifest client.

use async_trait::async_trait;
use kube::api::{DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::{Api, Client, ResourceExt};
use thiserror::Error;

use super::manifest::ResolvedManifest;

#[cfg(any(test, feature = "test-utils"))]
const GENERATED_SUFFIX_LEN: usize = 5;

/// Errors returned by the cluster when creating a resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Other(String),
}

impl CreateError {
    /// Returns true for authentication and authorization failures.
    pub fn is_authorization(&self) -> bool {
        matches!(self, CreateError::Unauthorized(_) | CreateError::Forbidden(_))
    }
}

impl From<kube::Error> for CreateError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 401 => CreateError::Unauthorized(resp.message),
            kube::Error::Api(resp) if resp.code == 403 => CreateError::Forbidden(resp.message),
            other => CreateError::Other(other.to_string()),
        }
    }
}

/// A resource that was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    /// Final name, with any generated suffix applied.
    pub name: String,
}

impl CreatedResource {
    pub fn new(resource: &ApiResource, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
            namespace: namespace.to_string(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for CreatedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {}/{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

/// Creates resources in the cluster.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        manifest: &ResolvedManifest,
    ) -> Result<CreatedResource, CreateError>;
}

/// Client that posts manifests as dynamic objects.
///
/// `generateName` is resolved by the API server.
#[derive(Clone)]
pub struct ClusterResourceClient {
    client: Client,
}

impl ClusterResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceClient for ClusterResourceClient {
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        manifest: &ResolvedManifest,
    ) -> Result<CreatedResource, CreateError> {
        let object: DynamicObject =
            serde_json::from_value(serde_json::Value::Object(manifest.with_namespace(namespace)))
                .map_err(|e| CreateError::Other(format!("invalid manifest: {}", e)))?;

        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, resource);
        let created = api.create(&PostParams::default(), &object).await?;
        Ok(CreatedResource::new(resource, namespace, created.name_any()))
    }
}

/// Appends a random lowercase alphanumeric suffix to a generate-name hint.
#[cfg(any(test, feature = "test-utils"))]
pub fn generate_name(prefix: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GENERATED_SUFFIX_LEN)
        .collect();
    format!("{}{}", prefix, suffix)
}

#[cfg(any(test, feature = "test-utils"))]
type StoredObject = serde_json::Map<String, serde_json::Value>;

/// Client that keeps created objects in memory.
///
/// Names are unique per (kind, namespace), like in the API server.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct InMemoryResourceClient {
    created: std::sync::Mutex<Vec<(CreatedResource, StoredObject)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl InMemoryResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every resource created so far, in creation order.
    pub fn created(&self) -> Vec<CreatedResource> {
        self.created
            .lock()
            .map(|created| created.iter().map(|(c, _)| c.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the stored object for a created resource.
    pub fn object(&self, namespace: &str, name: &str) -> Option<StoredObject> {
        self.created.lock().ok().and_then(|created| {
            created
                .iter()
                .find(|(c, _)| c.namespace == namespace && c.name == name)
                .map(|(_, object)| object.clone())
        })
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl ResourceClient for InMemoryResourceClient {
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        manifest: &ResolvedManifest,
    ) -> Result<CreatedResource, CreateError> {
        let name = match manifest.name() {
            "" => generate_name(manifest.generate_name()),
            name => name.to_string(),
        };
        let record = CreatedResource::new(resource, namespace, name);

        let mut created = self
            .created
            .lock()
            .map_err(|_| CreateError::Other("resource store poisoned".to_string()))?;
        if created.iter().any(|(c, _)| {
            c.api_version == record.api_version
                && c.kind == record.kind
                && c.namespace == record.namespace
                && c.name == record.name
        }) {
            return Err(CreateError::Other(format!(
                "{} \"{}\" already exists",
                resource.plural, record.name
            )));
        }

        let mut object = manifest.with_namespace(namespace);
        if let Some(serde_json::Value::Object(meta)) = object.get_mut("metadata") {
            meta.insert(
                "name".to_string(),
                serde_json::Value::String(record.name.clone()),
            );
        }

        created.push((record.clone(), object));
        Ok(record)
    }
}
