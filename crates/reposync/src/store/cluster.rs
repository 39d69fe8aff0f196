//! [`SyncStore`] backed by the Kubernetes API server.

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;

use crate::resource::{SyncKey, SyncRepo, SyncRepoStatus, TriggerBinding, TriggerTemplate};

use super::{StoreError, SyncStore};

/// Reads resources through typed `Api` handles and writes the status
/// subresource of `SyncRepo`.
#[derive(Clone)]
pub struct ClusterStore {
    client: Client,
}

impl ClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Maps an API error for `kind` at `key` onto a store error.
pub(crate) fn store_error(kind: &str, key: &SyncKey, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::not_found(kind, key),
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict {
            key: key.to_string(),
            message: resp.message,
        },
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Status merge patch. A `resourceVersion` turns it into a conditional write.
pub(crate) fn status_patch(
    resource_version: Option<&str>,
    status: &SyncRepoStatus,
) -> serde_json::Value {
    match resource_version {
        Some(version) => json!({
            "metadata": { "resourceVersion": version },
            "status": status,
        }),
        None => json!({ "status": status }),
    }
}

#[async_trait]
impl SyncStore for ClusterStore {
    async fn get_sync_repo(&self, key: &SyncKey) -> Result<SyncRepo, StoreError> {
        Api::<SyncRepo>::namespaced(self.client.clone(), &key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| store_error("SyncRepo", key, e))
    }

    async fn get_binding(&self, namespace: &str, name: &str) -> Result<TriggerBinding, StoreError> {
        let key = SyncKey::new(namespace, name);
        Api::<TriggerBinding>::namespaced(self.client.clone(), namespace)
            .get(name)
            .await
            .map_err(|e| store_error("TriggerBinding", &key, e))
    }

    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TriggerTemplate, StoreError> {
        let key = SyncKey::new(namespace, name);
        Api::<TriggerTemplate>::namespaced(self.client.clone(), namespace)
            .get(name)
            .await
            .map_err(|e| store_error("TriggerTemplate", &key, e))
    }

    async fn update_status(
        &self,
        key: &SyncKey,
        resource_version: Option<&str>,
        status: SyncRepoStatus,
    ) -> Result<SyncRepo, StoreError> {
        let patch = status_patch(resource_version, &status);
        Api::<SyncRepo>::namespaced(self.client.clone(), &key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| store_error("SyncRepo", key, e))
    }
}
