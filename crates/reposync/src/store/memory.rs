//! In-process [`SyncStore`] used by tests and fixture runs.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use kube::ResourceExt;

use crate::resource::{
    SyncKey, SyncRepo, SyncRepoStatus, TriggerBinding, TriggerTemplate, DEFAULT_NAMESPACE,
};

use super::{StoreError, SyncStore};

/// Any resource the store holds.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyResource {
    SyncRepo(SyncRepo),
    TriggerBinding(TriggerBinding),
    TriggerTemplate(TriggerTemplate),
}

impl AnyResource {
    pub fn kind(&self) -> &'static str {
        match self {
            AnyResource::SyncRepo(_) => "SyncRepo",
            AnyResource::TriggerBinding(_) => "TriggerBinding",
            AnyResource::TriggerTemplate(_) => "TriggerTemplate",
        }
    }

    pub fn key(&self) -> SyncKey {
        match self {
            AnyResource::SyncRepo(r) => SyncKey::of(r),
            AnyResource::TriggerBinding(r) => SyncKey::of(r),
            AnyResource::TriggerTemplate(r) => SyncKey::of(r),
        }
    }
}

impl From<SyncRepo> for AnyResource {
    fn from(repo: SyncRepo) -> Self {
        AnyResource::SyncRepo(repo)
    }
}

impl From<TriggerBinding> for AnyResource {
    fn from(binding: TriggerBinding) -> Self {
        AnyResource::TriggerBinding(binding)
    }
}

impl From<TriggerTemplate> for AnyResource {
    fn from(template: TriggerTemplate) -> Self {
        AnyResource::TriggerTemplate(template)
    }
}

#[derive(Default)]
struct Objects {
    sync_repos: HashMap<SyncKey, SyncRepo>,
    bindings: HashMap<SyncKey, TriggerBinding>,
    templates: HashMap<SyncKey, TriggerTemplate>,
    next_version: u64,
}

impl Objects {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// Store that keeps every object in memory and bumps a resourceVersion on
/// every write, like the API server does.
#[derive(Default)]
pub struct InMemoryStore {
    objects: RwLock<Objects>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Objects>, StoreError> {
        self.objects
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Objects>, StoreError> {
        self.objects
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    /// Creates or replaces a resource. An existing sync resource keeps its status.
    pub fn apply(&self, resource: impl Into<AnyResource>) -> Result<(), StoreError> {
        let mut resource = resource.into();
        let key = resource.key();
        let mut objects = self.write()?;
        let version = objects.bump();
        match &mut resource {
            AnyResource::SyncRepo(repo) => {
                if let Some(existing) = objects.sync_repos.get(&key) {
                    repo.status = existing.status.clone();
                }
                stamp(repo, version);
                objects.sync_repos.insert(key, repo.clone());
            }
            AnyResource::TriggerBinding(binding) => {
                stamp(binding, version);
                objects.bindings.insert(key, binding.clone());
            }
            AnyResource::TriggerTemplate(template) => {
                stamp(template, version);
                objects.templates.insert(key, template.clone());
            }
        }
        Ok(())
    }

    /// Removes a sync resource.
    pub fn delete_sync_repo(&self, key: &SyncKey) -> Result<SyncRepo, StoreError> {
        self.write()?
            .sync_repos
            .remove(key)
            .ok_or_else(|| StoreError::not_found("SyncRepo", key))
    }

    /// Returns all stored sync resources, sorted by key.
    pub fn sync_repos(&self) -> Vec<SyncRepo> {
        let mut repos: Vec<SyncRepo> = self
            .read()
            .map(|objects| objects.sync_repos.values().cloned().collect())
            .unwrap_or_default();
        repos.sort_by_key(SyncRepo::key);
        repos
    }
}

fn stamp<K: kube::Resource>(object: &mut K, version: String) {
    let meta = object.meta_mut();
    if meta.namespace.is_none() {
        meta.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }
    meta.resource_version = Some(version);
}

#[async_trait]
impl SyncStore for InMemoryStore {
    async fn get_sync_repo(&self, key: &SyncKey) -> Result<SyncRepo, StoreError> {
        self.read()?
            .sync_repos
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("SyncRepo", key))
    }

    async fn get_binding(&self, namespace: &str, name: &str) -> Result<TriggerBinding, StoreError> {
        let key = SyncKey::new(namespace, name);
        self.read()?
            .bindings
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("TriggerBinding", &key))
    }

    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TriggerTemplate, StoreError> {
        let key = SyncKey::new(namespace, name);
        self.read()?
            .templates
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("TriggerTemplate", &key))
    }

    async fn update_status(
        &self,
        key: &SyncKey,
        resource_version: Option<&str>,
        status: SyncRepoStatus,
    ) -> Result<SyncRepo, StoreError> {
        let mut objects = self.write()?;
        let version = objects.bump();
        let repo = objects
            .sync_repos
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found("SyncRepo", key))?;

        if let Some(expected) = resource_version {
            if repo.resource_version().as_deref() != Some(expected) {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    message: format!(
                        "expected resourceVersion {}, found {}",
                        expected,
                        repo.resource_version().unwrap_or_default()
                    ),
                });
            }
        }

        repo.status = Some(status);
        repo.metadata.resource_version = Some(version);
        Ok(repo.clone())
    }
}
