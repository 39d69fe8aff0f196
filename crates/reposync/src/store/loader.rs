//! Loader for YAML resource directories.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use kube::Resource;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::resource::{SyncKey, SyncRepo, TriggerBinding, TriggerTemplate, DEFAULT_NAMESPACE};

use super::{AnyResource, InMemoryStore};

/// Kinds the loader accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceKind {
    SyncRepo,
    TriggerBinding,
    TriggerTemplate,
}

impl ResourceKind {
    fn parse(kind: &str) -> Result<Self, ConfigError> {
        match kind {
            "SyncRepo" => Ok(ResourceKind::SyncRepo),
            "TriggerBinding" => Ok(ResourceKind::TriggerBinding),
            "TriggerTemplate" => Ok(ResourceKind::TriggerTemplate),
            other => Err(ConfigError::Validation(format!(
                "unsupported resource kind '{}'",
                other
            ))),
        }
    }

    fn api_version(self) -> String {
        match self {
            ResourceKind::SyncRepo => SyncRepo::api_version(&()).into_owned(),
            ResourceKind::TriggerBinding => TriggerBinding::api_version(&()).into_owned(),
            ResourceKind::TriggerTemplate => TriggerTemplate::api_version(&()).into_owned(),
        }
    }
}

/// Just enough of a document to decide how to parse it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceHeader {
    #[serde(default)]
    api_version: String,
    kind: String,
    #[serde(default)]
    metadata: HeaderMeta,
}

#[derive(Debug, Default, Deserialize)]
struct HeaderMeta {
    #[serde(default)]
    name: String,
}

/// Reads sync resources, bindings and templates from a directory tree.
///
/// Every `.yaml`/`.yml` file may hold several `---` separated documents.
/// Hidden files and anything under a hidden directory are skipped.
pub struct ResourceLoader {
    root: PathBuf,
}

impl ResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads every resource below the root, in path order.
    pub fn load(&self) -> Result<Vec<AnyResource>, ConfigError> {
        if !self.root.is_dir() {
            return Err(ConfigError::ReadFile {
                path: self.root.clone(),
                message: "not a directory".to_string(),
            });
        }

        let mut resources = Vec::new();
        let mut seen: HashSet<(&'static str, SyncKey)> = HashSet::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || self.is_hidden(path) {
                continue;
            }

            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext != "yaml" && ext != "yml" {
                continue;
            }

            for resource in self.load_file(path)? {
                let key = resource.key();
                if !seen.insert((resource.kind(), key.clone())) {
                    return Err(ConfigError::Validation(format!(
                        "duplicate {} '{}' in {}",
                        resource.kind(),
                        key,
                        path.display()
                    )));
                }
                resources.push(resource);
            }
        }

        log::info!(
            "Loaded {} resources from {}",
            resources.len(),
            self.root.display()
        );
        Ok(resources)
    }

    /// Loads every resource and applies it to `store`.
    pub fn load_into(&self, store: &InMemoryStore) -> Result<usize, ConfigError> {
        let resources = self.load()?;
        let count = resources.len();
        for resource in resources {
            store
                .apply(resource)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        Ok(count)
    }

    fn is_hidden(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|relative| {
                relative.components().any(|c| {
                    c.as_os_str()
                        .to_str()
                        .map(|s| s.starts_with('.'))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// Loads all documents of a single file.
    pub fn load_file(&self, path: &Path) -> Result<Vec<AnyResource>, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        parse_documents(&content).map_err(|e| match e {
            ConfigError::ParseYaml(message) => {
                ConfigError::ParseYaml(format!("{}: {}", path.display(), message))
            }
            ConfigError::Validation(message) => {
                ConfigError::Validation(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }
}

/// Parses a multi-document YAML string into resources.
pub fn parse_documents(content: &str) -> Result<Vec<AnyResource>, ConfigError> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        resources.push(parse_resource(value)?);
    }
    Ok(resources)
}

/// Parses a single resource, checking kind and API version first.
pub fn parse_resource(value: serde_yaml::Value) -> Result<AnyResource, ConfigError> {
    let header: ResourceHeader = serde_yaml::from_value(value.clone())?;

    let kind = ResourceKind::parse(&header.kind)?;
    if header.api_version != kind.api_version() {
        return Err(ConfigError::Validation(format!(
            "{} '{}' has apiVersion '{}', expected '{}'",
            header.kind,
            header.metadata.name,
            header.api_version,
            kind.api_version()
        )));
    }
    if header.metadata.name.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} without metadata.name",
            header.kind
        )));
    }

    let resource = match kind {
        ResourceKind::SyncRepo => AnyResource::SyncRepo(defaulted(serde_yaml::from_value(value)?)),
        ResourceKind::TriggerBinding => {
            AnyResource::TriggerBinding(defaulted(serde_yaml::from_value(value)?))
        }
        ResourceKind::TriggerTemplate => {
            AnyResource::TriggerTemplate(defaulted(serde_yaml::from_value(value)?))
        }
    };
    Ok(resource)
}

fn defaulted<K: Resource>(mut object: K) -> K {
    let meta = object.meta_mut();
    if meta.namespace.is_none() {
        meta.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }
    object
}
