//! Builders for test resources.

#![allow(dead_code)]

use reposync::resource::{
    in_namespace, Param, ParamSpec, SyncRepo, SyncRepoSpec, TriggerBinding, TriggerBindingSpec,
    TriggerTemplate, TriggerTemplateSpec,
};
use serde_json::{json, Value};

pub const WIDGET_REPO: &str = "https://github.com/acme/widget";

/// Body of a successful "latest commit" response.
pub fn commit_payload(sha: &str) -> String {
    json!({
        "sha": sha,
        "commit": {
            "message": "Bump version",
            "author": {"name": "Ada", "email": "ada@acme.test"}
        }
    })
    .to_string()
}

/// Builder for `SyncRepo` resources.
pub struct SyncRepoBuilder {
    namespace: String,
    name: String,
    spec: SyncRepoSpec,
}

impl SyncRepoBuilder {
    /// Sync resource `name` in `default`, watching `main` of the widget repo every 5m.
    pub fn new(name: &str) -> Self {
        Self {
            namespace: "default".to_string(),
            name: name.to_string(),
            spec: SyncRepoSpec {
                repo: WIDGET_REPO.to_string(),
                branch: "main".to_string(),
                frequency: "5m".to_string(),
                trigger_binding: format!("{}-binding", name),
                trigger_template: format!("{}-template", name),
            },
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn repo(mut self, repo: &str) -> Self {
        self.spec.repo = repo.to_string();
        self
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.spec.branch = branch.to_string();
        self
    }

    pub fn frequency(mut self, frequency: &str) -> Self {
        self.spec.frequency = frequency.to_string();
        self
    }

    pub fn build(self) -> SyncRepo {
        SyncRepo::namespaced(&self.namespace, &self.name, self.spec)
    }
}

/// Binding exposing the commit hash as `revision`.
pub fn commit_binding(namespace: &str, name: &str) -> TriggerBinding {
    in_namespace(
        TriggerBinding::new(
            name,
            TriggerBindingSpec {
                params: vec![Param::new("revision", "$(body.sha)")],
            },
        ),
        namespace,
    )
}

/// Builder for `TriggerTemplate` resources.
pub struct TemplateBuilder {
    namespace: String,
    name: String,
    params: Vec<ParamSpec>,
    resources: Vec<Value>,
}

impl TemplateBuilder {
    /// Template declaring a `revision` param and no resources.
    pub fn new(name: &str) -> Self {
        Self {
            namespace: "default".to_string(),
            name: name.to_string(),
            params: vec![ParamSpec::new("revision")],
            resources: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Adds a PipelineRun that receives the revision.
    pub fn pipeline_run(self, generate_name: &str) -> Self {
        self.resource(json!({
            "apiVersion": "tekton.dev/v1beta1",
            "kind": "PipelineRun",
            "metadata": {"generateName": generate_name},
            "spec": {
                "pipelineRef": {"name": "build"},
                "params": [{"name": "revision", "value": "$(tt.params.revision)"}]
            }
        }))
    }

    pub fn resource(mut self, resource: Value) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn build(self) -> TriggerTemplate {
        in_namespace(
            TriggerTemplate::new(
                &self.name,
                TriggerTemplateSpec {
                    params: self.params,
                    resourcetemplates: self.resources,
                },
            ),
            &self.namespace,
        )
    }
}
