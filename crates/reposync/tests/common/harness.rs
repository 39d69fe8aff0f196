//! Test harness for reconcile passes.
//!
//! The `TestHarness` wires a `Reconciler` to:
//! - an in-memory store that can fail status writes on demand
//! - a commit source answering from a script
//! - a resolution pipeline that counts invocations
//! - a resource client that can fail a chosen create call

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use reposync::config::ControllerConfig;
use reposync::controller::{Context, Reconciled, Reconciler};
use reposync::materialize::{
    ApiResource, CreateError, CreatedResource, InMemoryResourceClient, Materializer,
    ResolvedManifest, ResourceClient, StaticDiscovery,
};
use reposync::resource::{
    Param, ParamSpec, SyncKey, SyncRepo, SyncRepoStatus, TriggerBinding,
    TriggerTemplate,
};
use reposync::source::{CommitResponse, CommitSource, CommitSourceError};
use reposync::store::{InMemoryStore, StoreError, SyncStore};
use reposync::sync::RepoCoordinates;
use reposync::template::{
    Extensions, Headers, ResolutionError, ResolutionPipeline, TemplateResolver,
};
use reposync::ReconcileError;

use super::builders::{commit_binding, commit_payload, SyncRepoBuilder, TemplateBuilder};

/// One scripted answer of the commit source.
#[derive(Debug, Clone)]
pub enum Scripted {
    Response(u16, String),
    Unreachable,
}

/// Commit source answering from a script; the last answer repeats.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<(RepoCoordinates, String)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, status: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Response(status, body.to_string()));
    }

    pub fn push_commit(&self, sha: &str) {
        self.push(200, &commit_payload(sha));
    }

    pub fn push_unreachable(&self) {
        self.script.lock().unwrap().push_back(Scripted::Unreachable);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<(RepoCoordinates, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommitSource for ScriptedSource {
    async fn fetch_latest_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<CommitResponse, CommitSourceError> {
        self.requests
            .lock()
            .unwrap()
            .push((repo.clone(), branch.to_string()));

        let next = self.script.lock().unwrap().pop_front();
        let answer = {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = Some(next);
            }
            last.clone()
        };

        match answer {
            Some(Scripted::Response(status, body)) => Ok(CommitResponse::new(status, body)),
            Some(Scripted::Unreachable) => Err(CommitSourceError::Request {
                url: repo.to_string(),
                message: "connection refused".to_string(),
            }),
            None => Err(CommitSourceError::Request {
                url: repo.to_string(),
                message: "no scripted response".to_string(),
            }),
        }
    }
}

/// Template resolver that counts how often each stage runs.
#[derive(Default)]
pub struct CountingPipeline {
    inner: TemplateResolver,
    resolve_calls: AtomicUsize,
    render_calls: AtomicUsize,
}

impl CountingPipeline {
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

impl ResolutionPipeline for CountingPipeline {
    fn resolve_params(
        &self,
        binding_params: &[Param],
        body: &[u8],
        headers: &Headers,
        extensions: &Extensions,
        template_params: &[ParamSpec],
    ) -> Result<Vec<Param>, ResolutionError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .resolve_params(binding_params, body, headers, extensions, template_params)
    }

    fn render(
        &self,
        template: &TriggerTemplate,
        params: &[Param],
    ) -> Result<Vec<Vec<u8>>, ResolutionError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.render(template, params)
    }
}

/// Resource client that can fail one chosen create call.
#[derive(Default)]
pub struct FailingClient {
    pub inner: InMemoryResourceClient,
    calls: AtomicUsize,
    failure: Mutex<Option<(usize, CreateError)>>,
}

impl FailingClient {
    /// Fails the `nth` create call from now (1-based) with `error`, once.
    pub fn fail_on_call(&self, nth: usize, error: CreateError) {
        let target = self.calls.load(Ordering::SeqCst) + nth;
        *self.failure.lock().unwrap() = Some((target, error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<CreatedResource> {
        self.inner.created()
    }
}

#[async_trait]
impl ResourceClient for FailingClient {
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        manifest: &ResolvedManifest,
    ) -> Result<CreatedResource, CreateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut failure = self.failure.lock().unwrap();
            if matches!(&*failure, Some((target, _)) if *target == call) {
                if let Some((_, error)) = failure.take() {
                    return Err(error);
                }
            }
        }
        self.inner.create(resource, namespace, manifest).await
    }
}

/// Store whose status writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    failing_updates: AtomicUsize,
    status_writes: AtomicUsize,
}

impl FlakyStore {
    /// Makes the next `count` status writes fail.
    pub fn fail_next_status_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Number of status writes that went through.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncStore for FlakyStore {
    async fn get_sync_repo(&self, key: &SyncKey) -> Result<SyncRepo, StoreError> {
        self.inner.get_sync_repo(key).await
    }

    async fn get_binding(&self, namespace: &str, name: &str) -> Result<TriggerBinding, StoreError> {
        self.inner.get_binding(namespace, name).await
    }

    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TriggerTemplate, StoreError> {
        self.inner.get_template(namespace, name).await
    }

    async fn update_status(
        &self,
        key: &SyncKey,
        resource_version: Option<&str>,
        status: SyncRepoStatus,
    ) -> Result<SyncRepo, StoreError> {
        let injected = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        let updated = self
            .inner
            .update_status(key, resource_version, status)
            .await?;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

/// A reconciler wired to fakes, seeded with one sync resource.
pub struct TestHarness {
    pub store: Arc<FlakyStore>,
    pub source: Arc<ScriptedSource>,
    pub pipeline: Arc<CountingPipeline>,
    pub client: Arc<FailingClient>,
    pub key: SyncKey,
}

impl TestHarness {
    /// The `widget` sync resource in `default`, rendering one PipelineRun.
    pub fn new() -> Self {
        Self::with_template(TemplateBuilder::new("widget-template").pipeline_run("widget-run-"))
    }

    /// The `widget` sync resource with a custom template.
    pub fn with_template(template: TemplateBuilder) -> Self {
        Self::with_resources(
            SyncRepoBuilder::new("widget").build(),
            commit_binding("default", "widget-binding"),
            template.build(),
        )
    }

    pub fn with_resources(repo: SyncRepo, binding: TriggerBinding, template: TriggerTemplate) -> Self {
        let store = Arc::new(FlakyStore::default());
        let key = repo.key();
        store.inner.apply(repo).unwrap();
        store.inner.apply(binding).unwrap();
        store.inner.apply(template).unwrap();

        Self {
            store,
            source: Arc::new(ScriptedSource::new()),
            pipeline: Arc::new(CountingPipeline::default()),
            client: Arc::new(FailingClient::default()),
            key,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.store.clone(),
            self.source.clone(),
            self.pipeline.clone(),
            Materializer::new(
                Arc::new(StaticDiscovery::with_tekton_defaults()),
                self.client.clone(),
            ),
        )
    }

    pub async fn reconcile(&self) -> Result<Reconciled, ReconcileError> {
        self.reconciler().reconcile(&self.key).await
    }

    /// Controller context with the reconciler configured from `config`.
    pub fn context(&self, config: &ControllerConfig) -> Arc<Context> {
        let reconciler = self
            .reconciler()
            .with_rate_limit_cooldown(config.rate_limit_cooldown)
            .with_target_namespace(config.target_namespace.clone());
        Arc::new(Context::new(reconciler, config))
    }

    pub async fn sync_repo(&self) -> SyncRepo {
        self.store.get_sync_repo(&self.key).await.unwrap()
    }

    pub async fn last_commit(&self) -> String {
        self.sync_repo().await.last_commit().to_string()
    }

    pub fn created(&self) -> Vec<CreatedResource> {
        self.client.created()
    }
}
