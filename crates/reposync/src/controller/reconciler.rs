//! Sync reconciler: fetch → compare → materialize → record.
//!
//! One pass per sync resource. The stored `lastCommit` is the only state used
//! for change detection, and it is written strictly after every derived
//! resource has been created. A failure in between leaves it untouched, so
//! the next pass materializes the same commit again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::field::Empty;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::outcome::{DeferReason, ReconcileOutcome, Reconciled};
use crate::config::TargetNamespace;
use crate::error::{ConfigError, ReconcileError, Result};
use crate::materialize::{Materializer, ResolvedManifest};
use crate::resource::{Condition, ConditionStatus, SyncKey, SyncRepo};
use crate::source::{CommitInfo, CommitSource};
use crate::store::SyncStore;
use crate::sync::{parse_frequency, RepoCoordinates};
use crate::template::{Extensions, Headers, ResolutionPipeline};

/// Default cooldown after the commit source reports rate limiting.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Reconciles sync resources against the latest commit of their branch.
pub struct Reconciler {
    store: Arc<dyn SyncStore>,
    commits: Arc<dyn CommitSource>,
    pipeline: Arc<dyn ResolutionPipeline>,
    materializer: Materializer,
    target_namespace: TargetNamespace,
    rate_limit_cooldown: Duration,
}

impl Reconciler {
    /// Creates a reconciler that places derived resources next to their sync resource.
    pub fn new(
        store: Arc<dyn SyncStore>,
        commits: Arc<dyn CommitSource>,
        pipeline: Arc<dyn ResolutionPipeline>,
        materializer: Materializer,
    ) -> Self {
        Self {
            store,
            commits,
            pipeline,
            materializer,
            target_namespace: TargetNamespace::default(),
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
        }
    }

    pub fn with_target_namespace(mut self, target_namespace: TargetNamespace) -> Self {
        self.target_namespace = target_namespace;
        self
    }

    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    /// Runs one reconcile pass for `key`.
    ///
    /// Quiet failures come back as [`ReconcileOutcome::Deferred`]; only load,
    /// configuration and transport failures are errors.
    pub async fn reconcile(&self, key: &SyncKey) -> Result<Reconciled> {
        let span = info_span!(
            "reconcile",
            namespace = %key.namespace,
            name = %key.name,
            commit = Empty,
            outcome = Empty,
        );

        async move {
            let result = self.run(key).await;
            match &result {
                Ok(reconciled) => {
                    Span::current().record("outcome", reconciled.outcome.label());
                    debug!(requeue_after = ?reconciled.requeue_after, "Reconcile finished");
                }
                Err(e) => error!(reason = e.reason(), "Reconcile failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Called once a sync resource is gone. Derived resources are kept.
    pub async fn finalize(&self, key: &SyncKey) {
        info!(%key, "Sync resource removed, leaving derived resources in place");
    }

    async fn run(&self, key: &SyncKey) -> Result<Reconciled> {
        let repo = self
            .store
            .get_sync_repo(key)
            .await
            .map_err(|e| ReconcileError::load("sync repo", e))?;
        let binding = self
            .store
            .get_binding(&key.namespace, &repo.spec.trigger_binding)
            .await
            .map_err(|e| ReconcileError::load("trigger binding", e))?;
        let template = self
            .store
            .get_template(&key.namespace, &repo.spec.trigger_template)
            .await
            .map_err(|e| ReconcileError::load("trigger template", e))?;

        let frequency = match parse_frequency(&repo.spec.frequency) {
            Ok(frequency) => frequency,
            Err(e) => return Err(self.fail_config(&repo, e).await),
        };
        let coordinates = match RepoCoordinates::parse(&repo.spec.repo) {
            Ok(coordinates) => coordinates,
            Err(e) => return Err(self.fail_config(&repo, e).await),
        };

        let response = self
            .commits
            .fetch_latest_commit(&coordinates, &repo.spec.branch)
            .await?;

        if response.is_rate_limited() {
            warn!(
                "Rate limited by {}, retrying in {:?}",
                coordinates.host, self.rate_limit_cooldown
            );
            return Ok(Reconciled::requeue(
                ReconcileOutcome::RateLimited,
                self.rate_limit_cooldown,
            ));
        }
        if !response.is_ok() {
            return Ok(self
                .defer(&repo, DeferReason::UnexpectedStatus(response.status))
                .await);
        }

        let commit = match CommitInfo::from_payload(&response.body) {
            Ok(commit) => commit,
            Err(e) => return Ok(self.defer(&repo, DeferReason::InvalidPayload(e)).await),
        };
        Span::current().record("commit", commit.sha.as_str());

        if !repo.last_commit().is_empty() && repo.last_commit() == commit.sha {
            debug!("No new commit on {}", repo.spec.branch);
            if !repo.observed().is_ready() {
                // An earlier deferral left Ready behind; the recorded commit is still current.
                self.record_condition(
                    &repo,
                    Condition::ready(
                        ConditionStatus::True,
                        "Synced",
                        format!("Commit {} is in sync", commit.sha),
                    ),
                )
                .await;
            }
            return Ok(Reconciled::requeue(
                ReconcileOutcome::Unchanged { commit: commit.sha },
                frequency,
            ));
        }
        info!(
            previous = %repo.last_commit(),
            "New commit on {} of {}", repo.spec.branch, coordinates
        );

        let params = match self.pipeline.resolve_params(
            &binding.spec.params,
            &response.body,
            &Headers::new(),
            &Extensions::new(),
            &template.spec.params,
        ) {
            Ok(params) => params,
            Err(e) => return Ok(self.defer(&repo, DeferReason::Resolution(e)).await),
        };
        let rendered = match self.pipeline.render(&template, &params) {
            Ok(rendered) => rendered,
            Err(e) => return Ok(self.defer(&repo, DeferReason::Resolution(e)).await),
        };

        let mut manifests = Vec::with_capacity(rendered.len());
        for (index, bytes) in rendered.iter().enumerate() {
            match ResolvedManifest::from_slice(bytes) {
                Ok(manifest) => manifests.push(manifest),
                Err(reason) => {
                    return Ok(self
                        .defer(&repo, DeferReason::InvalidManifest { index, reason })
                        .await)
                }
            }
        }

        let namespace = self.target_namespace.resolve(&key.namespace);
        let created = match self.materializer.materialize(&manifests, namespace).await {
            Ok(created) => created,
            Err(e) => {
                let authorization = e.is_authorization();
                let reason = DeferReason::Materialization {
                    index: e.index,
                    authorization,
                    message: e.cause.to_string(),
                    created: e.created,
                };
                return Ok(self.defer(&repo, reason).await);
            }
        };

        let mut status = repo.observed();
        status.last_commit = commit.sha.clone();
        status.last_sync_time = Some(Utc::now());
        status.set_condition(Condition::ready(
            ConditionStatus::True,
            "Synced",
            format!(
                "Created {} resources for commit {}",
                created.len(),
                commit.sha
            ),
        ));
        if let Err(e) = self
            .store
            .update_status(key, repo.metadata.resource_version.as_deref(), status)
            .await
        {
            // The commit stays unobserved, so the next pass creates everything again.
            error!("Failed to record commit {}: {}", commit.sha, e);
            return Ok(Reconciled::deferred(DeferReason::StatusPersist(e)));
        }

        info!(
            created = created.len(),
            "Synced commit {} into namespace {}", commit.sha, namespace
        );
        Ok(Reconciled::requeue(
            ReconcileOutcome::Materialized {
                commit: commit.sha,
                created,
            },
            frequency,
        ))
    }

    async fn defer(&self, repo: &SyncRepo, reason: DeferReason) -> Reconciled {
        warn!(reason = reason.reason(), "Sync deferred: {}", reason);
        self.record_condition(
            repo,
            Condition::ready(ConditionStatus::False, reason.reason(), reason.to_string()),
        )
        .await;
        Reconciled::deferred(reason)
    }

    async fn fail_config(&self, repo: &SyncRepo, error: ConfigError) -> ReconcileError {
        let error = ReconcileError::from(error);
        self.record_condition(
            repo,
            Condition::ready(ConditionStatus::False, error.reason(), error.to_string()),
        )
        .await;
        error
    }

    /// Writes `condition` unless the same state is already recorded.
    async fn record_condition(&self, repo: &SyncRepo, condition: Condition) {
        let mut status = repo.observed();
        if !status.set_condition(condition) {
            return;
        }
        if let Err(e) = self
            .store
            .update_status(&repo.key(), repo.metadata.resource_version.as_deref(), status)
            .await
        {
            warn!("Failed to record Ready condition: {}", e);
        }
    }
}
