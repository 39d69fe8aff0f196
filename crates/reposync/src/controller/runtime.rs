//! Drives the reconciler from a `kube_runtime::Controller`.
//!
//! The controller watches `SyncRepo` objects and guarantees that passes for
//! the same object never overlap. Scheduling is expressed as an [`Action`]:
//! the reconciler's own requeue delay, the resync period when it has none,
//! or a per-object exponential backoff after an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::{watcher, Controller};
use kube::Api;
use tracing::{debug, info, warn};

use super::outcome::Reconciled;
use super::reconciler::Reconciler;
use crate::config::{ControllerConfig, ErrorBackoff};
use crate::error::{ReconcileError, Result};
use crate::resource::{SyncKey, SyncRepo};

/// Shared state handed to every reconcile call.
pub struct Context {
    reconciler: Reconciler,
    resync_period: Duration,
    backoff: ErrorBackoff,
    failures: Mutex<HashMap<SyncKey, u32>>,
}

impl Context {
    pub fn new(reconciler: Reconciler, config: &ControllerConfig) -> Self {
        Self {
            reconciler,
            resync_period: config.resync_period,
            backoff: config.error_backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Consecutive failed passes of `key`.
    pub fn failures(&self, key: &SyncKey) -> u32 {
        self.failure_counts().get(key).copied().unwrap_or(0)
    }

    /// Next pass after a successful one.
    pub fn action_for(&self, reconciled: &Reconciled) -> Action {
        Action::requeue(reconciled.requeue_after.unwrap_or(self.resync_period))
    }

    /// Runs one pass per key, sequentially, without scheduling follow-ups.
    pub async fn run_once(&self, keys: &[SyncKey]) -> Vec<(SyncKey, Result<Reconciled>)> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let result = self.reconciler.reconcile(key).await;
            results.push((key.clone(), result));
        }
        results
    }

    fn failure_counts(&self) -> MutexGuard<'_, HashMap<SyncKey, u32>> {
        // counters stay usable even if a pass panicked while holding the lock
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_failure(&self, key: &SyncKey) -> u32 {
        let mut failures = self.failure_counts();
        let count = failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    fn forget(&self, key: &SyncKey) {
        self.failure_counts().remove(key);
    }
}

/// Reconcile callback for the controller.
pub async fn reconcile(repo: Arc<SyncRepo>, ctx: Arc<Context>) -> Result<Action> {
    let key = repo.key();
    match ctx.reconciler.reconcile(&key).await {
        Ok(reconciled) => {
            ctx.forget(&key);
            let action = ctx.action_for(&reconciled);
            debug!(%key, "Next pass: {:?}", action);
            Ok(action)
        }
        Err(e) if e.is_not_found() => {
            ctx.reconciler.finalize(&key).await;
            ctx.forget(&key);
            Ok(Action::await_change())
        }
        Err(e) => Err(e),
    }
}

/// Error callback for the controller: capped exponential backoff per object.
pub fn error_policy(repo: Arc<SyncRepo>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    let key = repo.key();
    let failures = ctx.record_failure(&key);
    let delay = ctx.backoff.delay(failures);
    warn!(
        %key,
        permanent = error.is_permanent(),
        failures,
        "Reconcile will be retried in {:?}: {}", delay, error
    );
    Action::requeue(delay)
}

/// Watches `api` and reconciles every `SyncRepo` until SIGINT or SIGTERM.
pub async fn run(api: Api<SyncRepo>, ctx: Arc<Context>, workers: usize) {
    let concurrency = u16::try_from(workers.max(1)).unwrap_or(u16::MAX);
    info!("Starting controller with {} concurrent reconciles", concurrency);

    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!("Reconciled {}", object),
                Err(e) => warn!("Controller error: {}", e),
            }
        })
        .await;

    info!("Controller stopped");
}
