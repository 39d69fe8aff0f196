//! Outcomes of a single reconcile pass.

use std::time::Duration;

use thiserror::Error;

use crate::materialize::CreatedResource;
use crate::store::StoreError;
use crate::template::ResolutionError;

/// Why a pass ended quietly, without reporting an error upward.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeferReason {
    #[error("commit source answered HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("commit payload unusable: {0}")]
    InvalidPayload(String),

    #[error("resolution failed: {0}")]
    Resolution(ResolutionError),

    #[error("rendered manifest #{index} is invalid: {reason}")]
    InvalidManifest { index: usize, reason: String },

    #[error("creating manifest #{index} failed after {} created: {message}", created.len())]
    Materialization {
        index: usize,
        created: Vec<CreatedResource>,
        authorization: bool,
        message: String,
    },

    #[error("persisting status failed: {0}")]
    StatusPersist(StoreError),
}

impl DeferReason {
    /// Short machine-readable reason, used for status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            DeferReason::UnexpectedStatus(_) => "UnexpectedStatus",
            DeferReason::InvalidPayload(_) => "InvalidPayload",
            DeferReason::Resolution(_) => "ResolutionFailed",
            DeferReason::InvalidManifest { .. } => "InvalidManifest",
            DeferReason::Materialization {
                authorization: true,
                ..
            } => "Unauthorized",
            DeferReason::Materialization { .. } => "MaterializationFailed",
            DeferReason::StatusPersist(_) => "StatusPersistFailed",
        }
    }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The fetched commit matches the last observed one.
    Unchanged { commit: String },
    /// The commit source is throttling us.
    RateLimited,
    /// Every derived resource was created and the commit recorded.
    Materialized {
        commit: String,
        created: Vec<CreatedResource>,
    },
    /// The pass ended early; the outer default resync will retry.
    Deferred(DeferReason),
}

impl ReconcileOutcome {
    /// Label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Unchanged { .. } => "unchanged",
            ReconcileOutcome::RateLimited => "rate_limited",
            ReconcileOutcome::Materialized { .. } => "materialized",
            ReconcileOutcome::Deferred(_) => "deferred",
        }
    }
}

/// Result of a successful pass: what happened and when to come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: ReconcileOutcome,
    /// Explicit requeue delay; `None` leaves scheduling to the runtime default.
    pub requeue_after: Option<Duration>,
}

impl Reconciled {
    pub fn requeue(outcome: ReconcileOutcome, after: Duration) -> Self {
        Self {
            outcome,
            requeue_after: Some(after),
        }
    }

    pub fn deferred(reason: DeferReason) -> Self {
        Self {
            outcome: ReconcileOutcome::Deferred(reason),
            requeue_after: None,
        }
    }
}
