//! Reconcile controller and the runtime that schedules it.

pub mod outcome;
pub mod reconciler;
pub mod runtime;

pub use outcome::{DeferReason, ReconcileOutcome, Reconciled};
pub use reconciler::{Reconciler, DEFAULT_RATE_LIMIT_COOLDOWN};
pub use runtime::{error_policy, reconcile, Context};
