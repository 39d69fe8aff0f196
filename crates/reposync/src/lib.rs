pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod materialize;
pub mod resource;
pub mod source;
pub mod store;
pub mod sync;
pub mod template;

pub use config::{ControllerConfig, ErrorBackoff, TargetNamespace};
pub use controller::{Context, DeferReason, ReconcileOutcome, Reconciled, Reconciler};
pub use error::{ConfigError, ReconcileError, Result};
pub use logging::{init_tracing, LogFormat};
pub use materialize::{
    ClusterDiscovery, ClusterResourceClient, MaterializeError, Materializer, ResolvedManifest,
};
pub use resource::{SyncKey, SyncRepo, TriggerBinding, TriggerTemplate};
pub use source::{CommitSource, CommitSourceError, GitHubCommitSource};
pub use store::{ClusterStore, StoreError, SyncStore};
pub use template::{ResolutionError, ResolutionPipeline, TemplateResolver};
