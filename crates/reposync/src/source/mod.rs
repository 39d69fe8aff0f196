//! Latest-commit lookup against a hosted git API.

pub mod github;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::sync::RepoCoordinates;

pub use github::{CommitSourceSettings, GitHubCommitSource};
pub use types::{CommitInfo, CommitResponse, STATUS_OK, STATUS_RATE_LIMITED};

/// Failures reaching the commit source. HTTP error statuses are not errors.
#[derive(Error, Debug)]
pub enum CommitSourceError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("failed reading response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Returns the latest commit of a branch.
///
/// One outbound call per invocation and no internal retries; retry policy
/// belongs to the reconciler.
#[async_trait]
pub trait CommitSource: Send + Sync {
    async fn fetch_latest_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<CommitResponse, CommitSourceError>;
}
