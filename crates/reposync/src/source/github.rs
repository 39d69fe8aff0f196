//! Commit source backed by the GitHub REST API.
//!
//! Issues `GET https://api.<host>/repos/{owner}/{name}/commits/{branch}` and
//! hands back the raw status and body. Rate limiting (HTTP 403) is the
//! reconciler's concern, not this client's.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::types::CommitResponse;
use super::{CommitSource, CommitSourceError};
use crate::sync::frequency::{deserialize_duration, serialize_duration};
use crate::sync::RepoCoordinates;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("reposync/{}", env!("CARGO_PKG_VERSION"))
}

/// Commit source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSourceSettings {
    /// Overrides `https://api.<host>`, e.g. for GitHub Enterprise.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Environment variable holding an API token.
    #[serde(default)]
    pub token_env_var: Option<String>,

    /// File holding an API token; takes priority over `token_env_var`.
    #[serde(default)]
    pub token_file: Option<String>,

    /// Upper bound on a single commit query.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub request_timeout: Duration,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CommitSourceSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            token_env_var: None,
            token_file: None,
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl CommitSourceSettings {
    /// Reads the API token from the configured file or environment variable.
    pub fn resolve_token(&self) -> Result<Option<SecretString>, CommitSourceError> {
        if let Some(path) = &self.token_file {
            let token = std::fs::read_to_string(path).map_err(|e| {
                CommitSourceError::Client(format!("failed to read token file '{}': {}", path, e))
            })?;
            return Ok(Some(SecretString::from(token.trim().to_string())));
        }

        if let Some(name) = &self.token_env_var {
            return match std::env::var(name) {
                Ok(token) if !token.trim().is_empty() => {
                    Ok(Some(SecretString::from(token.trim().to_string())))
                }
                _ => Err(CommitSourceError::Client(format!(
                    "environment variable '{}' not set",
                    name
                ))),
            };
        }

        Ok(None)
    }
}

/// GitHub-compatible commit source.
#[derive(Clone)]
pub struct GitHubCommitSource {
    client: Client,
    api_base_url: Option<String>,
    user_agent: String,
    token: Option<SecretString>,
}

impl GitHubCommitSource {
    /// Creates a client from settings, resolving the token eagerly.
    pub fn new(settings: &CommitSourceSettings) -> Result<Self, CommitSourceError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| CommitSourceError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: settings.api_base_url.clone(),
            user_agent: settings.user_agent.clone(),
            token: settings.resolve_token()?,
        })
    }

    /// Returns the URL queried for the given repository and branch.
    pub fn commit_url(&self, repo: &RepoCoordinates, branch: &str) -> String {
        repo.latest_commit_url(branch, self.api_base_url.as_deref())
    }
}

#[async_trait]
impl CommitSource for GitHubCommitSource {
    async fn fetch_latest_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<CommitResponse, CommitSourceError> {
        let url = self.commit_url(repo, branch);
        debug!("Fetching latest commit from {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, GITHUB_ACCEPT);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CommitSourceError::Timeout { url: url.clone() }
            } else {
                CommitSourceError::Request {
                    url: url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| CommitSourceError::Body {
                url: url.clone(),
                message: e.to_string(),
            })?;

        debug!("Commit query returned status {} ({} bytes)", status, body.len());
        Ok(CommitResponse::new(status, body.to_vec()))
    }
}
