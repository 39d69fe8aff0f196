//! Repository URL parsing.

use crate::error::ConfigError;

/// Host, owner and name of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    /// Parses `https://<host>/<owner>/<name>`; the scheme is optional.
    ///
    /// Extra path segments after the name are ignored and a trailing `.git`
    /// is dropped from the name.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let malformed = |reason: &str| ConfigError::MalformedRepository {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = url.trim();
        let without_scheme = trimmed.strip_prefix("https://").unwrap_or(trimmed);
        if without_scheme.contains("://") {
            return Err(malformed("only https repositories are supported"));
        }

        let segments: Vec<&str> = without_scheme.trim_end_matches('/').split('/').collect();
        let (host, owner, name) = match segments.as_slice() {
            [host, owner, name, ..] => (*host, *owner, *name),
            _ => return Err(malformed("expected <host>/<owner>/<name>")),
        };
        let name = name.strip_suffix(".git").unwrap_or(name);

        if host.is_empty() || owner.is_empty() || name.is_empty() {
            return Err(malformed("host, owner and name must be non-empty"));
        }

        Ok(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Default REST API base for the host, e.g. `https://api.github.com`.
    pub fn api_base(&self) -> String {
        format!("https://api.{}", self.host)
    }

    /// URL of the "latest commit on branch" endpoint.
    pub fn latest_commit_url(&self, branch: &str, api_base: Option<&str>) -> String {
        let base = match api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => self.api_base(),
        };
        format!(
            "{}/repos/{}/{}/commits/{}",
            base, self.owner, self.name, branch
        )
    }
}

impl std::fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}
