//! Pure data types for commit queries.

use serde::{Deserialize, Serialize};

/// HTTP status the hosted API uses to signal rate limiting.
pub const STATUS_RATE_LIMITED: u16 = 403;

/// HTTP status of a successful commit query.
pub const STATUS_OK: u16 = 200;

/// Raw response of a commit query. The status is not interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, used verbatim as the event payload.
    pub body: Vec<u8>,
}

impl CommitResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == STATUS_RATE_LIMITED
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Commit identifier extracted from a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Commit hash.
    pub sha: String,
}

impl CommitInfo {
    /// Extracts the `sha` field from a commit payload.
    pub fn from_payload(body: &[u8]) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| format!("invalid JSON: {}", e))?;
        match value.get("sha") {
            Some(serde_json::Value::String(sha)) if !sha.is_empty() => Ok(Self { sha: sha.clone() }),
            Some(serde_json::Value::String(_)) => Err("empty 'sha' field".to_string()),
            Some(other) => Err(format!("'sha' is not a string: {}", other)),
            None => Err("missing 'sha' field".to_string()),
        }
    }
}
