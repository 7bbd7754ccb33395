//! Error taxonomy for the synchronization engine
//!
//! Configuration errors abort a run before anything is fetched. Remote errors
//! abort the pass for one item kind. Process and file errors never leave the
//! reconciler: they are demoted to log lines and per-item results.

use std::path::PathBuf;
use thiserror::Error;

/// Longest payload excerpt kept in a [`SyncError::RemoteDecode`]
const PAYLOAD_PREVIEW_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unknown type {kind}: Allowed types are {}", .allowed.join(", "))]
    UnsupportedType { kind: String, allowed: Vec<String> },

    #[error("{field} is not provided")]
    MissingOption { field: String },

    #[error("Failed to fetch data for user {user} at path {endpoint}. Status: {status}")]
    RemoteFetch {
        endpoint: String,
        user: String,
        status: u16,
    },

    #[error("Expected an array from {endpoint}. Actual value: {payload}")]
    RemoteDecode { endpoint: String, payload: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} item could not be decoded: {reason}")]
    ItemDecode { kind: String, reason: String },

    #[error("{kind} item is missing required field '{field}'")]
    Mapping { kind: String, field: String },

    #[error("Command '{command}' failed in {}: {exit}", .working_dir.display())]
    Process {
        command: String,
        working_dir: PathBuf,
        exit: String,
    },

    #[error("Refusing to write outside the target directory: {path}")]
    UnsafePath { path: String },

    #[error("Failed to write {}: {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Errors that must stop the run before any remote call is made
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            SyncError::UnsupportedType { .. } | SyncError::MissingOption { .. } | SyncError::Config(_)
        )
    }

    pub(crate) fn decode(endpoint: &str, payload: &str) -> Self {
        let payload = if payload.len() > PAYLOAD_PREVIEW_LEN {
            let mut end = PAYLOAD_PREVIEW_LEN;
            while !payload.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &payload[..end])
        } else {
            payload.to_string()
        };

        SyncError::RemoteDecode {
            endpoint: endpoint.to_string(),
            payload,
        }
    }

    pub(crate) fn mapping(kind: impl Into<String>, field: impl Into<String>) -> Self {
        SyncError::Mapping {
            kind: kind.into(),
            field: field.into(),
        }
    }
}

pub type SyncOutcome<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_type_message_lists_allowed_kinds() {
        let err = SyncError::UnsupportedType {
            kind: "wiki".to_string(),
            allowed: vec!["repo".to_string(), "gist".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "Unknown type wiki: Allowed types are repo, gist"
        );
        assert!(err.is_config());
    }

    #[test]
    fn test_remote_errors_are_not_config_errors() {
        let err = SyncError::RemoteFetch {
            endpoint: "/user/repos".to_string(),
            user: "alice".to_string(),
            status: 401,
        };

        assert!(!err.is_config());
        assert!(err.to_string().contains("Status: 401"));
    }

    #[test]
    fn test_decode_payload_is_truncated() {
        let body = "x".repeat(2000);
        match SyncError::decode("/gists", &body) {
            SyncError::RemoteDecode { payload, .. } => {
                assert!(payload.len() < body.len());
                assert!(payload.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
