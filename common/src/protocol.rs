//! Message types exchanged with the request and upload collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::{Credentials, EndpointDescriptor};

/// Correlation metadata threaded through a request and every message
/// derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub timestamp: DateTime<Utc>,
    /// Slash-separated trace path, e.g. `client/record/upload`.
    #[serde(default)]
    pub entity_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl MessageHeader {
    pub fn new(entity_path: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            entity_path: entity_path.into(),
            trace_id: None,
        }
    }

    /// Header for a message derived from this one: same trace, path
    /// extended by `segment`, fresh timestamp.
    pub fn derive(&self, segment: &str) -> Self {
        let entity_path = if self.entity_path.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{segment}", self.entity_path.trim_end_matches('/'))
        };
        Self {
            timestamp: Utc::now(),
            entity_path,
            trace_id: self.trace_id.clone(),
        }
    }

    /// Time elapsed since the header was stamped, in seconds.
    pub fn age_secs(&self) -> f64 {
        (Utc::now() - self.timestamp).num_milliseconds() as f64 / 1000.0
    }
}

/// Inbound request to record one stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRequest {
    pub header: MessageHeader,
    pub endpoint: EndpointDescriptor,
    #[serde(default)]
    pub credentials: Credentials,
}

/// Synchronous answer to a [`RecordingRequest`].
///
/// `success` means the job was accepted into the pool, not that the
/// recording succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub header: MessageHeader,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Acknowledgment {
    pub fn accepted(request: &MessageHeader) -> Self {
        Self {
            header: request.derive("response"),
            success: true,
            error: None,
        }
    }

    pub fn rejected(request: &MessageHeader, error: impl ToString) -> Self {
        Self {
            header: request.derive("response"),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Outbound message carrying a finished (or failed) recording.
///
/// An empty `data` means the recording failed.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub header: MessageHeader,
    /// Identifier the artifact is stored under.
    pub path: String,
    pub data: Vec<u8>,
}

impl UploadRequest {
    pub fn is_failure(&self) -> bool {
        self.data.is_empty()
    }
}

/// Health-check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub workers: usize,
    pub pending_jobs: usize,
}

// ─── tests ───────────────────────────────────────────────────────────────
