//! Result forwarder – hands each finished recording to the upload
//! collaborator.
//!
//! Forwarding is fire-and-forget from the job's point of view: the response
//! of the upload service never travels back to whoever asked for the
//! recording.  Delivery failures are logged here and not retried.

use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, error, info};

use camrec_common::protocol::{MessageHeader, UploadRequest};

use crate::recorder::RecordingOutcome;

pub const HEADER_ARTIFACT_PATH: &str = "X-Artifact-Path";
pub const HEADER_ENTITY_PATH: &str = "X-Entity-Path";
pub const HEADER_TIMESTAMP: &str = "X-Timestamp";
pub const HEADER_TRACE_ID: &str = "X-Trace-Id";
pub const HEADER_STATUS: &str = "X-Recording-Status";

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload service returned {0}")]
    Status(reqwest::StatusCode),
}

/// Destination for upload requests.  Shared by every worker.
pub trait UploadSink: Send + Sync {
    fn send(&self, request: UploadRequest) -> Result<(), ForwardError>;
}

/// Wrap an outcome in an upload request and send it.
///
/// A failed recording is still forwarded, with an empty payload, so the
/// upload side learns that the job ran.
pub fn forward(
    sink: &dyn UploadSink,
    outcome: RecordingOutcome,
    path: &str,
    header: &MessageHeader,
) {
    let ok = outcome.is_success();
    let request = UploadRequest {
        header: header.derive("upload"),
        path: path.to_string(),
        data: outcome.into_data(),
    };
    let size = request.data.len();

    match sink.send(request) {
        Ok(()) if ok => info!("Forwarded {path} ({size} bytes)"),
        Ok(()) => info!("Forwarded failure notice for {path}"),
        Err(e) => error!("Cannot forward {path}: {e}"),
    }
}

/// POSTs artifacts to `{base_url}/api/uploads`.
pub struct HttpUploader {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpUploader {
    /// Must be called outside an async runtime (the blocking client owns
    /// its own).
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Cannot create HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/uploads", base_url.trim_end_matches('/')),
        })
    }
}

impl UploadSink for HttpUploader {
    fn send(&self, request: UploadRequest) -> Result<(), ForwardError> {
        let status = if request.is_failure() { "failed" } else { "ok" };
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(HEADER_ARTIFACT_PATH, &request.path)
            .header(HEADER_ENTITY_PATH, &request.header.entity_path)
            .header(HEADER_TIMESTAMP, request.header.timestamp.to_rfc3339())
            .header(HEADER_STATUS, status);
        if let Some(trace) = &request.header.trace_id {
            builder = builder.header(HEADER_TRACE_ID, trace);
        }

        let resp = builder.body(request.data).send()?;
        if !resp.status().is_success() {
            return Err(ForwardError::Status(resp.status()));
        }
        debug!("POST {} → {}", self.endpoint, resp.status());
        Ok(())
    }
}

// ─── tests ───────────────────────────────────────────────────────────────
