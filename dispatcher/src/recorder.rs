//! Recording invoker – runs the external recorder (`ffmpeg`) once per job.
//!
//! The call blocks until the source stream ends or the recorder fails, so it
//! only ever runs on a pool worker.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{ChildStderr, Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use camrec_common::config::Config;
use camrec_common::endpoint::redact;

/// Result of one recording attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    Success { data: Vec<u8> },
    Failure { reason: String },
}

impl RecordingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Artifact bytes; empty on failure.
    pub fn into_data(self) -> Vec<u8> {
        match self {
            Self::Success { data } => data,
            Self::Failure { .. } => Vec::new(),
        }
    }
}

/// Records `url` into `output` and returns the artifact.
pub trait Recorder: Send + Sync {
    fn record(&self, url: &str, output: &Path) -> RecordingOutcome;
}

/// Stream-copies a source with `ffmpeg` (or a compatible tool).
#[derive(Debug, Clone)]
pub struct FfmpegRecorder {
    program: String,
    connect_timeout: Duration,
}

impl FfmpegRecorder {
    pub fn new(program: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.recorder_bin.clone(), config.connect_timeout())
    }

    fn timeout_micros(&self) -> String {
        self.connect_timeout.as_micros().to_string()
    }

    /// Command line as logged, with the URL password masked.
    fn describe(&self, url: &str, output: &Path) -> String {
        format!(
            "{} -rtsp_transport tcp -timeout {} -i {} -c copy {}",
            self.program,
            self.timeout_micros(),
            redact(url),
            output.display()
        )
    }
}

impl Recorder for FfmpegRecorder {
    fn record(&self, url: &str, output: &Path) -> RecordingOutcome {
        let command = self.describe(url, output);
        debug!("Spawning: {command}");

        let mut cmd = Command::new(&self.program);
        cmd.args(["-rtsp_transport", "tcp", "-timeout"])
            .arg(self.timeout_micros())
            .args(["-i", url, "-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return failure(output, format!("{command}: cannot launch: {e}")),
        };

        // Drain stderr so a chatty recorder never blocks on a full pipe.
        let drain = child.stderr.take().and_then(|stderr| {
            std::thread::Builder::new()
                .name("recorder-stderr".into())
                .spawn(move || last_stderr_line(stderr))
                .ok()
        });
        let status = child.wait();
        let last_line = drain.and_then(|h| h.join().ok()).flatten();
        let detail = last_line.map(|l| format!(" ({l})")).unwrap_or_default();

        match status {
            Ok(s) if s.success() => {}
            Ok(s) => return failure(output, format!("{command}: exited with {s}{detail}")),
            Err(e) => return failure(output, format!("{command}: wait failed: {e}{detail}")),
        }

        let data = match std::fs::read(output) {
            Ok(data) => data,
            Err(e) => {
                return failure(
                    output,
                    format!("{command}: cannot read {}: {e}", output.display()),
                )
            }
        };
        remove_temp(output);

        if data.is_empty() {
            return failure(output, format!("{command}: produced an empty file"));
        }

        info!("Recorded {} bytes from {}", data.len(), redact(url));
        RecordingOutcome::Success { data }
    }
}

fn failure(output: &Path, reason: String) -> RecordingOutcome {
    warn!("Recording failed: {reason}");
    remove_temp(output);
    RecordingOutcome::Failure { reason }
}

/// Best-effort removal; a file that is already gone is fine.
fn remove_temp(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove {}: {e}", path.display()),
    }
}

fn last_stderr_line(stderr: ChildStderr) -> Option<String> {
    let mut last = None;
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(l) if l.trim().is_empty() => {}
            Ok(l) => {
                debug!("[recorder] {l}");
                last = Some(l.trim().to_string());
            }
            Err(_) => break,
        }
    }
    last
}

// ─── tests ───────────────────────────────────────────────────────────────
