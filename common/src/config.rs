//! Configuration parsing – reads a KEY=VALUE file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::naming::NamingStrategy;

/// Number of concurrent recordings when `WORKERS` is not set.
pub const DEFAULT_WORKERS: usize = 4;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // ── network ──────────────────────────────────────────────────────
    /// Address the request endpoint listens on.
    pub listen_addr: String,
    /// Base URL of the upload collaborator.
    pub upload_url: String,
    pub upload_timeout_secs: u64,

    // ── worker pool ──────────────────────────────────────────────────
    pub workers: usize,
    /// Jobs allowed to wait beyond `workers`; `None` is unbounded.
    pub queue_capacity: Option<usize>,

    // ── recording ────────────────────────────────────────────────────
    pub recorder_bin: String,
    /// Connection-establishment timeout handed to the recorder.
    pub connect_timeout_secs: u64,
    pub tmp_dir: PathBuf,
    pub artifact_ext: String,
    pub naming: NamingStrategy,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/camrec/camrec.conf"
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        from_map(&HashMap::new())
    }
}

/// Parse a `KEY=VALUE` configuration file.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let config = from_map(&parse_conf(&text));
    info!("Loaded config from {}", path.display());
    Ok(config)
}

fn from_map(map: &HashMap<String, String>) -> Config {
    let get = |key: &str| -> Option<String> { map.get(key).cloned().filter(|v| !v.is_empty()) };
    let get_u64 = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };

    let workers = get("WORKERS")
        .and_then(|v| v.parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or(DEFAULT_WORKERS);

    let naming = match get("NAMING").map(|v| v.parse::<NamingStrategy>()) {
        Some(Ok(strategy)) => strategy,
        Some(Err(e)) => {
            warn!("{e}, falling back to structural naming");
            NamingStrategy::default()
        }
        None => NamingStrategy::default(),
    };

    Config {
        listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8090".into()),
        upload_url: get("UPLOAD_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://uploader:8091".into()),
        upload_timeout_secs: get_u64("UPLOAD_TIMEOUT_SECS", 30),

        workers,
        queue_capacity: get("QUEUE_CAPACITY")
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0),

        recorder_bin: get("RECORDER_BIN").unwrap_or_else(|| "ffmpeg".into()),
        connect_timeout_secs: get_u64("CONNECT_TIMEOUT_SECS", 5),
        tmp_dir: PathBuf::from(get("TMP_DIR").unwrap_or_else(|| "/tmp/camrec".into())),
        artifact_ext: get("ARTIFACT_EXT")
            .map(|e| e.trim_start_matches('.').to_string())
            .unwrap_or_else(|| "mp4".into()),
        naming,
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────
