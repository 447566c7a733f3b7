//! camrec Dispatcher – records network camera streams on demand.
//!
//! This binary:
//! 1. Reads configuration from `camrec.conf`
//! 2. Builds a fixed-size worker pool and the recording dispatcher
//! 3. Runs an axum HTTP server that acknowledges recording requests and
//!    leaves the recording and upload to the pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use camrec_dispatcher::dispatcher::{DispatchSettings, Dispatcher};
use camrec_dispatcher::forwarder::HttpUploader;
use camrec_dispatcher::pool::WorkerPool;
use camrec_dispatcher::recorder::FfmpegRecorder;
use camrec_dispatcher::server;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| camrec_common::config::Config::default_path().to_string());
    let config =
        camrec_common::config::load(&PathBuf::from(&config_path)).context("Config load failed")?;

    info!(
        "camrec Dispatcher starting (listen={}, upload={}, workers={}, queue={})",
        config.listen_addr,
        config.upload_url,
        config.workers,
        config
            .queue_capacity
            .map_or_else(|| "unbounded".to_string(), |c| c.to_string()),
    );

    std::fs::create_dir_all(&config.tmp_dir)
        .with_context(|| format!("Cannot create {}", config.tmp_dir.display()))?;

    // ── ctrl-c ───────────────────────────────────────────────────────
    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
        info!("Shutdown signal received");
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── pool + dispatcher ────────────────────────────────────────────
    // The blocking upload client must exist before the async runtime does.
    let uploader = HttpUploader::new(&config.upload_url, config.upload_timeout())?;
    let pool = Arc::new(
        WorkerPool::new(config.workers, config.queue_capacity)
            .context("Cannot start worker pool")?,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        Arc::new(FfmpegRecorder::from_config(&config)),
        Arc::new(uploader),
        DispatchSettings::from_config(&config),
    ));

    // ── HTTP server ──────────────────────────────────────────────────
    let runtime = tokio::runtime::Runtime::new().context("Cannot start async runtime")?;
    let served = runtime.block_on(server::run(
        dispatcher.clone(),
        &config.listen_addr,
        &SHUTDOWN,
    ));
    drop(runtime);
    if let Err(e) = served {
        tracing::error!("HTTP server error: {e:#}");
    }

    let pending = pool.pending();
    if pending > 0 {
        warn!("Abandoning {pending} queued or running recording(s)");
    }
    drop(dispatcher);

    info!("camrec Dispatcher stopped");
    Ok(())
}
