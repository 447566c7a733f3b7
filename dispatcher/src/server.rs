//! HTTP endpoint accepting recording requests.
//!
//! Routes:
//!   GET  /api/health       → health check
//!   POST /api/recordings   → submit a RecordingRequest, answered with an
//!                            Acknowledgment as soon as the job is queued

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use camrec_common::protocol::{Acknowledgment, HealthResponse, MessageHeader, RecordingRequest};

use crate::dispatcher::Dispatcher;

/// Shared state for route handlers.
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    start_time: Instant,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = AppState {
        dispatcher,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/recordings", post(submit_recording))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server. Blocks until shutdown.
pub async fn run(
    dispatcher: Arc<Dispatcher>,
    listen_addr: &str,
    shutdown: &'static AtomicBool,
) -> anyhow::Result<()> {
    let app = router(dispatcher);

    let listener = TcpListener::bind(listen_addr).await?;
    info!("Recording endpoint listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

// ── route handlers ───────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pool = state.dispatcher.pool();
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        workers: pool.size(),
        pending_jobs: pool.pending(),
    })
}

async fn submit_recording(
    State(state): State<AppState>,
    payload: Result<Json<RecordingRequest>, JsonRejection>,
) -> Json<Acknowledgment> {
    // Undecodable bodies are still acknowledged, just never queued.
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected undecodable recording request: {rejection}");
            return Json(Acknowledgment::rejected(
                &MessageHeader::new(""),
                rejection.body_text(),
            ));
        }
    };
    info!(
        "Received request from {} (sent {}, took {:.3}s)",
        request.header.entity_path,
        request.header.timestamp.to_rfc3339(),
        request.header.age_secs()
    );
    // Only pool bookkeeping happens here; recording runs on a worker.
    Json(state.dispatcher.submit(request))
}

// ─── tests ───────────────────────────────────────────────────────────────
