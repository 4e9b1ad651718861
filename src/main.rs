//! Makhraj · Hijaiyah Pronunciation Quiz Backend
//!
//! - Axum HTTP + WebSocket API
//! - Multi-modal answer checking (choice/text/voice) with adaptive feedback
//! - Optional remote speech recognition and progress recording (via env)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   ASR_BASE_URL       : enables remote speech recognition if present
//!   ASR_API_TOKEN      : bearer token for the recognition endpoint
//!   ASR_MODELS         : comma-separated model fallback chain
//!   PROGRESS_BASE_URL  : enables attempt/summary recording if present
//!   PROGRESS_API_TOKEN : bearer token for the progress endpoint
//!   QUIZ_CONFIG_PATH   : path to TOML config (tuning knobs + question bank)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod audio;
mod matcher;
mod asr;
mod recognize;
mod validator;
mod engine;
mod recorder;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (question bank, matcher, recognizers).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "makhraj_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

/// Resolve on Ctrl-C so in-flight requests can drain before exit.
async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "makhraj_backend", error = %e, "Failed to listen for shutdown signal");
  }
}
