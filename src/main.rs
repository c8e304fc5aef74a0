//! QuizChain · learn-to-earn quiz backend
//!
//! - Quiz sessions with shuffled questions/options and countdowns
//! - Local progress (certificates, XP, level, streak) in a profile file
//! - Optional on-chain proof of completion through a signer bridge
//! - Axum HTTP + WebSocket API, static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                        : u16 (default 3000)
//!   STORE_PATH                  : profile file (default ./data/profile.json)
//!   CATALOG_PATH                : TOML catalog with extra courses/quizzes
//!   NODE_URL                    : fullnode REST base
//!   SIGNER_URL / WALLET_ADDRESS : enable on-chain submission when both are set
//!   NETWORK                     : explorer network (default "devnet")
//!   PROGRESS_POLL_SECS          : progress refresh period (default 10)
//!   CHAIN_CONFIRM_TIMEOUT_SECS  : confirmation wait bound (default 30)
//!   LOG_LEVEL                   : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                  : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod catalog;
mod session;
mod scoring;
mod storage;
mod progress;
mod wallet;
mod certificate;
mod runner;
mod state;
mod protocol;
mod logic;
mod routes;
#[cfg(test)]
mod testutil;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

  // Catalog, profile store, wallet, progress watcher.
  let state = Arc::new(AppState::new(settings));

  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizchain_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "quizchain_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "quizchain_backend", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "quizchain_backend", "Shutdown requested");
}
