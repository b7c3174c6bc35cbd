// cortex-gateway/src/main.rs

//! API gateway binary.
//!
//! This binary exposes the Core API (`spec.md` §6) as a thin HTTP
//! surface over one `cortex_engine::Engine`:
//!
//! - `GET /health`
//! - `POST /facts`, `POST /facts/:fact_id/deprecate`, `GET
//!   /facts/:fact_id`, `GET /projects/:project/facts`
//! - `POST /search`, `GET /context`
//! - `POST /agents`, `POST /facts/:fact_id/votes`
//! - `POST /checkpoints`, `GET /chain/verify`, `GET
//!   /checkpoints/export`, `POST /checkpoints/import`
//!
//! It embeds one engine (RocksDB-backed unless `--ephemeral` is
//! passed) and a Prometheus metrics exporter on `/metrics`. There is no
//! background proposer loop here; checkpoint sweeping is the demo
//! node's job (`cortex-engine/src/bin/cortex-node.rs`) — this binary
//! only creates a checkpoint when a caller asks it to.

mod config;
mod routes;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;

use cortex_engine::config::CortexConfig;
use cortex_engine::metrics::{MetricsRegistry, run_prometheus_http_server};
use cortex_engine::Engine;

use config::ApiConfig;
use routes::{checkpoints, consensus, facts, health, search};
use state::{AppState, SharedState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "cortex_gateway=info,cortex_engine=info".to_string()))
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let api_cfg = ApiConfig::default();
    let engine_cfg = CortexConfig::default();
    let ephemeral = std::env::args().any(|a| a == "--ephemeral");

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?);

    if engine_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = engine_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Engine
    // ---------------------------

    let engine = if ephemeral {
        Arc::new(Engine::ephemeral(engine_cfg, None, None, None))
    } else {
        Arc::new(Engine::open(engine_cfg, None, None, None).map_err(|e| format!("failed to open engine: {e}"))?)
    };

    // ---------------------------
    // Shared state
    // ---------------------------

    let app_state: SharedState = Arc::new(AppState { engine, metrics: metrics.clone() });

    // ---------------------------
    // HTTP router
    // ---------------------------

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/facts", post(facts::store_fact))
        .route("/facts/{fact_id}", get(facts::get_fact))
        .route("/facts/{fact_id}/deprecate", post(facts::deprecate_fact))
        .route("/facts/{fact_id}/votes", post(consensus::cast_vote))
        .route("/projects/{project}/facts", get(facts::list_project))
        .route("/search", post(search::search))
        .route("/context", get(search::context))
        .route("/agents", post(consensus::register_agent))
        .route("/checkpoints", post(checkpoints::create_checkpoint))
        .route("/checkpoints/export", get(checkpoints::export_verifiable))
        .route("/checkpoints/import", post(checkpoints::import_verifiable))
        .route("/chain/verify", get(checkpoints::verify_chain))
        .with_state(app_state);

    // ---------------------------
    // axum 0.8 server (hyper 1 / tokio 1.48 style)
    // ---------------------------

    tracing::info!("API gateway listening on http://{}", api_cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr).await.map_err(|e| format!("failed to bind {}: {e}", api_cfg.listen_addr))?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.map_err(|e| format!("API server error: {e}"))?;

    Ok(())
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
