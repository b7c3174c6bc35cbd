// src/bin/cortex-node.rs
//
// Minimal demo node that wires up the cortex-engine library:
//
// - RocksDB-backed storage (or --ephemeral for an in-memory run)
// - A file-backed write-ahead journal for the Writer Queue
// - Prometheus metrics exporter on /metrics
// - A periodic checkpoint-sweep loop over a fixed demo tenant, the same
//   role the teacher's block-proposal loop plays for `chain`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use cortex_engine::config::CortexConfig;
use cortex_engine::metrics::{MetricsRegistry, run_prometheus_http_server};
use cortex_engine::types::{FactDraft, FactType, TenantId};
use cortex_engine::Engine;

const DEMO_TENANT: &str = "demo-tenant";
const DEMO_PROJECT: &str = "bootstrap";
const CHECKPOINT_SWEEP_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "cortex_node=info,cortex_engine=info".to_string()))
        .init();

    if let Err(err) = run_node().await {
        tracing::error!(error = %err, "fatal error");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let ephemeral = std::env::args().any(|a| a == "--ephemeral");
    let cfg = CortexConfig::default();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?);

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!(error = %e, "metrics HTTP server error");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Engine
    // ---------------------------

    let engine = if ephemeral {
        tracing::info!("starting in --ephemeral mode: no RocksDB database, no WAL files on disk");
        Engine::ephemeral(cfg, None, None, None)
    } else {
        Engine::open(cfg, None, None, None).map_err(|e| format!("failed to open engine: {e}"))?
    };

    tracing::info!(
        tenant = DEMO_TENANT,
        interval_secs = CHECKPOINT_SWEEP_INTERVAL_SECS,
        "starting checkpoint-sweep loop"
    );

    run_checkpoint_sweep_loop(&engine, &metrics).await;
    Ok(())
}

/// Periodically ingests a heartbeat fact for the demo tenant, then asks
/// the Merkle Checkpointer to seal whatever pending transactions that
/// produced. In a real deployment the heartbeat ingest is replaced by
/// whatever HTTP/CLI/MCP surface is wired in front of the engine; this
/// loop exists only to exercise the checkpoint path end to end with no
/// external caller.
async fn run_checkpoint_sweep_loop(engine: &Engine, metrics: &Arc<MetricsRegistry>) {
    let tenant = TenantId::new(DEMO_TENANT);
    let interval = Duration::from_secs(CHECKPOINT_SWEEP_INTERVAL_SECS);

    loop {
        let now = Utc::now();
        let draft = FactDraft::new(DEMO_TENANT, DEMO_PROJECT, FactType::Episode, format!("heartbeat at {now}"), "cortex-node");

        let commit_start = std::time::Instant::now();
        match engine.memory.ingest(draft, None, now).await {
            Ok(outcome) => {
                metrics.cortex.ledger_commit_seconds.observe(commit_start.elapsed().as_secs_f64());
                tracing::info!(fact_id = %outcome.fact_id, "ingested heartbeat fact");
            }
            Err(e) => tracing::warn!(error = %e, "heartbeat ingest failed"),
        }

        let checkpoint_start = std::time::Instant::now();
        match engine.checkpointer.maybe_checkpoint(&tenant, now).await {
            Ok(created) if !created.is_empty() => {
                metrics.cortex.checkpoint_seconds.observe(checkpoint_start.elapsed().as_secs_f64());
                tracing::info!(count = created.len(), "sealed checkpoint(s)");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "checkpoint sweep failed"),
        }

        tokio::time::sleep(interval).await;
    }
}
