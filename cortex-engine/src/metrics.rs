//! Prometheus-backed metrics and HTTP exporter (`SPEC_FULL.md`, "Ambient
//! stack": "A `MetricsRegistry` in the teacher's `prometheus` + `hyper` +
//! `http-body-util` + `hyper-util` style").
//!
//! This is an ambient concern carried even though dashboards are out of
//! scope (`spec.md` §1): the registry is constructed by a binary (the
//! demo node or the gateway), not owned by [`crate::Engine`] itself,
//! mirroring how the teacher's `chain` crate keeps `MetricsRegistry`
//! separate from `ConsensusEngine` and has call sites (`main.rs`,
//! `api-gateway`) observe durations around library calls.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{self, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics covering the four core subsystems named in `spec.md` §2:
/// the L3 ledger, the Merkle checkpointer, the consensus engine, the
/// privacy shield, and the L2 vector store.
#[derive(Clone)]
pub struct CortexMetrics {
    /// Latency of a single Writer Queue commit (journal append + apply
    /// + transaction append), in seconds.
    pub ledger_commit_seconds: Histogram,
    /// Latency of sealing one Merkle checkpoint batch, in seconds.
    pub checkpoint_seconds: Histogram,
    /// Distribution of `consensus_score` values immediately after a
    /// vote recompute, in `[0, 2]`.
    pub consensus_score: Histogram,
    /// Count of Privacy Shield matches, labeled by tier
    /// (`critical`/`platform`/`standard`).
    pub privacy_tier_hits: IntCounterVec,
    /// Latency of a single `VectorStore::search` call, in seconds.
    pub vector_search_seconds: Histogram,
}

impl CortexMetrics {
    /// Registers every metric into `registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let ledger_commit_seconds = Histogram::with_opts(
            HistogramOpts::new("ledger_commit_seconds", "Time to commit one writer-queue submission, in seconds")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(ledger_commit_seconds.clone()))?;

        let checkpoint_seconds = Histogram::with_opts(
            HistogramOpts::new("checkpoint_seconds", "Time to seal one Merkle checkpoint batch, in seconds")
                .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(checkpoint_seconds.clone()))?;

        let consensus_score = Histogram::with_opts(
            HistogramOpts::new("consensus_score", "Distribution of consensus_score after a vote recompute")
                .buckets(vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0]),
        )?;
        registry.register(Box::new(consensus_score.clone()))?;

        let privacy_tier_hits = IntCounterVec::new(Opts::new("privacy_tier_hits_total", "Privacy Shield matches by tier"), &["tier"])?;
        registry.register(Box::new(privacy_tier_hits.clone()))?;

        let vector_search_seconds = Histogram::with_opts(
            HistogramOpts::new("vector_search_seconds", "Time spent in a single L2 vector search, in seconds")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(vector_search_seconds.clone()))?;

        Ok(Self {
            ledger_commit_seconds,
            checkpoint_seconds,
            consensus_score,
            privacy_tier_hits,
            vector_search_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the engine's metrics. This
/// is the handle a binary holds and shares (behind an [`Arc`]) with
/// every call site that wants to record a duration or count.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub cortex: CortexMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("cortex".to_string()), None)?;
        let cortex = CortexMetrics::register(&registry)?;
        Ok(Self { registry, cortex })
    }

    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes `GET /metrics` in Prometheus text
/// exposition format; every other path returns 404.
pub async fn run_prometheus_http_server(metrics: Arc<MetricsRegistry>, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!(error = %err, "metrics HTTP server connection error");
            }
        });
    }
}

async fn handle_request(req: Request<Incoming>, metrics: Arc<MetricsRegistry>) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder().status(StatusCode::NOT_FOUND).body(Full::new(Bytes::from("not found"))).unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn cortex_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = CortexMetrics::register(&registry).expect("register metrics");

        metrics.ledger_commit_seconds.observe(0.002);
        metrics.checkpoint_seconds.observe(1.2);
        metrics.consensus_score.observe(1.75);
        metrics.privacy_tier_hits.with_label_values(&["critical"]).inc();
        metrics.vector_search_seconds.observe(0.003);

        let families = registry.gather();
        assert!(!families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_includes_metric_names() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.cortex.ledger_commit_seconds.observe(0.01);
        registry.cortex.privacy_tier_hits.with_label_values(&["standard"]).inc();

        let text = registry.gather_text();
        assert!(text.contains("ledger_commit_seconds"));
        assert!(text.contains("privacy_tier_hits_total"));
    }
}
