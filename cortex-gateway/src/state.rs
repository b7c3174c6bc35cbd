//! Shared application state.

use std::sync::Arc;

use cortex_engine::metrics::MetricsRegistry;
use cortex_engine::Engine;

/// Shared state held by every request handler, wrapped in an [`Arc`] and
/// passed in via Axum's `State` extractor.
pub struct AppState {
    /// The fully wired engine: ledger, consensus, vector store, working
    /// window, and checkpointer behind one `Engine::open`/`::ephemeral`
    /// call.
    pub engine: Arc<Engine>,
    /// Metrics registry shared between the engine's call sites and the
    /// `/metrics` exporter.
    pub metrics: Arc<MetricsRegistry>,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;
