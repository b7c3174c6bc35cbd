//! Top-level configuration for a CORTEX engine instance.
//!
//! This module aggregates configuration for:
//!
//! - Merkle checkpointing (`CheckpointConfig`),
//! - the WBFT consensus engine (`ConsensusConfig`),
//! - the per-tenant writer queue (`QueueConfig`),
//! - the L1 working window (`WindowConfig`),
//! - the L2 vector store (`VectorConfig`),
//! - the privacy shield (`PrivacyConfig`),
//! - persistent storage (RocksDB path and creation flags),
//! - the Prometheus metrics exporter.
//!
//! The goal is a single `CortexConfig` struct that a binary can build
//! from defaults, a config file, or environment variables as needed.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the Merkle Checkpointer (`spec.md` §4.D).
#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    /// Number of transactions sealed per checkpoint.
    pub batch_size: u64,
    /// Maximum wall-clock interval between checkpoints even if
    /// `batch_size` has not yet been reached.
    pub max_interval: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_interval: Duration::from_secs(300),
        }
    }
}

/// Configuration for the WBFT consensus engine (`spec.md` §4.I).
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Absolute consensus-score threshold above which a fact transitions
    /// to `verified` (`spec.md` §4.I: "score ≥ 1.5"). Not the same knob
    /// as `byzantine_quorum_fraction` — see that field's doc comment.
    pub verified_score: f64,
    /// Absolute consensus-score threshold below which a fact transitions
    /// to `disputed` (`spec.md` §4.I: "score ≤ 0.5").
    pub disputed_score: f64,
    /// Minimum number of distinct agent votes required before a
    /// threshold crossing is honored.
    pub quorum: usize,
    /// The "consensus threshold (default 0.67)" from `spec.md` §6. This
    /// is the supermajority fraction behind the protocol's Byzantine
    /// tolerance claim (⌊N/3⌋ dishonest agents), not the score cutoff
    /// above — kept distinct so a deployment can retune quorum
    /// requirements without silently moving the verified/disputed score
    /// thresholds spec.md states as fixed values.
    pub byzantine_quorum_fraction: f64,
    /// Time constant for the exponential vote-weight decay,
    /// `decay = exp(-age / tau)`.
    pub decay_tau: Duration,
    /// Smoothing factor for the post-hoc reputation EMA update.
    pub reputation_ema_alpha: f64,
    /// Number of Elder Council members consulted when quorum cannot be
    /// reached within `elder_fallback_after`.
    pub elder_council_size: usize,
    /// Wall-clock time after which an unresolved vote enters Elder
    /// Council fallback.
    pub elder_fallback_after: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            verified_score: 1.5,
            disputed_score: 0.5,
            quorum: 3,
            byzantine_quorum_fraction: 0.67,
            decay_tau: Duration::from_secs(30 * 24 * 3600),
            reputation_ema_alpha: 0.1,
            elder_council_size: 3,
            elder_fallback_after: Duration::from_secs(24 * 3600),
        }
    }
}

/// Configuration for the per-tenant Writer Queue (`spec.md` §4.B).
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Maximum number of pending submissions queued per tenant before
    /// new submissions are rejected with `Busy`.
    pub capacity: usize,
    /// Default deadline a caller waits for queue admission before
    /// `Timeout`.
    pub admission_timeout: Duration,
    /// Directory holding per-tenant write-ahead journal files.
    pub wal_dir: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            admission_timeout: Duration::from_secs(5),
            wal_dir: "data/cortex-wal".to_string(),
        }
    }
}

/// Configuration for the L1 Working Window (`spec.md` §4.F).
#[derive(Clone, Debug)]
pub struct WindowConfig {
    /// Maximum token budget per `(tenant, session)` window.
    pub token_budget: u32,
    /// Idle time after which a session's window is evicted.
    pub idle_ttl: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            token_budget: 8_000,
            idle_ttl: Duration::from_secs(2 * 3600),
        }
    }
}

/// Configuration for the L2 Vector Store (`spec.md` §4.E).
#[derive(Clone, Debug)]
pub struct VectorConfig {
    /// Dimension every embedding in this deployment must have.
    pub dimension: usize,
    /// Below this many vectors per tenant, search does an exact linear
    /// scan rather than falling back to an approximate index.
    pub exact_scan_threshold: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            exact_scan_threshold: 10_000,
        }
    }
}

/// Configuration for the Privacy Shield (`spec.md` §4.K).
#[derive(Clone, Debug)]
pub struct PrivacyConfig {
    /// Whether the shield is active at all; disabling it is only
    /// intended for isolated test fixtures.
    pub enabled: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Configuration for RocksDB-backed persistent storage (L3 Event
/// Ledger, `spec.md` §4.C).
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if
    /// they do not yet exist.
    pub create_if_missing: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/cortex-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9899"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a CORTEX engine instance.
///
/// Aggregates every sub-config needed to wire up a typical node:
/// checkpointing, consensus tuning, the writer queue, the working
/// window, the vector store, the privacy shield, persistent storage,
/// and the metrics exporter.
#[derive(Clone, Debug, Default)]
pub struct CortexConfig {
    pub checkpoint: CheckpointConfig,
    pub consensus: ConsensusConfig,
    pub queue: QueueConfig,
    pub window: WindowConfig,
    pub vector: VectorConfig,
    pub privacy: PrivacyConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_stated_defaults() {
        let cfg = CortexConfig::default();
        assert_eq!(cfg.checkpoint.batch_size, 1000);
        assert_eq!(cfg.consensus.quorum, 3);
        assert!((cfg.consensus.verified_score - 1.5).abs() < 1e-9);
        assert!((cfg.consensus.disputed_score - 0.5).abs() < 1e-9);
        assert_eq!(cfg.window.token_budget, 8_000);
        assert_eq!(cfg.queue.capacity, 10_000);
        assert_eq!(cfg.vector.dimension, 384);
    }
}
