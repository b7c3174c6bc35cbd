//! CORTEX: a sovereign, tenant-isolated memory engine for autonomous
//! agents.
//!
//! The crate is organized by the layer each module owns:
//!
//! - [`types`] — shared domain types (facts, transactions, votes, ...).
//! - [`canonical`] — deterministic byte encoding for hashing.
//! - [`ledger`] — the L3 Event Ledger: storage backends, the
//!   [`ledger::LedgerFacade`] operations, and per-tenant chain locking.
//! - [`writer_queue`] and [`wal`] — single-writer-per-tenant commit
//!   ordering and crash recovery.
//! - [`merkle`] and [`checkpointer`] — Merkle tree math and the
//!   checkpointing service built on it.
//! - [`consensus`] — WBFT scoring and reputation.
//! - [`vector_store`] — the L2 embedding index.
//! - [`working_window`] — the L1 per-session FIFO.
//! - [`search`] — Hybrid Search (Reciprocal Rank Fusion).
//! - [`privacy_shield`] — the tiered secret scanner.
//! - [`orchestrator`] — composes L1/L2/L3 behind `ingest`/`recall`/`context`.
//! - [`ports`] — capability traits for pluggable embedder/summarizer/notifier.
//! - [`tenant_guard`] — the shared tenant-isolation checkpoint.
//! - [`config`] — `CortexConfig` and its sub-configs.
//! - [`error`] — the closed [`CortexError`] taxonomy.
//! - [`metrics`] — the Prometheus registry and exporter a binary wires
//!   up around engine calls.

pub mod canonical;
pub mod checkpointer;
pub mod config;
pub mod consensus;
pub mod error;
pub mod ledger;
pub mod merkle;
pub mod metrics;
pub mod orchestrator;
pub mod ports;
pub mod privacy_shield;
pub mod search;
pub mod tenant_guard;
pub mod types;
pub mod vector_store;
pub mod wal;
pub mod working_window;
pub mod writer_queue;

pub use error::CortexError;

use std::sync::Arc;

use config::CortexConfig;
use consensus::ConsensusEngine;
use ledger::{ChainLocks, InMemoryLedger, LedgerFacade, LedgerStore, RocksDbLedger};
use orchestrator::MemoryOrchestrator;
use ports::{ConcatenationSummarizer, EmbedderPort, NotifierPort, NullNotifier, SummarizerPort};
use vector_store::{ExactScanVectorStore, VectorStore};
use wal::{FileWalJournal, InMemoryWalJournal, WalJournal};
use writer_queue::WriterQueue;
use checkpointer::MerkleCheckpointer;

/// A fully wired CORTEX node: every layer constructed from one
/// [`CortexConfig`] and ready to serve `ingest`/`recall`/`cast_vote`/
/// checkpoint operations. This is the crate's single entry point; a
/// binary (or the gateway's HTTP handlers) should hold one `Engine`
/// behind an `Arc` and never construct the layers it wraps directly.
pub struct Engine {
    pub ledger: LedgerFacade,
    pub store: Arc<dyn LedgerStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub checkpointer: MerkleCheckpointer,
    pub consensus: ConsensusEngine,
    pub memory: MemoryOrchestrator,
    locks: Arc<ChainLocks>,
}

impl Engine {
    /// Builds an `Engine` backed by RocksDB and a file-backed WAL, per
    /// `config.storage`/`config.queue.wal_dir`. The production path.
    pub fn open(
        config: CortexConfig,
        embedder: Option<Arc<dyn EmbedderPort>>,
        summarizer: Option<Arc<dyn SummarizerPort>>,
        notifier: Option<Arc<dyn NotifierPort>>,
    ) -> Result<Self, CortexError> {
        let store: Arc<dyn LedgerStore> = Arc::new(RocksDbLedger::open(&config.storage)?);
        let journal: Arc<dyn WalJournal> = Arc::new(FileWalJournal::new(config.queue.wal_dir.clone())?);
        Ok(Self::assemble(config, store, journal, embedder, summarizer, notifier))
    }

    /// Builds an `Engine` entirely in memory: no RocksDB database, no
    /// WAL files on disk. Used by the demo binary's `--ephemeral` mode
    /// and by integration tests that want a full `Engine` without a
    /// filesystem footprint.
    pub fn ephemeral(
        config: CortexConfig,
        embedder: Option<Arc<dyn EmbedderPort>>,
        summarizer: Option<Arc<dyn SummarizerPort>>,
        notifier: Option<Arc<dyn NotifierPort>>,
    ) -> Self {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        let journal: Arc<dyn WalJournal> = Arc::new(InMemoryWalJournal::new());
        Self::assemble(config, store, journal, embedder, summarizer, notifier)
    }

    fn assemble(
        config: CortexConfig,
        store: Arc<dyn LedgerStore>,
        journal: Arc<dyn WalJournal>,
        embedder: Option<Arc<dyn EmbedderPort>>,
        summarizer: Option<Arc<dyn SummarizerPort>>,
        notifier: Option<Arc<dyn NotifierPort>>,
    ) -> Self {
        let locks = Arc::new(ChainLocks::new());
        let queue = Arc::new(WriterQueue::new(config.queue.clone(), store.clone(), journal));
        let ledger = LedgerFacade::new(store.clone(), queue, locks.clone());
        let vector_store: Arc<dyn VectorStore> = Arc::new(ExactScanVectorStore::new());
        let checkpointer = MerkleCheckpointer::new(config.checkpoint.clone(), store.clone(), locks.clone());
        let consensus = ConsensusEngine::new(config.consensus.clone(), store.clone(), ledger.clone());

        let summarizer = summarizer.unwrap_or_else(|| Arc::new(ConcatenationSummarizer));
        let notifier: Arc<dyn NotifierPort> = notifier.unwrap_or_else(|| Arc::new(NullNotifier));

        // The orchestrator gets a clone of the same `LedgerFacade`, not a
        // second `WriterQueue`: both share one committer per tenant (and
        // one WAL journal), which is what keeps `spec.md` §3 invariant 8
        // ("single writer") and the WAL's crash-recovery guarantee (§4.B)
        // covering every write path, not just direct `ledger.store_fact`
        // calls.
        let memory = MemoryOrchestrator::new(&config, ledger.clone(), store.clone(), vector_store.clone(), embedder, summarizer, notifier);

        Self { ledger, store, vector_store, checkpointer, consensus, memory, locks }
    }

    pub fn chain_locks(&self) -> Arc<ChainLocks> {
        self.locks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use types::{FactDraft, FactType};

    #[tokio::test]
    async fn ephemeral_engine_round_trips_a_fact_through_ingest_and_get() {
        let engine = Engine::ephemeral(CortexConfig::default(), None, None, None);
        let draft = FactDraft::new("t1", "proj", FactType::Knowledge, "hello world", "test");

        let outcome = engine.memory.ingest(draft, None, Utc::now()).await.unwrap();
        let fact = engine.ledger.get_fact(&types::TenantId::new("t1"), outcome.fact_id, None).unwrap();
        assert_eq!(fact.content, "hello world");
    }

    #[tokio::test]
    async fn ephemeral_engine_verifies_its_own_chain() {
        let engine = Engine::ephemeral(CortexConfig::default(), None, None, None);
        let now = Utc::now();
        for i in 0..3 {
            let draft = FactDraft::new("t1", "proj", FactType::Knowledge, format!("fact {i}"), "test");
            engine.ledger.store_fact(draft, now).await.unwrap();
        }

        let result = engine.ledger.verify_chain(&types::TenantId::new("t1"), None, None).unwrap();
        assert!(result.valid);
    }
}
