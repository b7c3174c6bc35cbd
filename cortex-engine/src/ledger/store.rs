//! Storage-backend contract for the L3 Event Ledger (`spec.md` §4.C).
//!
//! Any backend implementing [`LedgerStore`] gets single-writer-per-tenant,
//! concurrent-reader semantics from the engine's [`crate::writer_queue`]
//! and [`crate::ledger::chain_lock`] layers; the store itself only needs
//! to persist records and answer point/range lookups durably.

use crate::error::CortexError;
use crate::types::{Agent, AgentId, CheckpointId, Fact, FactId, MerkleCheckpoint, TenantId, Transaction, TxId, Vote};

/// Everything the rest of the engine needs from a persistent store.
///
/// Implementors: [`crate::ledger::mem::InMemoryLedger`] (tests, the
/// demo binary's `--ephemeral` mode) and
/// [`crate::ledger::rocksdb::RocksDbLedger`] (the production backend).
pub trait LedgerStore: Send + Sync {
    fn put_fact(&self, fact: &Fact) -> Result<(), CortexError>;
    fn get_fact(&self, tenant_id: &TenantId, fact_id: FactId) -> Result<Option<Fact>, CortexError>;
    fn list_facts(&self, tenant_id: &TenantId, project: &str) -> Result<Vec<Fact>, CortexError>;
    fn update_fact(&self, fact: &Fact) -> Result<(), CortexError>;

    fn append_transaction(&self, tx: &Transaction) -> Result<(), CortexError>;
    fn last_transaction(&self, tenant_id: &TenantId) -> Result<Option<Transaction>, CortexError>;
    fn transactions_in_range(&self, tenant_id: &TenantId, start: TxId, end: TxId) -> Result<Vec<Transaction>, CortexError>;
    fn next_tx_id(&self, tenant_id: &TenantId) -> Result<TxId, CortexError>;

    fn put_checkpoint(&self, checkpoint: &MerkleCheckpoint) -> Result<(), CortexError>;
    fn list_checkpoints(&self, tenant_id: &TenantId) -> Result<Vec<MerkleCheckpoint>, CortexError>;
    fn next_checkpoint_id(&self) -> Result<CheckpointId, CortexError>;

    fn put_agent(&self, agent: &Agent) -> Result<(), CortexError>;
    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, CortexError>;

    fn put_vote(&self, vote: &Vote) -> Result<(), CortexError>;
    fn get_vote(&self, fact_id: FactId, agent_id: &AgentId) -> Result<Option<Vote>, CortexError>;
    fn votes_for_fact(&self, fact_id: FactId) -> Result<Vec<Vote>, CortexError>;

    fn record_privacy_event(&self, tenant_id: &TenantId, fact_id: FactId, tier: &str) -> Result<(), CortexError>;

    fn next_fact_id(&self) -> Result<FactId, CortexError>;
}
