//! Merkle Checkpointer service (`spec.md` §4.D): ties [`crate::merkle`]'s
//! tree math to a [`LedgerStore`] and a tenant's [`ChainLocks`] handle,
//! so sealing a batch of transactions and verifying a tenant's sealed
//! history both go through one place.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::CheckpointConfig;
use crate::error::CortexError;
use crate::ledger::chain_lock::ChainLocks;
use crate::ledger::store::LedgerStore;
use crate::merkle::{self, ExportManifest, InclusionProof, MerkleTree};
use crate::types::{CheckpointId, MerkleCheckpoint, TenantId, TxId};

/// Result of [`MerkleCheckpointer::verify`]: whether every sealed
/// checkpoint for a tenant still matches its recomputed root, and the
/// first one that doesn't.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointVerification {
    pub valid: bool,
    pub first_divergence: Option<CheckpointId>,
}

/// Periodic, and on-demand, sealing of a tenant's transaction log into
/// Merkle checkpoints (`spec.md` §4.D).
pub struct MerkleCheckpointer {
    config: CheckpointConfig,
    store: Arc<dyn LedgerStore>,
    locks: Arc<ChainLocks>,
}

impl MerkleCheckpointer {
    pub fn new(config: CheckpointConfig, store: Arc<dyn LedgerStore>, locks: Arc<ChainLocks>) -> Self {
        Self { config, store, locks }
    }

    /// Seals every full batch of `batch_size` pending transactions for
    /// `tenant_id` (`spec.md` §4.D: "trigger... when pending_tx_count ≥
    /// 1000"). A tenant that commits faster than this is polled gets
    /// more than one checkpoint out of a single call, each covering
    /// exactly `batch_size` transactions — no early, no late.
    pub async fn maybe_checkpoint(&self, tenant_id: &TenantId, now: DateTime<Utc>) -> Result<Vec<CheckpointId>, CortexError> {
        let lock = self.locks.handle(tenant_id);
        let _guard = lock.lock().await;

        let mut created = Vec::new();
        loop {
            let next_start = self.next_range_start(tenant_id)?;
            let available = match self.store.last_transaction(tenant_id)? {
                Some(tx) => tx.id.0,
                None => return Ok(created),
            };
            if available < next_start {
                return Ok(created);
            }
            let pending = available - next_start + 1;
            if pending < self.config.batch_size {
                return Ok(created);
            }

            let end = TxId(next_start + self.config.batch_size - 1);
            match self.seal_range(tenant_id, TxId(next_start), end, now)? {
                Some(id) => created.push(id),
                None => return Ok(created),
            }
        }
    }

    /// `create_checkpoint(tenant)`: explicit, out-of-band sealing of
    /// whatever is currently pending, even if it falls short of
    /// `batch_size`. Returns `None` if nothing is pending.
    pub async fn create_checkpoint(&self, tenant_id: &TenantId, now: DateTime<Utc>) -> Result<Option<CheckpointId>, CortexError> {
        let lock = self.locks.handle(tenant_id);
        let _guard = lock.lock().await;

        let next_start = self.next_range_start(tenant_id)?;
        let end = match self.store.last_transaction(tenant_id)? {
            Some(tx) if tx.id.0 >= next_start => tx.id,
            _ => return Ok(None),
        };
        self.seal_range(tenant_id, TxId(next_start), end, now)
    }

    fn next_range_start(&self, tenant_id: &TenantId) -> Result<u64, CortexError> {
        let checkpoints = self.store.list_checkpoints(tenant_id)?;
        Ok(checkpoints.iter().map(|c| c.tx_end.0 + 1).max().unwrap_or(1))
    }

    fn seal_range(&self, tenant_id: &TenantId, start: TxId, end: TxId, now: DateTime<Utc>) -> Result<Option<CheckpointId>, CortexError> {
        let txs = self.store.transactions_in_range(tenant_id, start, end)?;
        if txs.is_empty() {
            return Ok(None);
        }

        let tree = MerkleTree::build(&txs)?;
        let id = self.store.next_checkpoint_id()?;
        let checkpoint = MerkleCheckpoint {
            id,
            tenant_id: tenant_id.clone(),
            tx_start: start,
            tx_end: end,
            root_hash: tree.root(),
            created_at: now,
        };
        self.store.put_checkpoint(&checkpoint)?;
        Ok(Some(id))
    }

    /// `verify(tenant)`: recomputes every stored checkpoint's root from
    /// its transaction range and compares to `root_hash`, stopping at
    /// the first divergence.
    pub fn verify(&self, tenant_id: &TenantId) -> Result<CheckpointVerification, CortexError> {
        let mut checkpoints = self.store.list_checkpoints(tenant_id)?;
        checkpoints.sort_by_key(|c| c.tx_start.0);

        for checkpoint in &checkpoints {
            let txs = self.store.transactions_in_range(tenant_id, checkpoint.tx_start, checkpoint.tx_end)?;
            if txs.is_empty() {
                return Ok(CheckpointVerification { valid: false, first_divergence: Some(checkpoint.id) });
            }
            let tree = MerkleTree::build(&txs)?;
            if tree.root().as_bytes() != checkpoint.root_hash.as_bytes() {
                return Ok(CheckpointVerification { valid: false, first_divergence: Some(checkpoint.id) });
            }
        }

        Ok(CheckpointVerification { valid: true, first_divergence: None })
    }

    /// An O(log n) inclusion proof for `tx_id`, built from the
    /// checkpoint that covers it.
    pub fn inclusion_proof(&self, tenant_id: &TenantId, tx_id: TxId) -> Result<InclusionProof, CortexError> {
        let checkpoints = self.store.list_checkpoints(tenant_id)?;
        let checkpoint = checkpoints
            .into_iter()
            .find(|c| c.covers(tx_id))
            .ok_or(CortexError::MerkleMismatch { tx_id })?;

        let txs = self.store.transactions_in_range(tenant_id, checkpoint.tx_start, checkpoint.tx_end)?;
        let tree = MerkleTree::build(&txs)?;
        let index = (tx_id.0 - checkpoint.tx_start.0) as usize;
        tree.prove(index)
    }

    /// `export_verifiable(tenant, from, to)`: blob plus manifest over an
    /// arbitrary transaction range, independent of checkpoint
    /// boundaries.
    pub fn export_verifiable(&self, tenant_id: &TenantId, from: TxId, to: TxId) -> Result<(Vec<u8>, ExportManifest), CortexError> {
        let txs = self.store.transactions_in_range(tenant_id, from, to)?;
        if txs.is_empty() {
            return Err(CortexError::EncodingError("no transactions in the requested export range".to_string()));
        }
        let tree = MerkleTree::build(&txs)?;
        merkle::export_verifiable(tenant_id.as_str(), &txs, tree.root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical;
    use crate::ledger::InMemoryLedger;
    use crate::types::{FactId, Hash256, Transaction, TxAction};

    fn tx(id: u64, tenant: &str, prev: Hash256) -> Transaction {
        let mut t = Transaction {
            id: TxId(id),
            tenant_id: TenantId::new(tenant),
            action: TxAction::Create { fact_id: FactId(id) },
            timestamp: Utc::now(),
            prev_hash: prev,
            hash: Hash256::genesis(),
        };
        t.hash = canonical::tx_hash(&t).unwrap();
        t
    }

    fn seed(store: &Arc<dyn LedgerStore>, tenant: &str, count: u64) {
        let mut prev = Hash256::genesis();
        for i in 1..=count {
            let t = tx(i, tenant, prev);
            prev = t.hash;
            store.append_transaction(&t).unwrap();
        }
    }

    #[tokio::test]
    async fn maybe_checkpoint_is_a_noop_below_batch_size() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        seed(&store, "t1", 5);
        let checkpointer = MerkleCheckpointer::new(
            CheckpointConfig { batch_size: 10, ..Default::default() },
            store,
            Arc::new(ChainLocks::new()),
        );

        let created = checkpointer.maybe_checkpoint(&TenantId::new("t1"), Utc::now()).await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn maybe_checkpoint_seals_every_full_batch() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        seed(&store, "t1", 25);
        let checkpointer = MerkleCheckpointer::new(
            CheckpointConfig { batch_size: 10, ..Default::default() },
            store.clone(),
            Arc::new(ChainLocks::new()),
        );

        let created = checkpointer.maybe_checkpoint(&TenantId::new("t1"), Utc::now()).await.unwrap();
        assert_eq!(created.len(), 2, "25 pending at batch_size 10 seals exactly two full batches");

        let checkpoints = store.list_checkpoints(&TenantId::new("t1")).unwrap();
        assert_eq!(checkpoints[0].tx_start, TxId(1));
        assert_eq!(checkpoints[0].tx_end, TxId(10));
        assert_eq!(checkpoints[1].tx_start, TxId(11));
        assert_eq!(checkpoints[1].tx_end, TxId(20));
    }

    #[tokio::test]
    async fn verify_detects_a_root_that_no_longer_matches_its_range() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        seed(&store, "t1", 10);
        let checkpointer = MerkleCheckpointer::new(CheckpointConfig { batch_size: 10, ..Default::default() }, store.clone(), Arc::new(ChainLocks::new()));
        checkpointer.create_checkpoint(&TenantId::new("t1"), Utc::now()).await.unwrap();

        assert!(checkpointer.verify(&TenantId::new("t1")).unwrap().valid);

        // Tamper the stored checkpoint's root directly.
        let mut checkpoints = store.list_checkpoints(&TenantId::new("t1")).unwrap();
        checkpoints[0].root_hash = Hash256::compute(b"tampered");
        store.put_checkpoint(&checkpoints[0]).unwrap();

        let result = checkpointer.verify(&TenantId::new("t1")).unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_divergence, Some(checkpoints[0].id));
    }

    #[tokio::test]
    async fn inclusion_proof_verifies_for_a_checkpointed_transaction() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        seed(&store, "t1", 10);
        let checkpointer = MerkleCheckpointer::new(CheckpointConfig { batch_size: 10, ..Default::default() }, store, Arc::new(ChainLocks::new()));
        checkpointer.create_checkpoint(&TenantId::new("t1"), Utc::now()).await.unwrap();

        let proof = checkpointer.inclusion_proof(&TenantId::new("t1"), TxId(3)).unwrap();
        assert!(proof.verify());
    }

    #[tokio::test]
    async fn export_verifiable_roundtrips_through_import() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        seed(&store, "t1", 5);
        let checkpointer = MerkleCheckpointer::new(CheckpointConfig::default(), store, Arc::new(ChainLocks::new()));

        let (body, manifest) = checkpointer.export_verifiable(&TenantId::new("t1"), TxId(1), TxId(5)).unwrap();
        let imported = merkle::import_verifiable(&body, &manifest).unwrap();
        assert_eq!(imported.len(), 5);
    }
}
