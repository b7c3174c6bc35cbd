//! Merkle checkpoint: a periodic commitment over a contiguous range of a
//! tenant's transaction log (`spec.md` §3, entity `Merkle Checkpoint`,
//! and §4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CheckpointId, Hash256, TenantId, TxId};

/// Commitment to transactions `[tx_start, tx_end]` (inclusive) for one
/// tenant, anchored by `root_hash`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MerkleCheckpoint {
    pub id: CheckpointId,
    pub tenant_id: TenantId,
    pub tx_start: TxId,
    pub tx_end: TxId,
    pub root_hash: Hash256,
    pub created_at: DateTime<Utc>,
}

impl MerkleCheckpoint {
    pub fn tx_count(&self) -> u64 {
        self.tx_end.0 - self.tx_start.0 + 1
    }

    pub fn covers(&self, tx_id: TxId) -> bool {
        tx_id.0 >= self.tx_start.0 && tx_id.0 <= self.tx_end.0
    }
}
