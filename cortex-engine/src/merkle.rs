//! Merkle Checkpointer (`spec.md` §4.D): periodic commitments over a
//! tenant's transaction log, with O(log n) inclusion proofs and a
//! verifiable export/import format.

use serde::{Deserialize, Serialize};

use crate::error::CortexError;
use crate::types::{Hash256, Transaction, TxId};

fn leaf_hash(tx: &Transaction) -> Hash256 {
    tx.hash
}

fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(left.as_bytes());
    bytes.extend_from_slice(right.as_bytes());
    Hash256::compute(&bytes)
}

/// A complete Merkle tree over one checkpoint's transactions, kept in
/// memory only long enough to compute the root and answer inclusion
/// proofs; only the root is persisted in [`crate::types::MerkleCheckpoint`].
pub struct MerkleTree {
    /// Levels from leaves (`levels[0]`) to root (`levels.last()`).
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Builds a tree over `txs`, in order. Duplicates the last node at
    /// each level when the level has an odd count, per `spec.md` §4.D.
    pub fn build(txs: &[Transaction]) -> Result<Self, CortexError> {
        if txs.is_empty() {
            return Err(CortexError::EncodingError(
                "cannot build a merkle tree over zero transactions".to_string(),
            ));
        }

        let mut level: Vec<Hash256> = txs.iter().map(leaf_hash).collect();
        let mut levels = vec![level.clone()];

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let hash = match pair {
                    [l, r] => node_hash(l, r),
                    [l] => node_hash(l, l),
                    _ => unreachable!(),
                };
                next.push(hash);
            }
            levels.push(next.clone());
            level = next;
        }

        Ok(MerkleTree { levels })
    }

    pub fn root(&self) -> Hash256 {
        *self.levels.last().expect("a built tree always has at least one level").first().expect("root level has exactly one node")
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Builds an inclusion proof for the leaf at `index`: the sibling
    /// hash at each level from leaf to root, plus which side the sibling
    /// is on.
    pub fn prove(&self, index: usize) -> Result<InclusionProof, CortexError> {
        if index >= self.leaf_count() {
            return Err(CortexError::EncodingError(format!(
                "leaf index {index} out of range for tree with {} leaves",
                self.leaf_count()
            )));
        }

        let mut siblings = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 {
                if idx + 1 < level.len() { idx + 1 } else { idx }
            } else {
                idx - 1
            };
            let on_right = sibling_idx > idx;
            siblings.push((level[sibling_idx], on_right));
            idx /= 2;
        }

        Ok(InclusionProof {
            leaf: self.levels[0][index],
            siblings,
            root: self.root(),
        })
    }
}

/// A path of sibling hashes from a leaf up to a checkpoint's root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf: Hash256,
    /// `(sibling_hash, sibling_is_on_the_right)` at each level.
    pub siblings: Vec<(Hash256, bool)>,
    pub root: Hash256,
}

impl InclusionProof {
    /// Recomputes the root from `self.leaf` and `self.siblings` and
    /// checks it matches `self.root`.
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        for (sibling, sibling_on_right) in &self.siblings {
            current = if *sibling_on_right {
                node_hash(&current, sibling)
            } else {
                node_hash(sibling, &current)
            };
        }
        current.as_bytes() == self.root.as_bytes()
    }
}

/// Manifest accompanying a verifiable export: the checkpoint root plus
/// the SHA-256 hash of the exported file, so an importer can detect
/// transport corruption before trusting the contents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportManifest {
    pub tenant_id: String,
    pub tx_start: TxId,
    pub tx_end: TxId,
    pub root_hash: Hash256,
    pub file_hash: Hash256,
}

/// Serializes `txs` plus a manifest binding them to `root`, for transfer
/// to another node or offline storage.
pub fn export_verifiable(tenant_id: &str, txs: &[Transaction], root: Hash256) -> Result<(Vec<u8>, ExportManifest), CortexError> {
    let body = serde_json::to_vec(txs).map_err(|e| CortexError::EncodingError(e.to_string()))?;
    let file_hash = Hash256::compute(&body);
    let manifest = ExportManifest {
        tenant_id: tenant_id.to_string(),
        tx_start: txs.first().map(|t| t.id).unwrap_or(TxId(0)),
        tx_end: txs.last().map(|t| t.id).unwrap_or(TxId(0)),
        root_hash: root,
        file_hash,
    };
    Ok((body, manifest))
}

/// Verifies `body` against `manifest` (file hash, then Merkle root) and
/// returns the decoded transactions on success.
pub fn import_verifiable(body: &[u8], manifest: &ExportManifest) -> Result<Vec<Transaction>, CortexError> {
    let file_hash = Hash256::compute(body);
    if file_hash.as_bytes() != manifest.file_hash.as_bytes() {
        return Err(CortexError::EncodingError(
            "exported file hash does not match manifest; transport likely corrupted the payload".to_string(),
        ));
    }

    let txs: Vec<Transaction> = serde_json::from_slice(body).map_err(|e| CortexError::EncodingError(e.to_string()))?;
    if txs.is_empty() {
        return Ok(txs);
    }

    let tree = MerkleTree::build(&txs)?;
    if tree.root().as_bytes() != manifest.root_hash.as_bytes() {
        return Err(CortexError::MerkleMismatch { tx_id: manifest.tx_end });
    }

    Ok(txs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FactId, TenantId, TxAction};
    use chrono::Utc;

    fn dummy_tx(id: u64) -> Transaction {
        Transaction {
            id: TxId(id),
            tenant_id: TenantId::new("t1"),
            action: TxAction::Create { fact_id: FactId(id) },
            timestamp: Utc::now(),
            prev_hash: Hash256::genesis(),
            hash: Hash256::compute(format!("tx-{id}").as_bytes()),
        }
    }

    #[test]
    fn tree_with_odd_leaf_count_duplicates_last_node() {
        let txs: Vec<Transaction> = (0..3).map(dummy_tx).collect();
        let tree = MerkleTree::build(&txs).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        // Deterministic root across rebuilds.
        let tree2 = MerkleTree::build(&txs).unwrap();
        assert_eq!(tree.root().as_bytes(), tree2.root().as_bytes());
    }

    #[test]
    fn inclusion_proof_verifies_for_every_leaf() {
        let txs: Vec<Transaction> = (0..7).map(dummy_tx).collect();
        let tree = MerkleTree::build(&txs).unwrap();
        for i in 0..tree.leaf_count() {
            let proof = tree.prove(i).unwrap();
            assert!(proof.verify(), "proof for leaf {i} should verify");
        }
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let txs: Vec<Transaction> = (0..4).map(dummy_tx).collect();
        let tree = MerkleTree::build(&txs).unwrap();
        let mut proof = tree.prove(0).unwrap();
        proof.leaf = Hash256::compute(b"tampered");
        assert!(!proof.verify());
    }

    #[test]
    fn export_then_import_roundtrips() {
        let txs: Vec<Transaction> = (0..5).map(dummy_tx).collect();
        let tree = MerkleTree::build(&txs).unwrap();
        let (body, manifest) = export_verifiable("t1", &txs, tree.root()).unwrap();

        let imported = import_verifiable(&body, &manifest).unwrap();
        assert_eq!(imported.len(), txs.len());
    }

    #[test]
    fn import_rejects_corrupted_body() {
        let txs: Vec<Transaction> = (0..3).map(dummy_tx).collect();
        let tree = MerkleTree::build(&txs).unwrap();
        let (mut body, manifest) = export_verifiable("t1", &txs, tree.root()).unwrap();
        body.push(b'!');

        let err = import_verifiable(&body, &manifest).unwrap_err();
        assert!(matches!(err, CortexError::EncodingError(_)));
    }
}
