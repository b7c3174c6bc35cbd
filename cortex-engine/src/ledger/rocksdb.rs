//! RocksDB-backed ledger store.
//!
//! Persists every table named in `spec.md` §6 as its own column family.
//! RocksDB's WAL plus its single-writer/multi-reader `DB` handle give us
//! the "single relational store... WAL mode, single-writer, concurrent
//! readers" requirement without introducing a SQL engine; a tenant's
//! transaction log is simply the ordered set of keys under its prefix in
//! the `transactions` column family.
//!
//! Values are encoded with `serde_json`, the same encoder the
//! canonicalizer uses for hashing (kept as one encoder rather than
//! introducing a second binary format purely for storage).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, Options};

use crate::config::StorageConfig;
use crate::error::CortexError;
use crate::types::{Agent, AgentId, CheckpointId, Fact, FactId, MerkleCheckpoint, TenantId, Transaction, TxId, Vote};

use super::store::LedgerStore;

const CF_FACTS: &str = "facts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_MERKLE_ROOTS: &str = "merkle_roots";
const CF_CONSENSUS_VOTES: &str = "consensus_votes";
const CF_AGENTS: &str = "agents";
const CF_PRIVACY_EVENTS: &str = "privacy_events";
const CF_META: &str = "meta";

/// RocksDB-backed implementation of [`LedgerStore`].
pub struct RocksDbLedger {
    db: DB,
    next_fact_id: AtomicU64,
    next_checkpoint_id: AtomicU64,
}

impl RocksDbLedger {
    /// Opens (or creates) a ledger database at `cfg.path`, creating every
    /// column family this backend needs.
    pub fn open(cfg: &StorageConfig) -> Result<Self, CortexError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_FACTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_MERKLE_ROOTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_CONSENSUS_VOTES, Options::default()),
            ColumnFamilyDescriptor::new(CF_AGENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_PRIVACY_EVENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        let next_fact_id = load_counter(&db, b"next_fact_id")?;
        let next_checkpoint_id = load_counter(&db, b"next_checkpoint_id")?;

        Ok(Self {
            db,
            next_fact_id: AtomicU64::new(next_fact_id),
            next_checkpoint_id: AtomicU64::new(next_checkpoint_id),
        })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, CortexError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CortexError::Storage(format!("missing column family '{name}'")))
    }

    fn put_json<T: serde::Serialize>(&self, cf_name: &'static str, key: &[u8], value: &T) -> Result<(), CortexError> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value).map_err(|e| CortexError::EncodingError(e.to_string()))?;
        self.db.put_cf(&cf, key, bytes)?;
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, cf_name: &'static str, key: &[u8]) -> Result<Option<T>, CortexError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            None => Ok(None),
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| CortexError::EncodingError(e.to_string()))?;
                Ok(Some(value))
            }
        }
    }

    fn scan_prefix<T: serde::de::DeserializeOwned>(&self, cf_name: &'static str, prefix: &[u8]) -> Result<Vec<T>, CortexError> {
        let cf = self.cf(cf_name)?;
        let mut out = Vec::new();
        let iter = self.db.prefix_iterator_cf(&cf, prefix);
        for item in iter {
            let (key, value) = item.map_err(CortexError::from)?;
            if !key.starts_with(prefix) {
                break;
            }
            let decoded: T = serde_json::from_slice(&value).map_err(|e| CortexError::EncodingError(e.to_string()))?;
            out.push(decoded);
        }
        Ok(out)
    }
}

fn load_counter(db: &DB, key: &[u8]) -> Result<u64, CortexError> {
    let cf = db
        .cf_handle(CF_META)
        .ok_or_else(|| CortexError::Storage("missing column family 'meta'".to_string()))?;
    match db.get_cf(&cf, key)? {
        None => Ok(0),
        Some(bytes) if bytes.len() == 8 => {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes);
            Ok(u64::from_be_bytes(arr))
        }
        Some(_) => Err(CortexError::Storage(format!(
            "corrupted counter at meta key {}",
            String::from_utf8_lossy(key)
        ))),
    }
}

fn fact_key(tenant_id: &TenantId, fact_id: FactId) -> Vec<u8> {
    format!("{}:{:020}", tenant_id.as_str(), fact_id.0).into_bytes()
}

fn tenant_prefix(tenant_id: &TenantId) -> Vec<u8> {
    format!("{}:", tenant_id.as_str()).into_bytes()
}

fn tx_key(tenant_id: &TenantId, tx_id: TxId) -> Vec<u8> {
    format!("{}:{:020}", tenant_id.as_str(), tx_id.0).into_bytes()
}

fn vote_key(fact_id: FactId, agent_id: &AgentId) -> Vec<u8> {
    format!("{:020}:{}", fact_id.0, agent_id.0).into_bytes()
}

impl LedgerStore for RocksDbLedger {
    fn put_fact(&self, fact: &Fact) -> Result<(), CortexError> {
        self.put_json(CF_FACTS, &fact_key(&fact.tenant_id, fact.id), fact)
    }

    fn get_fact(&self, tenant_id: &TenantId, fact_id: FactId) -> Result<Option<Fact>, CortexError> {
        self.get_json(CF_FACTS, &fact_key(tenant_id, fact_id))
    }

    fn list_facts(&self, tenant_id: &TenantId, project: &str) -> Result<Vec<Fact>, CortexError> {
        let facts: Vec<Fact> = self.scan_prefix(CF_FACTS, &tenant_prefix(tenant_id))?;
        Ok(facts.into_iter().filter(|f| f.project == project).collect())
    }

    fn update_fact(&self, fact: &Fact) -> Result<(), CortexError> {
        self.put_fact(fact)
    }

    fn append_transaction(&self, tx: &Transaction) -> Result<(), CortexError> {
        self.put_json(CF_TRANSACTIONS, &tx_key(&tx.tenant_id, tx.id), tx)
    }

    fn last_transaction(&self, tenant_id: &TenantId) -> Result<Option<Transaction>, CortexError> {
        let txs: Vec<Transaction> = self.scan_prefix(CF_TRANSACTIONS, &tenant_prefix(tenant_id))?;
        Ok(txs.into_iter().max_by_key(|tx| tx.id.0))
    }

    fn transactions_in_range(&self, tenant_id: &TenantId, start: TxId, end: TxId) -> Result<Vec<Transaction>, CortexError> {
        let txs: Vec<Transaction> = self.scan_prefix(CF_TRANSACTIONS, &tenant_prefix(tenant_id))?;
        Ok(txs.into_iter().filter(|tx| tx.id.0 >= start.0 && tx.id.0 <= end.0).collect())
    }

    fn next_tx_id(&self, tenant_id: &TenantId) -> Result<TxId, CortexError> {
        match self.last_transaction(tenant_id)? {
            Some(tx) => Ok(TxId(tx.id.0 + 1)),
            None => Ok(TxId(1)),
        }
    }

    fn put_checkpoint(&self, checkpoint: &MerkleCheckpoint) -> Result<(), CortexError> {
        let key = format!("{}:{:020}", checkpoint.tenant_id.as_str(), checkpoint.id.0).into_bytes();
        self.put_json(CF_MERKLE_ROOTS, &key, checkpoint)?;
        self.db.put_cf(
            &self.cf(CF_META)?,
            b"next_checkpoint_id",
            (checkpoint.id.0 + 1).to_be_bytes(),
        )?;
        Ok(())
    }

    fn list_checkpoints(&self, tenant_id: &TenantId) -> Result<Vec<MerkleCheckpoint>, CortexError> {
        self.scan_prefix(CF_MERKLE_ROOTS, &tenant_prefix(tenant_id))
    }

    fn next_checkpoint_id(&self) -> Result<CheckpointId, CortexError> {
        Ok(CheckpointId(self.next_checkpoint_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn put_agent(&self, agent: &Agent) -> Result<(), CortexError> {
        self.put_json(CF_AGENTS, agent.id.0.as_bytes(), agent)
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, CortexError> {
        self.get_json(CF_AGENTS, agent_id.0.as_bytes())
    }

    fn put_vote(&self, vote: &Vote) -> Result<(), CortexError> {
        self.put_json(CF_CONSENSUS_VOTES, &vote_key(vote.fact_id, &vote.agent_id), vote)
    }

    fn get_vote(&self, fact_id: FactId, agent_id: &AgentId) -> Result<Option<Vote>, CortexError> {
        self.get_json(CF_CONSENSUS_VOTES, &vote_key(fact_id, agent_id))
    }

    fn votes_for_fact(&self, fact_id: FactId) -> Result<Vec<Vote>, CortexError> {
        let prefix = format!("{:020}:", fact_id.0).into_bytes();
        self.scan_prefix(CF_CONSENSUS_VOTES, &prefix)
    }

    fn record_privacy_event(&self, tenant_id: &TenantId, fact_id: FactId, tier: &str) -> Result<(), CortexError> {
        let key = format!("{}:{:020}:{}", tenant_id.as_str(), fact_id.0, tier).into_bytes();
        #[derive(serde::Serialize)]
        struct PrivacyEvent<'a> {
            tenant_id: &'a str,
            fact_id: u64,
            tier: &'a str,
        }
        self.put_json(
            CF_PRIVACY_EVENTS,
            &key,
            &PrivacyEvent { tenant_id: tenant_id.as_str(), fact_id: fact_id.0, tier },
        )
    }

    fn next_fact_id(&self) -> Result<FactId, CortexError> {
        let id = self.next_fact_id.fetch_add(1, Ordering::SeqCst);
        self.db.put_cf(&self.cf(CF_META)?, b"next_fact_id", (id + 1).to_be_bytes())?;
        Ok(FactId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, FactType, Hash256};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RocksDbLedger) {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = StorageConfig {
            path: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        let store = RocksDbLedger::open(&cfg).expect("open rocksdb ledger");
        (tmp, store)
    }

    fn dummy_fact(tenant: &str, id: u64) -> Fact {
        Fact {
            id: FactId(id),
            tenant_id: TenantId::new(tenant),
            project: "proj".to_string(),
            fact_type: FactType::Knowledge,
            content: "hello".to_string(),
            tags: vec![],
            confidence: Confidence::Stated,
            consensus_score: 0.0,
            valid_from: Utc::now(),
            valid_until: None,
            source: "test".to_string(),
            content_hash: Hash256::genesis(),
            prev_hash: Hash256::genesis(),
            sensitive: false,
        }
    }

    #[test]
    fn rocksdb_ledger_roundtrips_fact() {
        let (_tmp, store) = open_store();
        let fact = dummy_fact("t1", 1);
        store.put_fact(&fact).unwrap();

        let fetched = store.get_fact(&TenantId::new("t1"), FactId(1)).unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
    }

    #[test]
    fn fact_ids_persist_across_counter_reloads() {
        let tmp = TempDir::new().unwrap();
        let cfg = StorageConfig { path: tmp.path().to_string_lossy().to_string(), create_if_missing: true };
        {
            let store = RocksDbLedger::open(&cfg).unwrap();
            assert_eq!(store.next_fact_id().unwrap(), FactId(0));
            assert_eq!(store.next_fact_id().unwrap(), FactId(1));
        }
        {
            let store = RocksDbLedger::open(&cfg).unwrap();
            assert_eq!(store.next_fact_id().unwrap(), FactId(2));
        }
    }

    #[test]
    fn next_tx_id_starts_at_one_and_increments() {
        let (_tmp, store) = open_store();
        let tenant = TenantId::new("t1");
        assert_eq!(store.next_tx_id(&tenant).unwrap(), TxId(1));

        let tx = Transaction {
            id: TxId(1),
            tenant_id: tenant.clone(),
            action: crate::types::TxAction::Create { fact_id: FactId(1) },
            timestamp: Utc::now(),
            prev_hash: Hash256::genesis(),
            hash: Hash256::genesis(),
        };
        store.append_transaction(&tx).unwrap();
        assert_eq!(store.next_tx_id(&tenant).unwrap(), TxId(2));
    }
}
