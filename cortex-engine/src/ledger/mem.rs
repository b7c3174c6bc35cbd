//! In-memory ledger store.
//!
//! Useful for unit tests and the demo binary's `--ephemeral` mode. Uses
//! `Mutex`-guarded maps rather than a single outer lock so unrelated
//! tenants don't contend with each other's reads.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CortexError;
use crate::types::{Agent, AgentId, CheckpointId, Fact, FactId, MerkleCheckpoint, TenantId, Transaction, TxId, Vote};

use super::store::LedgerStore;

#[derive(Default)]
pub struct InMemoryLedger {
    facts: Mutex<HashMap<(TenantId, FactId), Fact>>,
    transactions: Mutex<HashMap<TenantId, Vec<Transaction>>>,
    checkpoints: Mutex<HashMap<TenantId, Vec<MerkleCheckpoint>>>,
    agents: Mutex<HashMap<AgentId, Agent>>,
    votes: Mutex<HashMap<(FactId, AgentId), Vote>>,
    privacy_events: Mutex<Vec<(TenantId, FactId, String)>>,
    next_fact_id: Mutex<u64>,
    next_checkpoint_id: Mutex<u64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned() -> CortexError {
    CortexError::Storage("in-memory ledger mutex poisoned".to_string())
}

impl LedgerStore for InMemoryLedger {
    fn put_fact(&self, fact: &Fact) -> Result<(), CortexError> {
        let mut facts = self.facts.lock().map_err(|_| lock_poisoned())?;
        facts.insert((fact.tenant_id.clone(), fact.id), fact.clone());
        Ok(())
    }

    fn get_fact(&self, tenant_id: &TenantId, fact_id: FactId) -> Result<Option<Fact>, CortexError> {
        let facts = self.facts.lock().map_err(|_| lock_poisoned())?;
        Ok(facts.get(&(tenant_id.clone(), fact_id)).cloned())
    }

    fn list_facts(&self, tenant_id: &TenantId, project: &str) -> Result<Vec<Fact>, CortexError> {
        let facts = self.facts.lock().map_err(|_| lock_poisoned())?;
        let mut out: Vec<Fact> = facts
            .values()
            .filter(|f| &f.tenant_id == tenant_id && f.project == project)
            .cloned()
            .collect();
        out.sort_by_key(|f| f.id);
        Ok(out)
    }

    fn update_fact(&self, fact: &Fact) -> Result<(), CortexError> {
        self.put_fact(fact)
    }

    fn append_transaction(&self, tx: &Transaction) -> Result<(), CortexError> {
        let mut transactions = self.transactions.lock().map_err(|_| lock_poisoned())?;
        transactions.entry(tx.tenant_id.clone()).or_default().push(tx.clone());
        Ok(())
    }

    fn last_transaction(&self, tenant_id: &TenantId) -> Result<Option<Transaction>, CortexError> {
        let transactions = self.transactions.lock().map_err(|_| lock_poisoned())?;
        Ok(transactions.get(tenant_id).and_then(|v| v.last().cloned()))
    }

    fn transactions_in_range(&self, tenant_id: &TenantId, start: TxId, end: TxId) -> Result<Vec<Transaction>, CortexError> {
        let transactions = self.transactions.lock().map_err(|_| lock_poisoned())?;
        Ok(transactions
            .get(tenant_id)
            .map(|v| v.iter().filter(|tx| tx.id.0 >= start.0 && tx.id.0 <= end.0).cloned().collect())
            .unwrap_or_default())
    }

    fn next_tx_id(&self, tenant_id: &TenantId) -> Result<TxId, CortexError> {
        let transactions = self.transactions.lock().map_err(|_| lock_poisoned())?;
        let next = transactions.get(tenant_id).map(|v| v.len() as u64 + 1).unwrap_or(1);
        Ok(TxId(next))
    }

    fn put_checkpoint(&self, checkpoint: &MerkleCheckpoint) -> Result<(), CortexError> {
        let mut checkpoints = self.checkpoints.lock().map_err(|_| lock_poisoned())?;
        checkpoints.entry(checkpoint.tenant_id.clone()).or_default().push(checkpoint.clone());
        Ok(())
    }

    fn list_checkpoints(&self, tenant_id: &TenantId) -> Result<Vec<MerkleCheckpoint>, CortexError> {
        let checkpoints = self.checkpoints.lock().map_err(|_| lock_poisoned())?;
        Ok(checkpoints.get(tenant_id).cloned().unwrap_or_default())
    }

    fn next_checkpoint_id(&self) -> Result<CheckpointId, CortexError> {
        let mut next = self.next_checkpoint_id.lock().map_err(|_| lock_poisoned())?;
        let id = *next;
        *next += 1;
        Ok(CheckpointId(id))
    }

    fn put_agent(&self, agent: &Agent) -> Result<(), CortexError> {
        let mut agents = self.agents.lock().map_err(|_| lock_poisoned())?;
        agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, CortexError> {
        let agents = self.agents.lock().map_err(|_| lock_poisoned())?;
        Ok(agents.get(agent_id).cloned())
    }

    fn put_vote(&self, vote: &Vote) -> Result<(), CortexError> {
        let mut votes = self.votes.lock().map_err(|_| lock_poisoned())?;
        votes.insert((vote.fact_id, vote.agent_id.clone()), vote.clone());
        Ok(())
    }

    fn get_vote(&self, fact_id: FactId, agent_id: &AgentId) -> Result<Option<Vote>, CortexError> {
        let votes = self.votes.lock().map_err(|_| lock_poisoned())?;
        Ok(votes.get(&(fact_id, agent_id.clone())).cloned())
    }

    fn votes_for_fact(&self, fact_id: FactId) -> Result<Vec<Vote>, CortexError> {
        let votes = self.votes.lock().map_err(|_| lock_poisoned())?;
        Ok(votes.values().filter(|v| v.fact_id == fact_id).cloned().collect())
    }

    fn record_privacy_event(&self, tenant_id: &TenantId, fact_id: FactId, tier: &str) -> Result<(), CortexError> {
        let mut events = self.privacy_events.lock().map_err(|_| lock_poisoned())?;
        events.push((tenant_id.clone(), fact_id, tier.to_string()));
        Ok(())
    }

    fn next_fact_id(&self) -> Result<FactId, CortexError> {
        let mut next = self.next_fact_id.lock().map_err(|_| lock_poisoned())?;
        let id = *next;
        *next += 1;
        Ok(FactId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, FactType, Hash256};
    use chrono::Utc;

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
    fn put_and_get_fact_roundtrip() {
        let store = InMemoryLedger::new();
        let fact = dummy_fact("t1", 1);
        store.put_fact(&fact).unwrap();

        let fetched = store.get_fact(&TenantId::new("t1"), FactId(1)).unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
    }

    #[test]
    fn list_facts_filters_by_tenant_and_project() {
        let store = InMemoryLedger::new();
        store.put_fact(&dummy_fact("t1", 1)).unwrap();
        store.put_fact(&dummy_fact("t2", 2)).unwrap();

        let facts = store.list_facts(&TenantId::new("t1"), "proj").unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, FactId(1));
    }

    #[test]
    fn fact_ids_are_assigned_monotonically() {
        let store = InMemoryLedger::new();
        let a = store.next_fact_id().unwrap();
        let b = store.next_fact_id().unwrap();
        assert!(b.0 > a.0);
    }

    #[test]
    fn next_tx_id_increments_per_tenant_independently() {
        let store = InMemoryLedger::new();
        let tx = Transaction {
            id: TxId(1),
            tenant_id: TenantId::new("t1"),
            action: crate::types::TxAction::Create { fact_id: FactId(1) },
            timestamp: Utc::now(),
            prev_hash: Hash256::genesis(),
            hash: Hash256::genesis(),
        };
        store.append_transaction(&tx).unwrap();

        assert_eq!(store.next_tx_id(&TenantId::new("t1")).unwrap(), TxId(2));
        assert_eq!(store.next_tx_id(&TenantId::new("t2")).unwrap(), TxId(1));
    }
}
