//! Transaction: the hash-chained, append-only ledger entry (`spec.md` §3,
//! entity `Transaction`, invariant 2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, FactId, Hash256, TenantId, TxId};

/// Kind of mutation a transaction records. Every write to a fact's state
/// (not just creation) appears as its own transaction, so the chain is a
/// complete audit trail rather than a snapshot log.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TxAction {
    Create { fact_id: FactId },
    Deprecate { fact_id: FactId, reason: String },
    Vote { fact_id: FactId, agent_id: AgentId, value: i8 },
    ConfidenceTransition { fact_id: FactId, from: String, to: String },
    /// Post-hoc EMA reputation adjustment for one agent, appended
    /// alongside the confidence-transition vote that triggered it
    /// (`spec.md` §4.I). Scores are canonical decimal strings, not
    /// floats, so the transaction hashes deterministically.
    ReputationUpdate { agent_id: AgentId, old_score: String, new_score: String },
    Checkpoint { checkpoint_id: super::CheckpointId },
    /// A fatal error (`TenantIsolationError`, `ChainBreak`, `MerkleMismatch`)
    /// recorded as a chain-linked ledger entry rather than a RAM-only log
    /// line, per `spec.md` §7/§9: "audit events are transactions in the
    /// ledger, not RAM lists".
    Audit { error_kind: &'static str, detail: String },
}

impl TxAction {
    pub fn fact_id(&self) -> Option<FactId> {
        match self {
            TxAction::Create { fact_id }
            | TxAction::Deprecate { fact_id, .. }
            | TxAction::Vote { fact_id, .. }
            | TxAction::ConfidenceTransition { fact_id, .. } => Some(*fact_id),
            TxAction::ReputationUpdate { .. } | TxAction::Checkpoint { .. } | TxAction::Audit { .. } => None,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            TxAction::Create { .. } => "create",
            TxAction::Deprecate { .. } => "deprecate",
            TxAction::Vote { .. } => "vote",
            TxAction::ConfidenceTransition { .. } => "confidence_transition",
            TxAction::ReputationUpdate { .. } => "reputation_update",
            TxAction::Checkpoint { .. } => "checkpoint",
            TxAction::Audit { .. } => "audit",
        }
    }
}

/// A single hash-chained ledger entry. `prev_hash` links to the previous
/// transaction committed for the same tenant; `hash` is computed over the
/// canonical encoding of every other field (see `canonical` module).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub tenant_id: TenantId,
    pub action: TxAction,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: Hash256,
    pub hash: Hash256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_str_matches_variant() {
        let a = TxAction::Create { fact_id: FactId(1) };
        assert_eq!(a.kind_str(), "create");
        assert_eq!(a.fact_id(), Some(FactId(1)));
    }

    #[test]
    fn checkpoint_action_has_no_fact_id() {
        let a = TxAction::Checkpoint { checkpoint_id: super::super::CheckpointId(1) };
        assert_eq!(a.fact_id(), None);
    }
}
