//! Closed error taxonomy for the engine (`spec.md` §7, Error Handling
//! Design). Every fallible public operation returns `Result<T,
//! CortexError>`; there is no `anyhow`-style catch-all.

use thiserror::Error;

use crate::types::{AgentId, FactId, TenantId, TxId};

/// The full set of error kinds an engine operation can surface.
#[derive(Error, Debug)]
pub enum CortexError {
    /// A request was missing a required `tenant_id`, or its `tenant_id`
    /// did not match the resource it targeted. Fatal: always logged and
    /// recorded as an audit transaction.
    #[error("tenant isolation violation: {reason}")]
    TenantIsolationError { reason: String },

    /// Canonical encoding failed: non-UTF-8 content, a non-UTC timestamp,
    /// or a value outside the canonicalizer's representable range.
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// An immutable fact type (`axiom`, `decision`) was resubmitted with
    /// identical content within the same `(tenant, project)`.
    #[error("conflict: fact already exists with hash {content_hash}")]
    Conflict { content_hash: String, existing_fact_id: FactId },

    /// The requested resource does not exist for the given tenant.
    #[error("not found: {resource} {id}")]
    NotFound { resource: &'static str, id: String },

    /// Hash-chain verification failed: `prev_hash` did not match the
    /// previous transaction's `hash` for a tenant's chain.
    #[error("chain break for tenant {tenant_id} at tx {tx_id}")]
    ChainBreak { tenant_id: TenantId, tx_id: TxId },

    /// A Merkle inclusion proof or checkpoint root did not verify.
    #[error("merkle mismatch in checkpoint covering tx range ending at {tx_id}")]
    MerkleMismatch { tx_id: TxId },

    /// Consensus did not reach the configured quorum before a vote
    /// window closed.
    #[error("quorum unmet for fact {fact_id}: got {votes}, need {quorum}")]
    QuorumUnmet { fact_id: FactId, votes: usize, quorum: usize },

    /// The embedding for a fact has not yet been computed; callers may
    /// retry once the async embedding path completes.
    #[error("embedding deferred for fact {0}")]
    EmbeddingDeferred(FactId),

    /// One retrieval channel (full-text or vector) failed or timed out
    /// but the other produced results; hybrid search returns the partial
    /// result set rather than failing outright.
    #[error("search partial: {failed_channel} channel unavailable")]
    SearchPartial { failed_channel: &'static str },

    /// A bounded resource (writer queue, working window) is at capacity.
    #[error("busy: {resource} at capacity")]
    Busy { resource: &'static str },

    /// An operation did not complete before its deadline.
    #[error("timeout waiting on {operation}")]
    Timeout { operation: &'static str },

    /// The Privacy Shield found a Critical-tier secret and refused to
    /// route the content anywhere but local storage.
    #[error("privacy blocked: {tier} tier match")]
    PrivacyBlocked { tier: &'static str },

    /// Invalid or missing configuration at startup.
    #[error("config error: {0}")]
    ConfigError(String),

    /// An agent referenced by a vote is unknown or inactive.
    #[error("unknown or inactive agent {0}")]
    UnknownAgent(AgentId),

    /// Underlying storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CortexError {
    /// Whether this error kind is fatal and must be both logged at
    /// `error!` and appended to the ledger as an audit transaction,
    /// per §7's propagation rules. Consulted by
    /// [`crate::ledger::LedgerFacade::audit_if_fatal`] before it appends
    /// a [`crate::types::TxAction::Audit`] transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CortexError::TenantIsolationError { .. }
                | CortexError::ChainBreak { .. }
                | CortexError::MerkleMismatch { .. }
        )
    }

    /// Stable snake_case label for this error kind, used as
    /// `TxAction::Audit::error_kind` so audit transactions are
    /// machine-filterable without parsing the display string.
    pub fn kind_str(&self) -> &'static str {
        match self {
            CortexError::TenantIsolationError { .. } => "tenant_isolation_error",
            CortexError::EncodingError(_) => "encoding_error",
            CortexError::Conflict { .. } => "conflict",
            CortexError::NotFound { .. } => "not_found",
            CortexError::ChainBreak { .. } => "chain_break",
            CortexError::MerkleMismatch { .. } => "merkle_mismatch",
            CortexError::QuorumUnmet { .. } => "quorum_unmet",
            CortexError::EmbeddingDeferred(_) => "embedding_deferred",
            CortexError::SearchPartial { .. } => "search_partial",
            CortexError::Busy { .. } => "busy",
            CortexError::Timeout { .. } => "timeout",
            CortexError::PrivacyBlocked { .. } => "privacy_blocked",
            CortexError::ConfigError(_) => "config_error",
            CortexError::UnknownAgent(_) => "unknown_agent",
            CortexError::Storage(_) => "storage",
        }
    }
}

impl From<rocksdb::Error> for CortexError {
    fn from(e: rocksdb::Error) -> Self {
        CortexError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_isolation_and_chain_break_are_fatal() {
        let e = CortexError::TenantIsolationError { reason: "missing tenant_id".to_string() };
        assert!(e.is_fatal());

        let e = CortexError::ChainBreak { tenant_id: TenantId::new("t1"), tx_id: TxId(1) };
        assert!(e.is_fatal());
    }

    #[test]
    fn busy_is_not_fatal() {
        let e = CortexError::Busy { resource: "writer_queue" };
        assert!(!e.is_fatal());
    }

    #[test]
    fn kind_str_matches_fatal_variants() {
        let e = CortexError::ChainBreak { tenant_id: TenantId::new("t1"), tx_id: TxId(1) };
        assert_eq!(e.kind_str(), "chain_break");

        let e = CortexError::MerkleMismatch { tx_id: TxId(1) };
        assert_eq!(e.kind_str(), "merkle_mismatch");
    }
}
