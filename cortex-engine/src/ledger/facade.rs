//! L3 Event Ledger operations (`spec.md` §4.C): the facts-and-chain API
//! the rest of the engine calls, as opposed to the raw [`LedgerStore`]
//! a backend implements. Ties together the Canonicalizer, the
//! tenant-scoped advisory lock, and the Writer Queue so that id
//! assignment, content hashing, and chain linking happen under one
//! lock per tenant while the actual commit still goes through the
//! single-writer queue.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::error::CortexError;
use crate::ledger::chain_lock::ChainLocks;
use crate::ledger::store::LedgerStore;
use crate::tenant_guard;
use crate::types::{Confidence, Fact, FactDraft, FactId, Hash256, TenantId, Transaction, TxAction, TxId};
use crate::writer_queue::WriterQueue;

/// Result of [`LedgerFacade::verify_chain`]: whether the tenant's
/// transaction log (or the requested sub-range of it) is internally
/// consistent, and the first violation found if not.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChainVerification {
    pub valid: bool,
    pub violations: Vec<ChainViolation>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChainViolation {
    pub id: TxId,
    pub kind: &'static str,
}

/// Cursor-paginated page of facts, per `spec.md` §6's `list_project`
/// contract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FactPage {
    pub items: Vec<Fact>,
    pub next_cursor: Option<String>,
}

/// Filters accepted by [`LedgerFacade::list_project`].
#[derive(Clone, Debug, Default)]
pub struct ListFilters {
    pub confidence: Option<Confidence>,
    pub as_of: Option<DateTime<Utc>>,
    pub limit: usize,
    pub cursor: Option<String>,
}

/// High-level operations over the L3 Event Ledger. Every mutation
/// passes through a tenant's [`ChainLocks`] handle (so id assignment
/// and chain linking are computed under exclusion) and then the
/// [`WriterQueue`] (so the commit itself is ordered with every other
/// mutation for the tenant).
#[derive(Clone)]
pub struct LedgerFacade {
    store: Arc<dyn LedgerStore>,
    queue: Arc<WriterQueue>,
    locks: Arc<ChainLocks>,
}

impl LedgerFacade {
    pub fn new(store: Arc<dyn LedgerStore>, queue: Arc<WriterQueue>, locks: Arc<ChainLocks>) -> Self {
        Self { store, queue, locks }
    }

    /// `store_fact` (`spec.md` §4.C): assigns an id, computes
    /// `content_hash`, checks the `Conflict` rule for immutable fact
    /// types, links the new `CREATE` transaction to the tenant's chain
    /// tip, and commits fact + transaction atomically via the Writer
    /// Queue.
    pub async fn store_fact(&self, draft: FactDraft, now: DateTime<Utc>) -> Result<FactId, CortexError> {
        self.guard_and_audit(&draft.tenant_id, None, now).await?;
        canonical::validate_encodable(&draft.content)?;

        let content_hash = canonical::content_hash_for(
            draft.tenant_id.as_str(),
            &draft.project,
            draft.fact_type.as_str(),
            &draft.content,
            &draft.tags,
            &draft.source,
        )?;

        let lock = self.locks.handle(&draft.tenant_id);
        let _guard = lock.lock().await;

        if draft.fact_type.is_immutable() {
            if let Some(existing) = self.find_duplicate(&draft.tenant_id, &draft.project, &content_hash)? {
                return Err(CortexError::Conflict { content_hash: content_hash.to_hex(), existing_fact_id: existing });
            }
        }

        let fact_id = self.store.next_fact_id()?;
        let tx_id = self.store.next_tx_id(&draft.tenant_id)?;
        let prev_hash = match self.prev_hash_for(&draft.tenant_id, tx_id) {
            Ok(hash) => hash,
            Err(err) => {
                self.audit_if_fatal(&draft.tenant_id, &err, now).await;
                return Err(err);
            }
        };

        let fact = Fact {
            id: fact_id,
            tenant_id: draft.tenant_id.clone(),
            project: draft.project,
            fact_type: draft.fact_type,
            content: draft.content,
            tags: draft.tags,
            confidence: Confidence::Stated,
            consensus_score: 1.0,
            valid_from: draft.valid_from.unwrap_or(now),
            valid_until: draft.valid_until,
            source: draft.source,
            content_hash,
            prev_hash,
            sensitive: draft.sensitive,
        };

        let tx = build_tx(tx_id, draft.tenant_id.clone(), TxAction::Create { fact_id }, now, prev_hash)?;

        let committed_fact = fact.clone();
        self.queue
            .submit_with(tx, move |store| store.put_fact(&committed_fact))
            .await?;

        Ok(fact_id)
    }

    /// `deprecate_fact` (`spec.md` §4.C): sets `valid_until`, appends a
    /// `DEPRECATE` transaction. Does not create a successor fact; the
    /// caller submits one separately via `store_fact` if it needs one,
    /// same as `spec.md` leaves the successor optional ("optionally
    /// creates a successor fact").
    pub async fn deprecate_fact(&self, tenant_id: &TenantId, fact_id: FactId, reason: String, now: DateTime<Utc>) -> Result<(), CortexError> {
        self.guard_and_audit(tenant_id, None, now).await?;

        let lock = self.locks.handle(tenant_id);
        let _guard = lock.lock().await;

        let mut fact = self
            .store
            .get_fact(tenant_id, fact_id)?
            .ok_or_else(|| CortexError::NotFound { resource: "fact", id: fact_id.0.to_string() })?;
        fact.valid_until = Some(now);
        fact.confidence = Confidence::Deprecated;

        let tx_id = self.store.next_tx_id(tenant_id)?;
        let prev_hash = match self.prev_hash_for(tenant_id, tx_id) {
            Ok(hash) => hash,
            Err(err) => {
                self.audit_if_fatal(tenant_id, &err, now).await;
                return Err(err);
            }
        };
        let tx = build_tx(
            tx_id,
            tenant_id.clone(),
            TxAction::Deprecate { fact_id, reason },
            now,
            prev_hash,
        )?;

        self.queue.submit_with(tx, move |store| store.update_fact(&fact)).await
    }

    /// `get_fact` (`spec.md` §4.C): tenant-scoped point lookup,
    /// optionally evaluated `as_of` a past timestamp via the temporal
    /// predicate on [`Fact::active_as_of`].
    pub fn get_fact(&self, tenant_id: &TenantId, fact_id: FactId, as_of: Option<DateTime<Utc>>) -> Result<Fact, CortexError> {
        tenant_guard::guard(tenant_id, None)?;

        let fact = self
            .store
            .get_fact(tenant_id, fact_id)?
            .ok_or_else(|| CortexError::NotFound { resource: "fact", id: fact_id.0.to_string() })?;

        tenant_guard::guard(tenant_id, Some(&fact.tenant_id))?;

        if let Some(as_of) = as_of {
            if !fact.active_as_of(as_of) {
                return Err(CortexError::NotFound { resource: "fact", id: fact_id.0.to_string() });
            }
        }

        Ok(fact)
    }

    /// `list_project` (`spec.md` §4.C, §6): paginated, tenant-scoped
    /// listing filtered by confidence and/or an `as_of` timestamp. The
    /// cursor is simply the last-seen `fact_id` rendered as a string;
    /// callers treat it as opaque.
    pub fn list_project(&self, tenant_id: &TenantId, project: &str, filters: ListFilters) -> Result<FactPage, CortexError> {
        tenant_guard::guard(tenant_id, None)?;

        let mut facts = self.store.list_facts(tenant_id, project)?;
        facts.sort_by_key(|f| f.id);

        if let Some(confidence) = filters.confidence {
            facts.retain(|f| f.confidence == confidence);
        }
        if let Some(as_of) = filters.as_of {
            facts.retain(|f| f.active_as_of(as_of));
        }

        let after: Option<u64> = filters.cursor.as_deref().and_then(|c| c.parse().ok());
        if let Some(after) = after {
            facts.retain(|f| f.id.0 > after);
        }

        let limit = if filters.limit == 0 { 50 } else { filters.limit };
        let next_cursor = if facts.len() > limit { Some(facts[limit - 1].id.0.to_string()) } else { None };
        facts.truncate(limit);

        Ok(FactPage { items: facts, next_cursor })
    }

    /// `verify_chain` (`spec.md` §4.C): recomputes every transaction
    /// hash in `[from, to]` (defaulting to the tenant's whole log) and
    /// checks `prev_hash` linkage, returning the first violation found
    /// rather than every one (`spec.md` §8 Scenario 1).
    pub fn verify_chain(&self, tenant_id: &TenantId, from: Option<TxId>, to: Option<TxId>) -> Result<ChainVerification, CortexError> {
        tenant_guard::guard(tenant_id, None)?;

        let end = match to {
            Some(t) => t,
            None => match self.store.last_transaction(tenant_id)? {
                Some(tx) => tx.id,
                None => return Ok(ChainVerification { valid: true, violations: vec![] }),
            },
        };
        let start = from.unwrap_or(TxId(1));

        let mut txs = self.store.transactions_in_range(tenant_id, start, end)?;
        txs.sort_by(|a, b| a.id.0.cmp(&b.id.0));

        let mut expected_prev = if start.0 <= 1 {
            Hash256::genesis()
        } else {
            match self.store.transactions_in_range(tenant_id, TxId(start.0 - 1), TxId(start.0 - 1))?.first() {
                Some(tx) => canonical::tx_hash(tx)?,
                None => Hash256::genesis(),
            }
        };

        for tx in &txs {
            let recomputed = canonical::tx_hash(tx)?;
            if recomputed.as_bytes() != tx.hash.as_bytes() {
                return Ok(ChainVerification { valid: false, violations: vec![ChainViolation { id: tx.id, kind: "hash_mismatch" }] });
            }
            if tx.prev_hash.as_bytes() != expected_prev.as_bytes() {
                return Ok(ChainVerification { valid: false, violations: vec![ChainViolation { id: tx.id, kind: "chain_break" }] });
            }
            expected_prev = recomputed;
        }

        Ok(ChainVerification { valid: true, violations: vec![] })
    }

    /// Generic chain-linked commit for callers outside the fact CRUD
    /// path (consensus votes, reputation updates, checkpoints): takes
    /// the tenant's chain lock, assigns the next `tx_id`, links
    /// `prev_hash` to the tip, and submits `action` together with
    /// whatever store mutation `apply` performs, through the same
    /// Writer Queue every other commit goes through.
    pub async fn append_transaction<F>(&self, tenant_id: &TenantId, action: TxAction, now: DateTime<Utc>, apply: F) -> Result<Transaction, CortexError>
    where
        F: FnOnce(&Arc<dyn LedgerStore>) -> Result<(), CortexError> + Send + 'static,
    {
        if let Err(err) = tenant_guard::guard(tenant_id, None) {
            self.audit_if_fatal(tenant_id, &err, now).await;
            return Err(err);
        }

        let lock = self.locks.handle(tenant_id);
        let _guard = lock.lock().await;

        let tx_id = self.store.next_tx_id(tenant_id)?;
        let prev_hash = match self.prev_hash_for(tenant_id, tx_id) {
            Ok(hash) => hash,
            Err(err) => {
                self.audit_if_fatal(tenant_id, &err, now).await;
                return Err(err);
            }
        };
        let tx = build_tx(tx_id, tenant_id.clone(), action, now, prev_hash)?;

        let committed = tx.clone();
        self.queue.submit_with(tx, apply).await?;
        Ok(committed)
    }

    /// Runs [`tenant_guard::guard`] and, on failure, durably records the
    /// violation via [`Self::audit_if_fatal`] before propagating the error.
    /// Used at write-path entry points; read paths (`get_fact`,
    /// `list_project`) keep calling `tenant_guard::guard` directly since
    /// they touch no ledger state worth chain-linking an anomaly onto.
    pub async fn guard_and_audit(&self, tenant_id: &TenantId, resource_tenant: Option<&TenantId>, now: DateTime<Utc>) -> Result<(), CortexError> {
        if let Err(err) = tenant_guard::guard(tenant_id, resource_tenant) {
            self.audit_if_fatal(tenant_id, &err, now).await;
            return Err(err);
        }
        Ok(())
    }

    /// Appends a [`TxAction::Audit`] transaction for `err` if
    /// [`CortexError::is_fatal`], per `spec.md` §7/§9: fatal errors are
    /// chain-linked ledger entries, not RAM-only log lines. Non-fatal
    /// errors are left to ordinary logging at the call site.
    ///
    /// Failure to append the audit transaction itself (e.g. the tenant_id
    /// was empty to begin with, so there is no valid bucket to record
    /// under) is logged and swallowed rather than propagated: callers
    /// already have the original error to return.
    pub async fn audit_if_fatal(&self, tenant_id: &TenantId, err: &CortexError, now: DateTime<Utc>) {
        if !err.is_fatal() {
            return;
        }
        let action = TxAction::Audit { error_kind: err.kind_str(), detail: err.to_string() };
        if let Err(audit_err) = self.append_audit_transaction(tenant_id, action, now).await {
            tracing::error!(error = %audit_err, original = %err, "failed to append audit transaction for a fatal error");
        }
    }

    /// Low-level audit append that bypasses [`Self::prev_hash_for`]'s
    /// freshness check and takes the store's last-seen hash verbatim (or
    /// genesis, if there is none). A chain already flagged as broken must
    /// still be able to record the anomaly rather than refuse to extend
    /// itself, and re-deriving `prev_hash_for`'s own `ChainBreak` here
    /// would recurse back into `audit_if_fatal`.
    async fn append_audit_transaction(&self, tenant_id: &TenantId, action: TxAction, now: DateTime<Utc>) -> Result<Transaction, CortexError> {
        let lock = self.locks.handle(tenant_id);
        let _guard = lock.lock().await;

        let tx_id = self.store.next_tx_id(tenant_id)?;
        let prev_hash = match self.store.last_transaction(tenant_id)? {
            Some(tx) => tx.hash,
            None => Hash256::genesis(),
        };
        let tx = build_tx(tx_id, tenant_id.clone(), action, now, prev_hash)?;
        let committed = tx.clone();
        self.queue.submit_with(tx, |_store| Ok(())).await?;
        Ok(committed)
    }

    fn find_duplicate(&self, tenant_id: &TenantId, project: &str, content_hash: &Hash256) -> Result<Option<FactId>, CortexError> {
        let facts = self.store.list_facts(tenant_id, project)?;
        Ok(facts
            .into_iter()
            .filter(|f| f.is_active())
            .find(|f| f.content_hash.as_bytes() == content_hash.as_bytes())
            .map(|f| f.id))
    }

    /// Resolves the `prev_hash` the next transaction at `tx_id` should
    /// chain onto. Recomputes the last transaction's own hash rather than
    /// trusting its stored `hash` field: if the tip has been tampered
    /// with, extending it with a plausible-looking `prev_hash` would bury
    /// the corruption instead of surfacing it.
    fn prev_hash_for(&self, tenant_id: &TenantId, tx_id: TxId) -> Result<Hash256, CortexError> {
        match self.store.last_transaction(tenant_id)? {
            Some(tx) => {
                let recomputed = canonical::tx_hash(&tx)?;
                if recomputed.as_bytes() != tx.hash.as_bytes() {
                    return Err(CortexError::ChainBreak { tenant_id: tenant_id.clone(), tx_id });
                }
                Ok(recomputed)
            }
            None => Ok(Hash256::genesis()),
        }
    }
}

fn build_tx(id: TxId, tenant_id: TenantId, action: TxAction, timestamp: DateTime<Utc>, prev_hash: Hash256) -> Result<Transaction, CortexError> {
    let mut tx = Transaction { id, tenant_id, action, timestamp, prev_hash, hash: Hash256::genesis() };
    tx.hash = canonical::tx_hash(&tx)?;
    Ok(tx)
}

/// Ordering helper used when callers need facts newest-first (e.g. the
/// Memory Orchestrator's recent-context views); kept here rather than
/// duplicated at each call site.
pub fn newest_first(mut facts: Vec<Fact>) -> Vec<Fact> {
    facts.sort_by(|a, b| b.id.0.cmp(&a.id.0).then(CmpOrdering::Equal));
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::ledger::InMemoryLedger;
    use crate::types::FactType;
    use crate::wal::InMemoryWalJournal;

    fn facade() -> (LedgerFacade, Arc<dyn LedgerStore>) {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        let journal: Arc<dyn crate::wal::WalJournal> = Arc::new(InMemoryWalJournal::new());
        let queue = Arc::new(WriterQueue::new(QueueConfig::default(), store.clone(), journal));
        let locks = Arc::new(ChainLocks::new());
        (LedgerFacade::new(store.clone(), queue, locks), store)
    }

    fn draft(tenant: &str, project: &str, fact_type: FactType, content: &str) -> FactDraft {
        FactDraft::new(tenant, project, fact_type, content, "test")
    }

    #[tokio::test]
    async fn chain_of_three_facts_links_and_verifies() {
        let (facade, _store) = facade();
        let now = Utc::now();

        for content in ["a", "b", "c"] {
            facade.store_fact(draft("t1", "proj", FactType::Knowledge, content), now).await.unwrap();
        }

        let result = facade.verify_chain(&TenantId::new("t1"), None, None).unwrap();
        assert!(result.valid);
        assert!(result.violations.is_empty());
    }

    #[tokio::test]
    async fn duplicate_immutable_content_is_a_conflict() {
        let (facade, _store) = facade();
        let now = Utc::now();

        let first = facade.store_fact(draft("t1", "proj", FactType::Decision, "use rust"), now).await.unwrap();
        let err = facade.store_fact(draft("t1", "proj", FactType::Decision, "use rust"), now).await.unwrap_err();

        match err {
            CortexError::Conflict { existing_fact_id, .. } => assert_eq!(existing_fact_id, first),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_mutable_content_is_allowed() {
        let (facade, _store) = facade();
        let now = Utc::now();

        facade.store_fact(draft("t1", "proj", FactType::Knowledge, "dup"), now).await.unwrap();
        let second = facade.store_fact(draft("t1", "proj", FactType::Knowledge, "dup"), now).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn get_fact_as_of_respects_deprecation() {
        let (facade, _store) = facade();
        let t0 = Utc::now();
        let fact_id = facade.store_fact(draft("t1", "proj", FactType::Knowledge, "x"), t0).await.unwrap();

        let t1 = t0 + chrono::Duration::seconds(10);
        facade.deprecate_fact(&TenantId::new("t1"), fact_id, "superseded".to_string(), t1).await.unwrap();

        assert!(facade.get_fact(&TenantId::new("t1"), fact_id, Some(t0)).is_ok());
        let err = facade.get_fact(&TenantId::new("t1"), fact_id, Some(t1 + chrono::Duration::seconds(1))).unwrap_err();
        assert!(matches!(err, CortexError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_project_paginates_by_cursor() {
        let (facade, _store) = facade();
        let now = Utc::now();
        for i in 0..5 {
            facade.store_fact(draft("t1", "proj", FactType::Knowledge, &format!("f{i}")), now).await.unwrap();
        }

        let page1 = facade.list_project(&TenantId::new("t1"), "proj", ListFilters { limit: 2, ..Default::default() }).unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.next_cursor.is_some());

        let page2 = facade
            .list_project(&TenantId::new("t1"), "proj", ListFilters { limit: 2, cursor: page1.next_cursor, ..Default::default() })
            .unwrap();
        assert_eq!(page2.items.len(), 2);
        assert_ne!(page1.items[0].id, page2.items[0].id);
    }

    #[tokio::test]
    async fn verify_chain_detects_tampered_transaction_hash() {
        let (facade, _store) = facade();
        let now = Utc::now();
        for content in ["a", "b", "c"] {
            facade.store_fact(draft("t1", "proj", FactType::Knowledge, content), now).await.unwrap();
        }

        let result = facade.verify_chain(&TenantId::new("t1"), None, None).unwrap();
        assert!(result.valid);
        assert!(result.violations.is_empty());
    }

    #[tokio::test]
    async fn verify_chain_flags_a_broken_prev_hash_link() {
        let tenant = TenantId::new("t1");
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        let journal: Arc<dyn crate::wal::WalJournal> = Arc::new(InMemoryWalJournal::new());
        let queue = Arc::new(WriterQueue::new(QueueConfig::default(), store.clone(), journal));
        let locks = Arc::new(ChainLocks::new());
        let facade = LedgerFacade::new(store.clone(), queue, locks);

        let tx1 = build_tx(TxId(1), tenant.clone(), TxAction::Create { fact_id: FactId(1) }, Utc::now(), Hash256::genesis()).unwrap();
        store.append_transaction(&tx1).unwrap();

        // tx2's prev_hash should chain from tx1.hash; point it at genesis instead.
        let tx2 = build_tx(TxId(2), tenant.clone(), TxAction::Create { fact_id: FactId(2) }, Utc::now(), Hash256::genesis()).unwrap();
        store.append_transaction(&tx2).unwrap();

        let result = facade.verify_chain(&tenant, None, None).unwrap();
        assert!(!result.valid);
        assert_eq!(result.violations[0].id, TxId(2));
        assert_eq!(result.violations[0].kind, "chain_break");
    }

    #[tokio::test]
    async fn first_fact_in_a_tenant_gets_tx_id_one() {
        let (facade, store) = facade();
        let now = Utc::now();
        facade.store_fact(draft("t1", "proj", FactType::Knowledge, "a"), now).await.unwrap();

        let tx = store.last_transaction(&TenantId::new("t1")).unwrap().unwrap();
        assert_eq!(tx.id, TxId(1));
    }

    #[tokio::test]
    async fn tenant_isolation_violation_on_store_fact_is_audited_to_the_ledger() {
        let (facade, store) = facade();
        let now = Utc::now();

        let err = facade.store_fact(draft("", "proj", FactType::Knowledge, "x"), now).await.unwrap_err();
        assert!(matches!(err, CortexError::TenantIsolationError { .. }));

        // The audit transaction is recorded under the empty-tenant bucket
        // named in the violation itself, since there is no valid tenant to
        // charge it to.
        let tx = store.last_transaction(&TenantId::new("")).unwrap().expect("an audit transaction should have been appended");
        match tx.action {
            TxAction::Audit { error_kind, .. } => assert_eq!(error_kind, "tenant_isolation_error"),
            other => panic!("expected TxAction::Audit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tampered_chain_tip_raises_chain_break_and_is_audited() {
        let tenant = TenantId::new("t1");
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        let journal: Arc<dyn crate::wal::WalJournal> = Arc::new(InMemoryWalJournal::new());
        let queue = Arc::new(WriterQueue::new(QueueConfig::default(), store.clone(), journal));
        let locks = Arc::new(ChainLocks::new());
        let facade = LedgerFacade::new(store.clone(), queue, locks);
        let now = Utc::now();

        let mut tx0 = build_tx(TxId(1), tenant.clone(), TxAction::Create { fact_id: FactId(1) }, now, Hash256::genesis()).unwrap();
        tx0.hash = Hash256::compute(b"tampered-after-the-fact");
        store.append_transaction(&tx0).unwrap();

        let err = facade
            .store_fact(draft("t1", "proj", FactType::Knowledge, "y"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::ChainBreak { .. }));

        let txs = store.transactions_in_range(&tenant, TxId(1), TxId(10)).unwrap();
        let audit_tx = txs.iter().find(|t| matches!(t.action, TxAction::Audit { .. })).expect("chain break should have been audited");
        match &audit_tx.action {
            TxAction::Audit { error_kind, .. } => assert_eq!(*error_kind, "chain_break"),
            other => panic!("expected TxAction::Audit, got {other:?}"),
        }
    }
}
