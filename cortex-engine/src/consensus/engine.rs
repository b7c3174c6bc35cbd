//! WBFT scoring, quorum gating, Elder Council fallback, and reputation
//! updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::canonical;
use crate::config::ConsensusConfig;
use crate::error::CortexError;
use crate::ledger::{LedgerFacade, LedgerStore};
use crate::types::{Agent, AgentId, Confidence, FactId, TenantId, TxAction, Vote};

/// Result of casting a vote: the fact's confidence and consensus score
/// after this vote, and whether this vote caused a transition.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteOutcome {
    pub confidence: Confidence,
    pub consensus_score: f64,
    pub transitioned: bool,
}

/// Consensus engine: computes weighted, time-decayed scores from
/// recorded votes and drives confidence transitions and reputation
/// updates. Reads go straight to the [`LedgerStore`]; every mutation
/// goes through the [`LedgerFacade`] so a `VOTE` or reputation-update
/// transaction lands in the tenant's chain, same as any other commit
/// (`spec.md` §4.I: "Appends a VOTE transaction to the ledger").
pub struct ConsensusEngine {
    config: ConsensusConfig,
    store: Arc<dyn LedgerStore>,
    ledger: LedgerFacade,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig, store: Arc<dyn LedgerStore>, ledger: LedgerFacade) -> Self {
        Self { config, store, ledger }
    }

    /// `register_agent` (`spec.md` §6): idempotent — a second
    /// registration of the same `agent_id` returns the existing agent
    /// rather than resetting its reputation.
    pub async fn register_agent(&self, tenant_id: &TenantId, agent_id: AgentId, public_key_fingerprint: String, now: DateTime<Utc>) -> Result<Agent, CortexError> {
        self.ledger.guard_and_audit(tenant_id, None, now).await?;

        if let Some(existing) = self.store.get_agent(&agent_id)? {
            return Ok(existing);
        }
        let agent = Agent::new(agent_id, public_key_fingerprint, now);
        self.store.put_agent(&agent)?;
        Ok(agent)
    }

    /// Casts `agent_id`'s vote of `value` (`-1` or `+1`) on `fact_id`,
    /// recomputes the fact's consensus score, and applies any resulting
    /// confidence transition. Reputation updates only fire on the first
    /// crossing into `verified` or `disputed` (edge-triggered, not
    /// level-triggered — see `SPEC_FULL.md`'s Open Question resolution).
    /// `reason` is accepted for API-surface parity with the documented
    /// `cast_vote(tenant, fact_id, agent_id, value, reason?)` call but
    /// has no field on the `Vote` entity to land in (`spec.md` §3).
    pub async fn cast_vote(
        &self,
        tenant_id: &TenantId,
        fact_id: FactId,
        agent_id: &AgentId,
        value: i8,
        _reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome, CortexError> {
        if value != 1 && value != -1 {
            return Err(CortexError::EncodingError(format!("vote value must be -1 or +1, got {value}")));
        }

        let fact = self
            .store
            .get_fact(tenant_id, fact_id)?
            .ok_or_else(|| CortexError::NotFound { resource: "fact", id: fact_id.0.to_string() })?;
        self.ledger.guard_and_audit(tenant_id, Some(&fact.tenant_id), now).await?;

        let agent = self
            .store
            .get_agent(agent_id)?
            .ok_or_else(|| CortexError::UnknownAgent(agent_id.clone()))?;
        if !agent.is_active {
            return Err(CortexError::UnknownAgent(agent_id.clone()));
        }

        let vote = Vote {
            fact_id,
            agent_id: agent_id.clone(),
            value,
            vote_weight: agent.reputation_score,
            agent_rep_at_vote: agent.reputation_score,
            decay_factor: 1.0,
            created_at: now,
        };

        // Recompute against the vote set as it will read after the
        // upsert (a re-vote from this agent replaces, not accumulates,
        // per §3 "Upsert on (fact_id, agent_id)"), before anything is
        // actually written.
        let mut votes = self.store.votes_for_fact(fact_id)?;
        votes.retain(|v| v.agent_id != vote.agent_id);
        votes.push(vote.clone());

        let score = self.weighted_score(&votes, now);
        let previous_confidence = fact.confidence;
        let new_confidence = self.resolve_confidence(previous_confidence, &votes, score, now);
        let transitioned = new_confidence != previous_confidence;

        let mut committed_fact = fact;
        committed_fact.consensus_score = score;
        committed_fact.confidence = new_confidence;

        let action = TxAction::Vote { fact_id, agent_id: agent_id.clone(), value };
        self.ledger
            .append_transaction(tenant_id, action, now, move |store| {
                store.put_vote(&vote)?;
                store.update_fact(&committed_fact)
            })
            .await?;

        if transitioned && matches!(new_confidence, Confidence::Verified | Confidence::Disputed) {
            self.apply_reputation_updates(tenant_id, &votes, new_confidence, now).await?;
        }

        Ok(VoteOutcome { confidence: new_confidence, consensus_score: score, transitioned })
    }

    /// `consensus_score = 1 + weighted_average(vote contributions)`,
    /// clamped to `[0, 2]` so `1.0` is the neutral midpoint, `2.0` is
    /// unanimous support, and `0.0` is unanimous dispute.
    fn weighted_score(&self, votes: &[Vote], now: DateTime<Utc>) -> f64 {
        if votes.is_empty() {
            return 1.0;
        }

        let tau_secs = self.config.decay_tau.as_secs_f64().max(1.0);
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for vote in votes {
            let age_secs = now.signed_duration_since(vote.created_at).num_seconds().max(0) as f64;
            let decay = (-age_secs / tau_secs).exp();
            let weight = vote.agent_rep_at_vote * decay;
            weighted_sum += f64::from(vote.value) * weight;
            total_weight += weight;
        }

        let average = if total_weight > 0.0 { weighted_sum / total_weight } else { 0.0 };
        (1.0 + average).clamp(0.0, 2.0)
    }

    /// Decides the confidence state given the current vote set and
    /// score: a quorum-gated threshold crossing, an Elder Council
    /// fallback verdict once votes have gone stale, or no change.
    fn resolve_confidence(&self, current: Confidence, votes: &[Vote], score: f64, now: DateTime<Utc>) -> Confidence {
        if matches!(current, Confidence::Deprecated) {
            return current;
        }

        let verified_cut = self.config.verified_score;
        let disputed_cut = self.config.disputed_score;

        if votes.len() >= self.config.quorum {
            if score >= verified_cut {
                return Confidence::Verified;
            }
            if score <= disputed_cut {
                return Confidence::Disputed;
            }
            return current;
        }

        let oldest_vote = votes.iter().map(|v| v.created_at).min();
        let stale = oldest_vote
            .map(|t| now.signed_duration_since(t) >= chrono::Duration::from_std(self.config.elder_fallback_after).unwrap_or(chrono::Duration::zero()))
            .unwrap_or(false);

        if stale {
            return self.elder_council_verdict(votes, score, verified_cut, disputed_cut);
        }

        current
    }

    /// Verdict from the highest-reputation subset of voters (the
    /// "Elder Council"), used when a fact has gone too long without
    /// reaching quorum organically.
    fn elder_council_verdict(&self, votes: &[Vote], full_score: f64, verified_cut: f64, disputed_cut: f64) -> Confidence {
        let mut by_reputation: Vec<&Vote> = votes.iter().collect();
        by_reputation.sort_by(|a, b| b.agent_rep_at_vote.partial_cmp(&a.agent_rep_at_vote).unwrap_or(std::cmp::Ordering::Equal));
        by_reputation.truncate(self.config.elder_council_size);

        if by_reputation.is_empty() {
            return if full_score >= verified_cut {
                Confidence::Verified
            } else if full_score <= disputed_cut {
                Confidence::Disputed
            } else {
                Confidence::Stated
            };
        }

        let sum: f64 = by_reputation.iter().map(|v| f64::from(v.value) * v.agent_rep_at_vote).sum();
        let weight: f64 = by_reputation.iter().map(|v| v.agent_rep_at_vote).sum();
        let score = if weight > 0.0 { (1.0 + sum / weight).clamp(0.0, 2.0) } else { 1.0 };

        if score >= verified_cut {
            Confidence::Verified
        } else if score <= disputed_cut {
            Confidence::Disputed
        } else {
            Confidence::Stated
        }
    }

    /// Post-hoc EMA reputation update: each voting agent's reputation
    /// drifts toward `1.0` if their vote agreed with the outcome, and
    /// toward `0.0` if it disagreed. One `ReputationUpdate` transaction
    /// is appended per agent (`spec.md` §4.I, Scenario 3).
    async fn apply_reputation_updates(&self, tenant_id: &TenantId, votes: &[Vote], outcome: Confidence, now: DateTime<Utc>) -> Result<(), CortexError> {
        let target_sign: i8 = match outcome {
            Confidence::Verified => 1,
            Confidence::Disputed => -1,
            _ => return Ok(()),
        };
        let alpha = self.config.reputation_ema_alpha;

        for vote in votes {
            let Some(mut agent) = self.store.get_agent(&vote.agent_id)? else { continue };

            let agreed = vote.value == target_sign;
            let target = if agreed { 1.0 } else { 0.0 };
            let old_score = agent.reputation_score;
            agent.reputation_score = (1.0 - alpha) * old_score + alpha * target;
            agent.total_votes += 1;
            if agreed {
                agent.successful_votes += 1;
            }
            agent.last_active_at = now;

            let action = TxAction::ReputationUpdate {
                agent_id: vote.agent_id.clone(),
                old_score: canonical::canonical_decimal(old_score),
                new_score: canonical::canonical_decimal(agent.reputation_score),
            };
            self.ledger
                .append_transaction(tenant_id, action, now, move |store| store.put_agent(&agent))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::ledger::chain_lock::ChainLocks;
    use crate::ledger::InMemoryLedger;
    use crate::types::{Fact, FactType, Hash256};
    use crate::wal::InMemoryWalJournal;
    use crate::writer_queue::WriterQueue;

    fn dummy_fact(id: u64) -> Fact {
        Fact {
            id: FactId(id),
            tenant_id: TenantId::new("t1"),
            project: "proj".to_string(),
            fact_type: FactType::Knowledge,
            content: "hello".to_string(),
            tags: vec![],
            confidence: Confidence::Stated,
            consensus_score: 1.0,
            valid_from: Utc::now(),
            valid_until: None,
            source: "test".to_string(),
            content_hash: Hash256::genesis(),
            prev_hash: Hash256::genesis(),
            sensitive: false,
        }
    }

    fn setup(store: &Arc<dyn LedgerStore>, agents: &[(&str, f64)]) {
        for (id, rep) in agents {
            let mut agent = Agent::new(AgentId::new(*id), "fp", Utc::now());
            agent.reputation_score = *rep;
            store.put_agent(&agent).unwrap();
        }
    }

    fn engine(store: Arc<dyn LedgerStore>) -> ConsensusEngine {
        let journal: Arc<dyn crate::wal::WalJournal> = Arc::new(InMemoryWalJournal::new());
        let queue = Arc::new(WriterQueue::new(QueueConfig::default(), store.clone(), journal));
        let locks = Arc::new(ChainLocks::new());
        let ledger = LedgerFacade::new(store.clone(), queue, locks);
        ConsensusEngine::new(ConsensusConfig::default(), store, ledger)
    }

    #[tokio::test]
    async fn quorum_of_positive_votes_transitions_to_verified() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        setup(&store, &[("a1", 0.9), ("a2", 0.9), ("a3", 0.9)]);
        store.put_fact(&dummy_fact(1)).unwrap();

        let engine = engine(store);
        let tenant = TenantId::new("t1");
        let now = Utc::now();

        for agent in ["a1", "a2"] {
            engine.cast_vote(&tenant, FactId(1), &AgentId::new(agent), 1, None, now).await.unwrap();
        }
        let outcome = engine.cast_vote(&tenant, FactId(1), &AgentId::new("a3"), 1, None, now).await.unwrap();

        assert_eq!(outcome.confidence, Confidence::Verified);
        assert!(outcome.transitioned);
    }

    #[tokio::test]
    async fn below_quorum_stays_stated() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        setup(&store, &[("a1", 0.9)]);
        store.put_fact(&dummy_fact(2)).unwrap();

        let engine = engine(store);
        let outcome = engine
            .cast_vote(&TenantId::new("t1"), FactId(2), &AgentId::new("a1"), 1, None, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.confidence, Confidence::Stated);
        assert!(!outcome.transitioned);
    }

    #[tokio::test]
    async fn reputation_updates_only_fire_on_transition_edge() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        setup(&store, &[("a1", 0.9), ("a2", 0.9), ("a3", 0.9)]);
        store.put_fact(&dummy_fact(3)).unwrap();

        let engine = engine(store.clone());
        let tenant = TenantId::new("t1");
        let now = Utc::now();

        for agent in ["a1", "a2", "a3"] {
            engine.cast_vote(&tenant, FactId(3), &AgentId::new(agent), 1, None, now).await.unwrap();
        }

        let rep_after_first_transition = store.get_agent(&AgentId::new("a1")).unwrap().unwrap().reputation_score;
        assert!(rep_after_first_transition > 0.9, "reputation should rise toward 1.0 on agreement");

        // A further vote from a fresh agent does not retrigger the
        // already-crossed transition, so existing voters' reputation is
        // untouched by it.
        setup(&store, &[("a4", 0.9)]);
        let outcome = engine.cast_vote(&tenant, FactId(3), &AgentId::new("a4"), 1, None, now).await.unwrap();
        assert!(!outcome.transitioned);

        let rep_unchanged = store.get_agent(&AgentId::new("a1")).unwrap().unwrap().reputation_score;
        assert_eq!(rep_unchanged, rep_after_first_transition);
    }

    #[tokio::test]
    async fn voting_with_unknown_agent_is_rejected() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        store.put_fact(&dummy_fact(4)).unwrap();

        let engine = engine(store);
        let err = engine
            .cast_vote(&TenantId::new("t1"), FactId(4), &AgentId::new("ghost"), 1, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn register_agent_is_idempotent() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        let engine = engine(store);
        let tenant = TenantId::new("t1");
        let now = Utc::now();

        let first = engine.register_agent(&tenant, AgentId::new("a1"), "fp".to_string(), now).await.unwrap();
        let mut promoted = first.clone();
        promoted.reputation_score = 0.9;
        engine.store.put_agent(&promoted).unwrap();

        let second = engine.register_agent(&tenant, AgentId::new("a1"), "fp-changed".to_string(), now).await.unwrap();
        assert_eq!(second.reputation_score, 0.9, "re-registration must not reset reputation");
    }
}
