//! Consensus participants and their votes (`spec.md` §3, entities `Vote`
//! and `Agent`; §4.I Consensus Engine).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, FactId};

/// A registered consensus participant. Reputation starts at the midpoint
/// and drifts via the EMA update on each post-hoc outcome (§4.I).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub public_key_fingerprint: String,
    pub reputation_score: f64,
    pub total_votes: u64,
    pub successful_votes: u64,
    pub last_active_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Agent {
    pub fn new(id: AgentId, public_key_fingerprint: impl Into<String>, now: DateTime<Utc>) -> Self {
        Agent {
            id,
            public_key_fingerprint: public_key_fingerprint.into(),
            reputation_score: 0.5,
            total_votes: 0,
            successful_votes: 0,
            last_active_at: now,
            is_active: true,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_votes == 0 {
            0.0
        } else {
            self.successful_votes as f64 / self.total_votes as f64
        }
    }
}

/// A single agent's vote on a fact. Unique per `(fact_id, agent_id)`; a
/// later vote from the same agent on the same fact is a correction, not a
/// new vote (§4.I edge cases).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    pub fact_id: FactId,
    pub agent_id: AgentId,
    pub value: i8,
    pub vote_weight: f64,
    pub agent_rep_at_vote: f64,
    pub decay_factor: f64,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    /// Effective contribution of this vote to a fact's consensus score:
    /// `value * vote_weight * decay_factor`, per the WBFT scoring formula.
    pub fn weighted_contribution(&self) -> f64 {
        f64::from(self.value) * self.vote_weight * self.decay_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_agent_starts_at_midpoint_reputation() {
        let agent = Agent::new(AgentId::new("a1"), "fp", Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(agent.reputation_score, 0.5);
        assert_eq!(agent.success_rate(), 0.0);
    }

    #[test]
    fn weighted_contribution_applies_sign_and_decay() {
        let vote = Vote {
            fact_id: FactId(1),
            agent_id: AgentId::new("a1"),
            value: -1,
            vote_weight: 0.8,
            agent_rep_at_vote: 0.8,
            decay_factor: 0.5,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        };
        assert!((vote.weighted_contribution() - (-0.4)).abs() < 1e-9);
    }
}
