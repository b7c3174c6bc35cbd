//! Fact: the unit of memory (see `spec.md` §3, entity `Fact`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FactId, Hash256, TenantId};

/// Kind of memory a fact represents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Axiom,
    Knowledge,
    Decision,
    Error,
    Ghost,
    Bridge,
    MetaLearning,
    Report,
    Rule,
    Evolution,
    WorldModel,
    Episode,
}

impl FactType {
    /// Immutable fact types reject duplicate content within `(tenant,
    /// project)` with `Conflict` (§4.C failure model).
    pub fn is_immutable(self) -> bool {
        matches!(self, FactType::Axiom | FactType::Decision)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FactType::Axiom => "axiom",
            FactType::Knowledge => "knowledge",
            FactType::Decision => "decision",
            FactType::Error => "error",
            FactType::Ghost => "ghost",
            FactType::Bridge => "bridge",
            FactType::MetaLearning => "meta_learning",
            FactType::Report => "report",
            FactType::Rule => "rule",
            FactType::Evolution => "evolution",
            FactType::WorldModel => "world_model",
            FactType::Episode => "episode",
        }
    }
}

/// Confidence state in the fact lifecycle state machine (`spec.md` §4,
/// "State Machine — Fact Confidence").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Stated,
    Verified,
    Disputed,
    Deprecated,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Stated => "stated",
            Confidence::Verified => "verified",
            Confidence::Disputed => "disputed",
            Confidence::Deprecated => "deprecated",
        }
    }
}

/// Caller-supplied draft of a new fact, before id assignment and hashing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactDraft {
    pub tenant_id: TenantId,
    pub project: String,
    pub fact_type: FactType,
    pub content: String,
    pub tags: Vec<String>,
    pub source: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Set by the Privacy Shield when ingress scanning flags this content;
    /// carried through so the ledger can tag the committed fact.
    #[serde(default)]
    pub sensitive: bool,
}

impl FactDraft {
    pub fn new(
        tenant_id: impl Into<TenantId>,
        project: impl Into<String>,
        fact_type: FactType,
        content: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project: project.into(),
            fact_type,
            content: content.into(),
            tags: Vec::new(),
            source: source.into(),
            valid_from: None,
            valid_until: None,
            sensitive: false,
        }
    }
}

/// The unit of memory. See `spec.md` §3.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub tenant_id: TenantId,
    pub project: String,
    pub fact_type: FactType,
    pub content: String,
    pub tags: Vec<String>,
    pub confidence: Confidence,
    pub consensus_score: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub source: String,
    pub content_hash: Hash256,
    pub prev_hash: Hash256,
    pub sensitive: bool,
}

impl Fact {
    /// Temporal predicate from `spec.md` §4.C: "`as_of = T` yields the
    /// state where `valid_from ≤ T ∧ (valid_until IS NULL ∨ valid_until >
    /// T)`". Built from the fact's own fields, never from caller-supplied
    /// SQL.
    pub fn active_as_of(&self, as_of: DateTime<Utc>) -> bool {
        self.valid_from <= as_of && self.valid_until.map(|vu| vu > as_of).unwrap_or(true)
    }

    pub fn is_active(&self) -> bool {
        self.valid_until.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dummy_fact(valid_from_secs: i64, valid_until_secs: Option<i64>) -> Fact {
        Fact {
            id: FactId(1),
            tenant_id: TenantId::new("t1"),
            project: "proj".to_string(),
            fact_type: FactType::Knowledge,
            content: "x".to_string(),
            tags: vec![],
            confidence: Confidence::Stated,
            consensus_score: 1.0,
            valid_from: Utc.timestamp_opt(valid_from_secs, 0).unwrap(),
            valid_until: valid_until_secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            source: "test".to_string(),
            content_hash: Hash256::compute(b"x"),
            prev_hash: Hash256::genesis(),
            sensitive: false,
        }
    }

    #[test]
    fn active_as_of_respects_open_interval() {
        let fact = dummy_fact(100, None);
        assert!(fact.active_as_of(Utc.timestamp_opt(150, 0).unwrap()));
        assert!(!fact.active_as_of(Utc.timestamp_opt(50, 0).unwrap()));
    }

    #[test]
    fn active_as_of_respects_closed_interval() {
        let fact = dummy_fact(100, Some(200));
        assert!(fact.active_as_of(Utc.timestamp_opt(150, 0).unwrap()));
        assert!(!fact.active_as_of(Utc.timestamp_opt(250, 0).unwrap()));
        // valid_until is exclusive per the spec's predicate.
        assert!(!fact.active_as_of(Utc.timestamp_opt(200, 0).unwrap()));
    }

    #[test]
    fn immutable_fact_types_are_axiom_and_decision() {
        assert!(FactType::Axiom.is_immutable());
        assert!(FactType::Decision.is_immutable());
        assert!(!FactType::Knowledge.is_immutable());
    }
}
