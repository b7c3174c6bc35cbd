//! Reputation-weighted Byzantine Fault Tolerant consensus (`spec.md`
//! §4.I): vote casting, weighted score recomputation with time decay,
//! quorum-gated confidence transitions, Elder Council fallback, and
//! EMA-based post-hoc reputation updates.

pub mod engine;

pub use engine::{ConsensusEngine, VoteOutcome};
