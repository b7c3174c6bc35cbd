//! Capability traits for the engine's external collaborators
//! (`spec.md` §9, Design Notes: "Plugin objects implementing an
//! abstract base" → capability traits registered at construction).
//!
//! The embedding model, the summarizer used for L1 overflow
//! compression, and whatever notification sink the deployment wires up
//! are all deliberately out of the core's scope (`spec.md` §1). These
//! traits are the narrow seam the Memory Orchestrator depends on
//! instead of importing a concrete provider, so a new adapter is just
//! another impl registered on `Engine` construction — never a new
//! match arm deep in the orchestrator.
//!
//! Methods are synchronous, matching the teacher's `MlVerifier` trait
//! (`fn verify(&self, ...) -> Result<...>`, backed internally by a
//! blocking HTTP client): a provider that talks to the network owns its
//! own blocking client and the call site runs it on a dedicated worker
//! via `tokio::task::spawn_blocking` (`spec.md` §5's scheduling model),
//! rather than bridging async back into a sync trait at every seam.

use crate::error::CortexError;
use crate::types::FactId;

/// Produces a fixed-dimension embedding for fact content (`spec.md`
/// §2, "Embedder (external)"; §4.G write path step 3).
///
/// Implementations own their own retry/backoff policy; the
/// orchestrator treats any `Err` as non-fatal and surfaces
/// `EmbeddingDeferred` rather than failing the whole ingest.
pub trait EmbedderPort: Send + Sync {
    /// The vector dimension this embedder produces. Must match the
    /// engine's configured `VectorConfig::dimension`.
    fn dimension(&self) -> usize;

    fn embed(&self, content: &str) -> Result<Vec<f32>, CortexError>;
}

/// Summarizes a batch of evicted working-window entries into a single
/// piece of derived content (`spec.md` §4.G write path step 4).
///
/// When no summarizer is configured, the orchestrator falls back to a
/// concatenation placeholder rather than calling this trait at all.
pub trait SummarizerPort: Send + Sync {
    fn summarize(&self, evicted_fact_ids: &[FactId], evicted_contents: &[String]) -> Result<String, CortexError>;
}

/// Sink for events the engine wants observed outside the process:
/// privacy-tier hits, fatal ledger errors, consensus transitions.
/// Entirely best-effort — a notifier failure is logged and otherwise
/// ignored, never propagated back to the caller whose operation
/// triggered the notification.
pub trait NotifierPort: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// An event worth telling an external notification adapter about.
#[derive(Clone, Debug)]
pub enum NotificationEvent {
    PrivacyBlocked { tenant_id: String, fact_id: FactId, tier: &'static str },
    ConfidenceTransitioned { tenant_id: String, fact_id: FactId, to: &'static str },
    ChainIntegrityViolation { tenant_id: String, tx_id: u64 },
}

/// A [`NotifierPort`] that drops every event. The default when no
/// notification adapter is configured.
#[derive(Default)]
pub struct NullNotifier;

impl NotifierPort for NullNotifier {
    fn notify(&self, _event: NotificationEvent) {}
}

/// A [`SummarizerPort`] that concatenates evicted content rather than
/// calling an LLM, used when no real summarizer is configured
/// (`spec.md` §4.G: "if no summarizer is configured, store a
/// concatenation placeholder").
#[derive(Default)]
pub struct ConcatenationSummarizer;

impl SummarizerPort for ConcatenationSummarizer {
    fn summarize(&self, evicted_fact_ids: &[FactId], evicted_contents: &[String]) -> Result<String, CortexError> {
        let ids = evicted_fact_ids.iter().map(|id| id.0.to_string()).collect::<Vec<_>>().join(",");
        Ok(format!("[evicted facts {ids}] {}", evicted_contents.join(" / ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_notifier_accepts_every_event_without_panicking() {
        let notifier = NullNotifier;
        notifier.notify(NotificationEvent::PrivacyBlocked { tenant_id: "t1".to_string(), fact_id: FactId(1), tier: "critical" });
    }

    #[test]
    fn concatenation_summarizer_includes_evicted_ids_and_contents() {
        let summarizer = ConcatenationSummarizer;
        let summary = summarizer.summarize(&[FactId(1), FactId(2)], &["a".to_string(), "b".to_string()]).unwrap();
        assert!(summary.contains('1'));
        assert!(summary.contains('2'));
        assert!(summary.contains('a'));
        assert!(summary.contains('b'));
    }
}
