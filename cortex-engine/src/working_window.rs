//! L1 Working Window (`spec.md` §4.F): a token-budgeted FIFO buffer of
//! recently relevant facts per `(tenant, session)`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::CortexError;
use crate::types::{FactId, SessionId, TenantId, WorkingWindowEntry};

/// Deterministic token-count heuristic: four characters per token,
/// rounded up. Pure and stateless so replay is always consistent.
pub fn estimate_tokens(content: &str) -> u32 {
    content.chars().count().div_ceil(4) as u32
}

struct Session {
    entries: Vec<WorkingWindowEntry>,
    total_tokens: u32,
    last_touched: DateTime<Utc>,
}

/// In-memory FIFO window keyed by `(tenant, session)`. Oldest entries
/// are evicted once the token budget is exceeded; an idle session is
/// swept entirely once its TTL elapses.
pub struct WorkingWindow {
    token_budget: u32,
    idle_ttl: chrono::Duration,
    sessions: Mutex<HashMap<(TenantId, SessionId), Session>>,
}

impl WorkingWindow {
    pub fn new(token_budget: u32, idle_ttl: std::time::Duration) -> Self {
        Self {
            token_budget,
            idle_ttl: chrono::Duration::from_std(idle_ttl).unwrap_or(chrono::Duration::hours(2)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Admits `fact_id` into the window, evicting the oldest entries
    /// until the new entry fits within the token budget. Returns the
    /// entries evicted to make room, oldest first, so a caller (the
    /// Memory Orchestrator) can summarize them (`spec.md` §4.G write
    /// path step 4).
    pub fn admit(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
        fact_id: FactId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkingWindowEntry>, CortexError> {
        let tokens = estimate_tokens(content);
        let mut sessions = self.sessions.lock().map_err(|_| CortexError::Storage("working window mutex poisoned".to_string()))?;
        let key = (tenant_id.clone(), session_id.clone());
        let session = sessions.entry(key).or_insert_with(|| Session { entries: Vec::new(), total_tokens: 0, last_touched: now });

        let mut evicted = Vec::new();
        while session.total_tokens + tokens > self.token_budget && !session.entries.is_empty() {
            let entry = session.entries.remove(0);
            session.total_tokens -= entry.token_estimate;
            evicted.push(entry);
        }

        session.entries.push(WorkingWindowEntry {
            tenant_id: tenant_id.clone(),
            session_id: session_id.clone(),
            fact_id,
            token_estimate: tokens,
            inserted_at: now,
        });
        session.total_tokens += tokens;
        session.last_touched = now;
        Ok(evicted)
    }

    pub fn entries(&self, tenant_id: &TenantId, session_id: &SessionId) -> Result<Vec<WorkingWindowEntry>, CortexError> {
        let sessions = self.sessions.lock().map_err(|_| CortexError::Storage("working window mutex poisoned".to_string()))?;
        Ok(sessions
            .get(&(tenant_id.clone(), session_id.clone()))
            .map(|s| s.entries.clone())
            .unwrap_or_default())
    }

    /// Evicts every session whose last activity is older than `idle_ttl`
    /// relative to `now`. Returns the number of sessions swept.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Result<usize, CortexError> {
        let mut sessions = self.sessions.lock().map_err(|_| CortexError::Storage("working window mutex poisoned".to_string()))?;
        let before = sessions.len();
        sessions.retain(|_, session| now.signed_duration_since(session.last_touched) < self.idle_ttl);
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn estimate_tokens_rounds_up_four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("ab"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn admit_evicts_oldest_entries_when_over_budget() {
        let window = WorkingWindow::new(2, std::time::Duration::from_secs(7200));
        let tenant = TenantId::new("t1");
        let session = SessionId::new("s1");
        let now = Utc.timestamp_opt(0, 0).unwrap();

        let first_evicted = window.admit(&tenant, &session, FactId(1), "ab", now).unwrap();
        assert!(first_evicted.is_empty());
        let second_evicted = window.admit(&tenant, &session, FactId(2), "cd", now).unwrap();
        assert_eq!(second_evicted.len(), 1);
        assert_eq!(second_evicted[0].fact_id, FactId(1));

        let entries = window.entries(&tenant, &session).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fact_id, FactId(2));
    }

    #[test]
    fn sweep_idle_evicts_sessions_past_ttl() {
        let window = WorkingWindow::new(1000, std::time::Duration::from_secs(60));
        let tenant = TenantId::new("t1");
        let session = SessionId::new("s1");
        let t0 = Utc.timestamp_opt(0, 0).unwrap();

        window.admit(&tenant, &session, FactId(1), "hi", t0).unwrap();

        let t1 = t0 + chrono::Duration::seconds(30);
        let swept = window.sweep_idle(t1).unwrap();
        assert_eq!(swept, 0);

        let t2 = t0 + chrono::Duration::seconds(120);
        let swept = window.sweep_idle(t2).unwrap();
        assert_eq!(swept, 1);
        assert!(window.entries(&tenant, &session).unwrap().is_empty());
    }
}
