//! L1 Working Window entry (`spec.md` §3, entity `Working-Window Entry`;
//! §4.F L1 Working Window).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FactId, SessionId, TenantId};

/// One fact admitted into a session's working window, with the token
/// estimate charged against the session's budget at insertion time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkingWindowEntry {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub fact_id: FactId,
    pub token_estimate: u32,
    pub inserted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_carries_its_token_estimate() {
        let entry = WorkingWindowEntry {
            tenant_id: TenantId::new("t1"),
            session_id: SessionId::new("s1"),
            fact_id: FactId(1),
            token_estimate: 42,
            inserted_at: Utc.timestamp_opt(0, 0).unwrap(),
        };
        assert_eq!(entry.token_estimate, 42);
    }
}
