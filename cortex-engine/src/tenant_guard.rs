//! Tenant Guard (`spec.md` §4.J): the single checkpoint every operation
//! passes through before touching storage, so tenant isolation is
//! enforced in one place rather than re-implemented at each call site.

use tracing::error;

use crate::error::CortexError;
use crate::types::TenantId;

/// Checks that `tenant_id` is non-empty and, when `resource_tenant` is
/// given, that it matches the tenant that owns the resource being
/// accessed. A violation is logged at `error!` before being returned.
///
/// This function only classifies and logs; it does not itself append
/// anything to the ledger. §7's rule that `TenantIsolationError` is
/// durably audited is enforced by the write-path callers, which route
/// through [`crate::ledger::LedgerFacade::guard_and_audit`] instead of
/// calling this function directly. Read paths (`get_fact`,
/// `list_project`) call this function as-is, since a rejected read
/// leaves nothing in storage worth chain-linking an anomaly onto.
pub fn guard(tenant_id: &TenantId, resource_tenant: Option<&TenantId>) -> Result<(), CortexError> {
    if tenant_id.as_str().is_empty() {
        let err = CortexError::TenantIsolationError { reason: "request is missing a tenant_id".to_string() };
        error!(error = %err, "tenant isolation violation");
        return Err(err);
    }

    if let Some(owner) = resource_tenant {
        if owner != tenant_id {
            let err = CortexError::TenantIsolationError {
                reason: format!("tenant {tenant_id} attempted to access a resource owned by {owner}"),
            };
            error!(error = %err, "tenant isolation violation");
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tenant_id_is_rejected() {
        let err = guard(&TenantId::new(""), None).unwrap_err();
        assert!(matches!(err, CortexError::TenantIsolationError { .. }));
    }

    #[test]
    fn mismatched_resource_tenant_is_rejected() {
        let err = guard(&TenantId::new("t1"), Some(&TenantId::new("t2"))).unwrap_err();
        assert!(matches!(err, CortexError::TenantIsolationError { .. }));
    }

    #[test]
    fn matching_tenant_passes() {
        assert!(guard(&TenantId::new("t1"), Some(&TenantId::new("t1"))).is_ok());
    }

    #[test]
    fn no_resource_tenant_passes_with_nonempty_tenant() {
        assert!(guard(&TenantId::new("t1"), None).is_ok());
    }
}
