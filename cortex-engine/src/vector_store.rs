//! L2 Vector Store (`spec.md` §4.E): tenant-scoped similarity search over
//! fact embeddings.
//!
//! Below the configured `exact_scan_threshold`, every tenant's vectors
//! fit comfortably in an exact linear scan; no ANN/vector-index crate
//! appears anywhere in this workspace's reference material, so this
//! backend does not attempt one. The trait is shaped so a real ANN
//! backend (HNSW or similar) is a drop-in replacement once the tenant
//! population outgrows exact scan.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CortexError;
use crate::types::{Embedding, FactId, TenantId};

/// A single search hit: a fact id and its similarity to the query
/// vector, highest similarity first.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorHit {
    pub fact_id: FactId,
    pub score: f64,
}

/// Contract for the L2 layer. Every method takes `tenant_id` explicitly
/// and every implementation must reject an empty/missing scope with
/// [`CortexError::TenantIsolationError`] rather than silently searching
/// across tenants.
pub trait VectorStore: Send + Sync {
    fn upsert(&self, embedding: Embedding) -> Result<(), CortexError>;
    fn delete(&self, tenant_id: &TenantId, fact_id: FactId) -> Result<(), CortexError>;
    fn search(&self, tenant_id: &TenantId, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>, CortexError>;
}

/// Exact linear-scan implementation. Vectors are partitioned by tenant
/// so a query never has to skip over another tenant's rows.
#[derive(Default)]
pub struct ExactScanVectorStore {
    by_tenant: Mutex<HashMap<TenantId, Vec<Embedding>>>,
}

impl ExactScanVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for ExactScanVectorStore {
    fn upsert(&self, embedding: Embedding) -> Result<(), CortexError> {
        let mut by_tenant = self.by_tenant.lock().map_err(|_| CortexError::Storage("vector store mutex poisoned".to_string()))?;
        let tenant = by_tenant.entry(embedding.tenant_id.clone()).or_default();
        if let Some(slot) = tenant.iter_mut().find(|e| e.fact_id == embedding.fact_id) {
            *slot = embedding;
        } else {
            tenant.push(embedding);
        }
        Ok(())
    }

    fn delete(&self, tenant_id: &TenantId, fact_id: FactId) -> Result<(), CortexError> {
        let mut by_tenant = self.by_tenant.lock().map_err(|_| CortexError::Storage("vector store mutex poisoned".to_string()))?;
        if let Some(tenant) = by_tenant.get_mut(tenant_id) {
            tenant.retain(|e| e.fact_id != fact_id);
        }
        Ok(())
    }

    fn search(&self, tenant_id: &TenantId, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>, CortexError> {
        if tenant_id.as_str().is_empty() {
            return Err(CortexError::TenantIsolationError {
                reason: "vector search requires a non-empty tenant_id".to_string(),
            });
        }

        let by_tenant = self.by_tenant.lock().map_err(|_| CortexError::Storage("vector store mutex poisoned".to_string()))?;
        let query_embedding = Embedding {
            fact_id: FactId(0),
            tenant_id: tenant_id.clone(),
            vector: query.to_vec(),
            model_id: String::new(),
        };

        let mut hits: Vec<VectorHit> = by_tenant
            .get(tenant_id)
            .map(|vectors| {
                vectors
                    .iter()
                    .map(|e| VectorHit { fact_id: e.fact_id, score: query_embedding.cosine_similarity(e) })
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(tenant: &str, fact_id: u64, vector: Vec<f32>) -> Embedding {
        Embedding { fact_id: FactId(fact_id), tenant_id: TenantId::new(tenant), vector, model_id: "m1".to_string() }
    }

    #[test]
    fn search_returns_closest_vectors_first() {
        let store = ExactScanVectorStore::new();
        store.upsert(embedding("t1", 1, vec![1.0, 0.0])).unwrap();
        store.upsert(embedding("t1", 2, vec![0.0, 1.0])).unwrap();
        store.upsert(embedding("t1", 3, vec![0.9, 0.1])).unwrap();

        let hits = store.search(&TenantId::new("t1"), &[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].fact_id, FactId(1));
        assert_eq!(hits[1].fact_id, FactId(3));
    }

    #[test]
    fn search_never_crosses_tenant_boundaries() {
        let store = ExactScanVectorStore::new();
        store.upsert(embedding("t1", 1, vec![1.0, 0.0])).unwrap();
        store.upsert(embedding("t2", 2, vec![1.0, 0.0])).unwrap();

        let hits = store.search(&TenantId::new("t1"), &[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fact_id, FactId(1));
    }

    #[test]
    fn empty_tenant_scope_is_rejected() {
        let store = ExactScanVectorStore::new();
        let err = store.search(&TenantId::new(""), &[1.0], 10).unwrap_err();
        assert!(matches!(err, CortexError::TenantIsolationError { .. }));
    }

    #[test]
    fn upsert_replaces_existing_fact_embedding() {
        let store = ExactScanVectorStore::new();
        store.upsert(embedding("t1", 1, vec![1.0, 0.0])).unwrap();
        store.upsert(embedding("t1", 1, vec![0.0, 1.0])).unwrap();

        let hits = store.search(&TenantId::new("t1"), &[0.0, 1.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn delete_removes_a_fact_embedding() {
        let store = ExactScanVectorStore::new();
        store.upsert(embedding("t1", 1, vec![1.0, 0.0])).unwrap();
        store.delete(&TenantId::new("t1"), FactId(1)).unwrap();

        let hits = store.search(&TenantId::new("t1"), &[1.0, 0.0], 10).unwrap();
        assert!(hits.is_empty());
    }
}
