//! Embedding: the L2 Vector Store's payload type (`spec.md` §3, entity
//! `Embedding`; §4.E L2 Vector Store).

use serde::{Deserialize, Serialize};

use super::{FactId, TenantId};

/// A dense vector representation of a fact's content, scoped to a tenant
/// and tagged with the model that produced it so heterogeneous embedding
/// models can coexist without cross-contaminating similarity search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Embedding {
    pub fact_id: FactId,
    pub tenant_id: TenantId,
    pub vector: Vec<f32>,
    pub model_id: String,
}

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// Cosine similarity against another embedding. Returns `0.0` for a
    /// zero-magnitude vector rather than producing `NaN`.
    pub fn cosine_similarity(&self, other: &Embedding) -> f64 {
        debug_assert_eq!(self.vector.len(), other.vector.len());
        let dot: f64 = self
            .vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| f64::from(*a) * f64::from(*b))
            .sum();
        let mag_a: f64 = self.vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
        let mag_b: f64 = other.vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
        if mag_a == 0.0 || mag_b == 0.0 {
            0.0
        } else {
            dot / (mag_a * mag_b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(vector: Vec<f32>) -> Embedding {
        Embedding {
            fact_id: FactId(1),
            tenant_id: TenantId::new("t1"),
            vector,
            model_id: "test-model".to_string(),
        }
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let a = embedding(vec![1.0, 0.0, 0.0]);
        let b = embedding(vec![1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = embedding(vec![1.0, 0.0]);
        let b = embedding(vec![0.0, 1.0]);
        assert!(a.cosine_similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn zero_magnitude_vector_does_not_produce_nan() {
        let a = embedding(vec![0.0, 0.0]);
        let b = embedding(vec![1.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }
}
