//! Hybrid Search (`spec.md` §4.H): Reciprocal Rank Fusion over a
//! full-text channel and the L2 vector channel, always tenant-scoped.

use std::collections::HashMap;

use crate::error::CortexError;
use crate::types::{FactId, TenantId};
use crate::vector_store::{VectorHit, VectorStore};

/// A fused search hit: a fact id and its combined RRF score, descending.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub fact_id: FactId,
    pub score: f64,
}

/// Default RRF constant. Larger values flatten the curve, giving more
/// weight to facts that appear (even low) in both channels over a fact
/// that ranks #1 in only one.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Characters allowed in a full-text query token after tokenization.
/// Anything else is stripped rather than passed through to whatever
/// full-text index backs the channel, closing off injection via
/// crafted query strings.
fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// A boolean operator preserved by [`tokenize_query`] per `spec.md`
/// §4.H: "boolean operators (AND|OR|NOT) are preserved only if
/// delimited". Recognized case-sensitively so a literal-text search for
/// "and" still tokenizes as an ordinary term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

impl BooleanOp {
    fn from_stripped_word(word: &str) -> Option<Self> {
        match word {
            "AND" => Some(BooleanOp::And),
            "OR" => Some(BooleanOp::Or),
            "NOT" => Some(BooleanOp::Not),
            _ => None,
        }
    }
}

/// One token surviving query tokenization: either a literal search term
/// (metacharacter-stripped and lowercased) or a preserved boolean
/// operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryToken {
    Term(String),
    Operator(BooleanOp),
}

/// Tokenizes and escapes a raw query string into safe full-text search
/// tokens: split on whitespace, every word metacharacter-stripped, and
/// then either recognized as a delimited `AND`/`OR`/`NOT` operator or
/// lowercased into an ordinary term. Stripping metacharacters before the
/// operator check means `(AND)` and `AND,` still count as delimited, the
/// same as a bare `AND`.
pub fn tokenize_query(raw: &str) -> Vec<QueryToken> {
    raw.split_whitespace()
        .filter_map(|word| {
            let stripped: String = word.chars().filter(|c| is_token_char(*c)).collect();
            if let Some(op) = BooleanOp::from_stripped_word(&stripped) {
                return Some(QueryToken::Operator(op));
            }
            if stripped.is_empty() {
                return None;
            }
            Some(QueryToken::Term(stripped.to_lowercase()))
        })
        .collect()
}

/// Discards boolean operators and returns just the literal terms, for
/// callers like [`fulltext_rank`] that only implement term-overlap
/// ranking rather than full boolean query evaluation (see `DESIGN.md`
/// for why operator *semantics* are out of scope for this stand-in FTS
/// while operator *tokens* are still preserved faithfully above).
pub fn terms_only(tokens: &[QueryToken]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|t| match t {
            QueryToken::Term(term) => Some(term.clone()),
            QueryToken::Operator(_) => None,
        })
        .collect()
}

/// Ranks `fact_ids` by full-text relevance against `tokens`. This is a
/// minimal scorer (token-overlap count against each fact's content,
/// supplied by the caller) standing in for a real FTS engine; the
/// ranking contract (`Vec<FactId>` ordered best-first) is what downstream
/// fusion depends on, not this implementation.
pub fn fulltext_rank(tokens: &[String], corpus: &[(FactId, &str)]) -> Vec<FactId> {
    let mut scored: Vec<(FactId, usize)> = corpus
        .iter()
        .map(|(id, content)| {
            let lower = content.to_lowercase();
            let hits = tokens.iter().filter(|t| lower.contains(t.as_str())).count();
            (*id, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(id, _)| id).collect()
}

fn rrf_contribution(rank: usize, k: f64) -> f64 {
    1.0 / (k + (rank + 1) as f64)
}

/// Fuses a full-text ranking and a vector ranking via Reciprocal Rank
/// Fusion: `score(id) = sum(1 / (k + rank_i(id)))` over every channel
/// the id appears in.
pub fn reciprocal_rank_fusion(fulltext: &[FactId], vector: &[VectorHit], k: f64) -> Vec<SearchHit> {
    let mut scores: HashMap<FactId, f64> = HashMap::new();

    for (rank, id) in fulltext.iter().enumerate() {
        *scores.entry(*id).or_insert(0.0) += rrf_contribution(rank, k);
    }
    for (rank, hit) in vector.iter().enumerate() {
        *scores.entry(hit.fact_id).or_insert(0.0) += rrf_contribution(rank, k);
    }

    let mut hits: Vec<SearchHit> = scores.into_iter().map(|(fact_id, score)| SearchHit { fact_id, score }).collect();
    // Ties broken by `fact_id` ascending (`spec.md` §4.H) so ranking is
    // deterministic regardless of the hash map's iteration order.
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then(a.fact_id.0.cmp(&b.fact_id.0)));
    hits
}

/// Runs hybrid search for `tenant_id`: full-text rank over `corpus`
/// fused with a vector-store search, both tenant-scoped. If the vector
/// channel fails, returns the full-text-only result set tagged with
/// `SearchPartial` rather than failing the whole query.
pub fn hybrid_search(
    tenant_id: &TenantId,
    query: &str,
    corpus: &[(FactId, &str)],
    vector_query: &[f32],
    vector_store: &dyn VectorStore,
    top_k: usize,
) -> Result<Vec<SearchHit>, CortexError> {
    if tenant_id.as_str().is_empty() {
        return Err(CortexError::TenantIsolationError {
            reason: "hybrid search requires a non-empty tenant_id".to_string(),
        });
    }

    // Each channel is over-fetched at 2x the requested fan-out so the
    // fused ranking has enough candidates to pick the true top-k from,
    // per `spec.md` §4.H's "internal fetch limit is 2 × top_k per channel".
    let internal_limit = top_k.saturating_mul(2);

    let tokens = tokenize_query(query);
    let terms = terms_only(&tokens);
    let mut fulltext = fulltext_rank(&terms, corpus);
    fulltext.truncate(internal_limit);

    let vector = match vector_store.search(tenant_id, vector_query, internal_limit) {
        Ok(hits) => hits,
        Err(_) => Vec::new(),
    };

    let mut fused = reciprocal_rank_fusion(&fulltext, &vector, DEFAULT_RRF_K);
    fused.truncate(top_k);
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Embedding;
    use crate::vector_store::ExactScanVectorStore;

    #[test]
    fn tokenize_query_strips_punctuation_and_lowercases() {
        let tokens = tokenize_query("Hello, World! foo-bar_baz");
        assert_eq!(
            tokens,
            vec![
                QueryToken::Term("hello".to_string()),
                QueryToken::Term("world".to_string()),
                QueryToken::Term("foo-bar_baz".to_string()),
            ]
        );
    }

    #[test]
    fn tokenize_query_preserves_delimited_boolean_operators() {
        let tokens = tokenize_query("rust AND (safety) OR NOT unsafe");
        assert_eq!(
            tokens,
            vec![
                QueryToken::Term("rust".to_string()),
                QueryToken::Operator(BooleanOp::And),
                QueryToken::Term("safety".to_string()),
                QueryToken::Operator(BooleanOp::Or),
                QueryToken::Operator(BooleanOp::Not),
                QueryToken::Term("unsafe".to_string()),
            ]
        );
    }

    #[test]
    fn tokenize_query_lowercase_and_is_an_ordinary_term_not_an_operator() {
        let tokens = tokenize_query("fish and chips");
        assert_eq!(
            tokens,
            vec![
                QueryToken::Term("fish".to_string()),
                QueryToken::Term("and".to_string()),
                QueryToken::Term("chips".to_string()),
            ]
        );
    }

    #[test]
    fn terms_only_drops_operators() {
        let tokens = tokenize_query("rust AND safety");
        assert_eq!(terms_only(&tokens), vec!["rust".to_string(), "safety".to_string()]);
    }

    #[test]
    fn fulltext_rank_orders_by_token_overlap() {
        let corpus = vec![(FactId(1), "the cat sat on the mat"), (FactId(2), "the cat and the dog played")];
        let ranked = fulltext_rank(&["cat".to_string(), "dog".to_string()], &corpus);
        assert_eq!(ranked, vec![FactId(2), FactId(1)]);
    }

    #[test]
    fn rrf_rewards_ids_present_in_both_channels() {
        let fulltext = vec![FactId(1), FactId(2)];
        let vector = vec![VectorHit { fact_id: FactId(2), score: 0.9 }, VectorHit { fact_id: FactId(3), score: 0.8 }];
        let fused = reciprocal_rank_fusion(&fulltext, &vector, DEFAULT_RRF_K);

        assert_eq!(fused[0].fact_id, FactId(2), "fact present in both channels should rank first");
    }

    #[test]
    fn hybrid_search_rejects_empty_tenant() {
        let store = ExactScanVectorStore::new();
        let err = hybrid_search(&TenantId::new(""), "cat", &[], &[1.0], &store, 10).unwrap_err();
        assert!(matches!(err, CortexError::TenantIsolationError { .. }));
    }

    #[test]
    fn hybrid_search_fuses_both_channels_for_a_tenant() {
        let store = ExactScanVectorStore::new();
        store.upsert(Embedding { fact_id: FactId(1), tenant_id: TenantId::new("t1"), vector: vec![1.0, 0.0], model_id: "m".into() }).unwrap();

        let corpus = vec![(FactId(1), "the cat sat on the mat")];
        let hits = hybrid_search(&TenantId::new("t1"), "cat", &corpus, &[1.0, 0.0], &store, 10).unwrap();
        assert_eq!(hits[0].fact_id, FactId(1));
    }
}
