//! `/search` and `/context`: the read side of the Core API (`spec.md`
//! §6 — `search`, `context`).

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cortex_engine::ledger::ListFilters;
use cortex_engine::types::{SessionId, TenantId};

use crate::routes::error::{map_error, ApiError};
use crate::state::SharedState;

/// Candidate pool size fed into hybrid search's full-text channel, when
/// the caller's `project` has more facts than fit in one `list_project`
/// page. Kept small: this gateway is a thin demonstration surface, not
/// a tenant-wide search index (`SPEC_FULL.md`, gateway scope).
const CORPUS_FETCH_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub tenant: String,
    /// `search(tenant, query, {top_k, as_of?, project?})` narrows to one
    /// project in `spec.md`; this gateway requires it, since
    /// `MemoryOrchestrator::recall` takes an explicit, caller-supplied
    /// corpus rather than maintaining a tenant-wide full-text index.
    pub project: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub as_of: Option<DateTime<Utc>>,
    /// Precomputed query embedding. No embedder is wired into this
    /// gateway by default, so omitting this degrades search to the
    /// full-text channel only (`spec.md` §7: embedding failures are
    /// local and non-fatal).
    #[serde(default)]
    pub query_vector: Vec<f32>,
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchHitResponse {
    pub fact_id: u64,
    pub score: f64,
}

/// `POST /search` — `search(tenant, query, {top_k, as_of?, project?}) ->
/// [Hit]`.
pub async fn search(State(state): State<SharedState>, Json(body): Json<SearchRequest>) -> Result<Json<Vec<SearchHitResponse>>, ApiError> {
    let tenant_id = TenantId::new(body.tenant);

    let filters = ListFilters { confidence: None, as_of: body.as_of, limit: CORPUS_FETCH_LIMIT, cursor: None };
    let page = state.engine.ledger.list_project(&tenant_id, &body.project, filters).map_err(map_error)?;

    let corpus: Vec<(cortex_engine::types::FactId, &str)> = page.items.iter().map(|fact| (fact.id, fact.content.as_str())).collect();

    let hits = state
        .engine
        .memory
        .recall(&tenant_id, &body.query, &corpus, &body.query_vector, body.top_k)
        .map_err(map_error)?;

    Ok(Json(hits.into_iter().map(|hit| SearchHitResponse { fact_id: hit.fact_id.0, score: hit.score }).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub tenant: String,
    pub session: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct FactRefResponse {
    pub fact_id: u64,
    pub inserted_at: DateTime<Utc>,
    pub token_estimate: u32,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub window: Vec<FactRefResponse>,
    pub recent_semantic: Vec<SearchHitResponse>,
}

/// `GET /context?tenant=...&session=...` — `context(tenant, session) ->
/// {window: [FactRef], recent_semantic: [Hit]}`.
pub async fn context(State(state): State<SharedState>, Query(query): Query<ContextQuery>) -> Result<Json<ContextResponse>, ApiError> {
    let tenant_id = TenantId::new(query.tenant);
    let session_id = SessionId::new(query.session);

    let session_context = state.engine.memory.context(&tenant_id, &session_id, query.top_k).map_err(map_error)?;

    Ok(Json(ContextResponse {
        window: session_context
            .window
            .into_iter()
            .map(|entry| FactRefResponse { fact_id: entry.fact_id.0, inserted_at: entry.inserted_at, token_estimate: entry.token_estimate })
            .collect(),
        recent_semantic: session_context.related.into_iter().map(|hit| SearchHitResponse { fact_id: hit.fact_id.0, score: hit.score }).collect(),
    }))
}
