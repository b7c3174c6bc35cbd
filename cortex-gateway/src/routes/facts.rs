//! `/facts` and `/projects/:project/facts`: the fact CRUD slice of the
//! Core API (`spec.md` §6 — `store_fact`, `deprecate_fact`, `get_fact`,
//! `list_project`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cortex_engine::ledger::ListFilters;
use cortex_engine::types::{Confidence, Fact, FactDraft, FactId, FactType, SessionId, TenantId};

use crate::routes::error::{map_error, ApiError};
use crate::state::SharedState;

/// Request body for `POST /facts`.
#[derive(Debug, Deserialize)]
pub struct StoreFactRequest {
    pub tenant: String,
    pub project: String,
    pub fact_type: FactType,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Session this fact should also be admitted into the L1 working
    /// window for, if any.
    pub session: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoreFactResponse {
    pub fact_id: u64,
    pub privacy_tier: Option<&'static str>,
    pub embedding_deferred: bool,
    pub summary_fact_id: Option<u64>,
}

/// `POST /facts` — `store_fact(...) -> fact_id`, routed through the
/// memory orchestrator's `ingest` so the Privacy Shield and L1/L2
/// side effects run exactly as they would for any other caller.
pub async fn store_fact(State(state): State<SharedState>, Json(body): Json<StoreFactRequest>) -> Result<(StatusCode, Json<StoreFactResponse>), ApiError> {
    let mut draft = FactDraft::new(body.tenant, body.project, body.fact_type, body.content, body.source);
    draft.tags = body.tags;
    draft.valid_from = body.valid_from;
    draft.valid_until = body.valid_until;

    let session_id = body.session.map(SessionId::new);

    let outcome = state.engine.memory.ingest(draft, session_id, Utc::now()).await.map_err(map_error)?;

    Ok((
        StatusCode::CREATED,
        Json(StoreFactResponse {
            fact_id: outcome.fact_id.0,
            privacy_tier: outcome.privacy_tier,
            embedding_deferred: outcome.embedding_deferred,
            summary_fact_id: outcome.summary_fact_id.map(|id| id.0),
        }),
    ))
}

/// Request body for `POST /facts/:fact_id/deprecate`.
#[derive(Debug, Deserialize)]
pub struct DeprecateFactRequest {
    pub tenant: String,
    pub reason: String,
}

/// `POST /facts/:fact_id/deprecate` — `deprecate_fact(tenant, fact_id,
/// reason) -> void`.
pub async fn deprecate_fact(State(state): State<SharedState>, Path(fact_id): Path<u64>, Json(body): Json<DeprecateFactRequest>) -> Result<StatusCode, ApiError> {
    let tenant_id = TenantId::new(body.tenant);
    state
        .engine
        .ledger
        .deprecate_fact(&tenant_id, FactId(fact_id), body.reason, Utc::now())
        .await
        .map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct GetFactQuery {
    pub tenant: String,
    pub as_of: Option<DateTime<Utc>>,
}

/// DTO for [`Fact`] with hashes hex-encoded for JSON transport.
#[derive(Debug, Serialize)]
pub struct FactResponse {
    pub id: u64,
    pub tenant_id: String,
    pub project: String,
    pub fact_type: FactType,
    pub content: String,
    pub tags: Vec<String>,
    pub confidence: Confidence,
    pub consensus_score: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub source: String,
    pub content_hash: String,
    pub prev_hash: String,
    pub sensitive: bool,
}

impl From<Fact> for FactResponse {
    fn from(fact: Fact) -> Self {
        Self {
            id: fact.id.0,
            tenant_id: fact.tenant_id.to_string(),
            project: fact.project,
            fact_type: fact.fact_type,
            content: fact.content,
            tags: fact.tags,
            confidence: fact.confidence,
            consensus_score: fact.consensus_score,
            valid_from: fact.valid_from,
            valid_until: fact.valid_until,
            source: fact.source,
            content_hash: fact.content_hash.to_hex(),
            prev_hash: fact.prev_hash.to_hex(),
            sensitive: fact.sensitive,
        }
    }
}

/// `GET /facts/:fact_id?tenant=...&as_of=...` — `get_fact(tenant,
/// fact_id, as_of?) -> Fact`.
pub async fn get_fact(State(state): State<SharedState>, Path(fact_id): Path<u64>, Query(query): Query<GetFactQuery>) -> Result<Json<FactResponse>, ApiError> {
    let tenant_id = TenantId::new(query.tenant);
    let fact = state.engine.ledger.get_fact(&tenant_id, FactId(fact_id), query.as_of).map_err(map_error)?;
    Ok(Json(fact.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListProjectQuery {
    pub tenant: String,
    pub confidence: Option<Confidence>,
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    pub cursor: Option<String>,
}

fn default_list_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ListProjectResponse {
    pub items: Vec<FactResponse>,
    pub next_cursor: Option<String>,
}

/// `GET /projects/:project/facts?tenant=...` — `list_project(tenant,
/// project, {confidence?, as_of?, limit, cursor}) -> {items,
/// next_cursor}`.
pub async fn list_project(State(state): State<SharedState>, Path(project): Path<String>, Query(query): Query<ListProjectQuery>) -> Result<Json<ListProjectResponse>, ApiError> {
    let tenant_id = TenantId::new(query.tenant);
    let filters = ListFilters { confidence: query.confidence, as_of: query.as_of, limit: query.limit, cursor: query.cursor };

    let page = state.engine.ledger.list_project(&tenant_id, &project, filters).map_err(map_error)?;

    Ok(Json(ListProjectResponse {
        items: page.items.into_iter().map(FactResponse::from).collect(),
        next_cursor: page.next_cursor,
    }))
}
