//! `/agents` and `/facts/:fact_id/votes`: the WBFT consensus slice of
//! the Core API (`spec.md` §6 — `register_agent`, `cast_vote`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cortex_engine::types::{AgentId, Confidence, TenantId};

use crate::routes::error::{map_error, ApiError};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub tenant: String,
    pub agent_id: String,
    pub public_key_fingerprint: String,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub id: String,
    pub public_key_fingerprint: String,
    pub reputation_score: f64,
    pub total_votes: u64,
    pub successful_votes: u64,
    pub last_active_at: DateTime<Utc>,
    pub is_active: bool,
}

/// `POST /agents` — `register_agent(tenant, {id,
/// public_key_fingerprint}) -> Agent`.
pub async fn register_agent(State(state): State<SharedState>, Json(body): Json<RegisterAgentRequest>) -> Result<(StatusCode, Json<AgentResponse>), ApiError> {
    let tenant_id = TenantId::new(body.tenant);
    let agent_id = AgentId::new(body.agent_id);

    let agent = state
        .engine
        .consensus
        .register_agent(&tenant_id, agent_id, body.public_key_fingerprint, Utc::now())
        .await
        .map_err(map_error)?;

    Ok((
        StatusCode::CREATED,
        Json(AgentResponse {
            id: agent.id.to_string(),
            public_key_fingerprint: agent.public_key_fingerprint,
            reputation_score: agent.reputation_score,
            total_votes: agent.total_votes,
            successful_votes: agent.successful_votes,
            last_active_at: agent.last_active_at,
            is_active: agent.is_active,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub tenant: String,
    pub agent_id: String,
    /// `+1` or `-1`; any other value is rejected as `EncodingError`.
    pub value: i8,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CastVoteResponse {
    pub score: f64,
    pub confidence: Confidence,
}

/// `POST /facts/:fact_id/votes` — `cast_vote(tenant, fact_id, agent_id,
/// value, reason?) -> {score, confidence}`.
pub async fn cast_vote(State(state): State<SharedState>, Path(fact_id): Path<u64>, Json(body): Json<CastVoteRequest>) -> Result<Json<CastVoteResponse>, ApiError> {
    let tenant_id = TenantId::new(body.tenant);
    let agent_id = AgentId::new(body.agent_id);

    let outcome = state
        .engine
        .consensus
        .cast_vote(&tenant_id, cortex_engine::types::FactId(fact_id), &agent_id, body.value, body.reason, Utc::now())
        .await
        .map_err(map_error)?;

    Ok(Json(CastVoteResponse { score: outcome.consensus_score, confidence: outcome.confidence }))
}
