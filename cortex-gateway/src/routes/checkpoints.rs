//! `/checkpoints` and `/chain`: the Merkle Checkpointer and ledger
//! integrity slice of the Core API (`spec.md` §6 — `create_checkpoint`,
//! `verify_chain`, `export_verifiable`, `import_verifiable`).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use cortex_engine::merkle;
use cortex_engine::types::{TenantId, TxId};

use crate::routes::error::{map_error, ApiError};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckpointResponse {
    pub checkpoint_id: Option<u64>,
}

/// `POST /checkpoints?tenant=...` — `create_checkpoint(tenant) ->
/// CheckpointId | null`.
pub async fn create_checkpoint(State(state): State<SharedState>, Query(query): Query<TenantQuery>) -> Result<Json<CreateCheckpointResponse>, ApiError> {
    let tenant_id = TenantId::new(query.tenant);
    let id = state.engine.checkpointer.create_checkpoint(&tenant_id, chrono::Utc::now()).await.map_err(map_error)?;
    Ok(Json(CreateCheckpointResponse { checkpoint_id: id.map(|id| id.0) }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyChainQuery {
    pub tenant: String,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ViolationResponse {
    pub id: u64,
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VerifyChainResponse {
    pub valid: bool,
    pub violations: Vec<ViolationResponse>,
}

/// `GET /chain/verify?tenant=...&from=...&to=...` — `verify_chain(tenant,
/// [from?, to?]) -> {valid, violations[]}`.
pub async fn verify_chain(State(state): State<SharedState>, Query(query): Query<VerifyChainQuery>) -> Result<Json<VerifyChainResponse>, ApiError> {
    let tenant_id = TenantId::new(query.tenant);
    let result = state
        .engine
        .ledger
        .verify_chain(&tenant_id, query.from.map(TxId), query.to.map(TxId))
        .map_err(map_error)?;

    Ok(Json(VerifyChainResponse {
        valid: result.valid,
        violations: result.violations.into_iter().map(|v| ViolationResponse { id: v.id.0, kind: v.kind }).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub tenant: String,
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Serialize)]
pub struct ManifestResponse {
    pub tenant_id: String,
    pub tx_start: u64,
    pub tx_end: u64,
    pub root_hash: String,
    pub file_hash: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    /// Base64-encoded exported transaction blob.
    pub blob: String,
    pub manifest: ManifestResponse,
}

/// `GET /checkpoints/export?tenant=...&from=...&to=...` —
/// `export_verifiable(tenant, [from?, to?]) -> {blob, manifest{root,
/// file_hash}}`.
pub async fn export_verifiable(State(state): State<SharedState>, Query(query): Query<ExportQuery>) -> Result<Json<ExportResponse>, ApiError> {
    let tenant_id = TenantId::new(query.tenant);
    let (blob, manifest) = state.engine.checkpointer.export_verifiable(&tenant_id, TxId(query.from), TxId(query.to)).map_err(map_error)?;

    Ok(Json(ExportResponse {
        blob: base64::engine::general_purpose::STANDARD.encode(blob),
        manifest: ManifestResponse {
            tenant_id: manifest.tenant_id,
            tx_start: manifest.tx_start.0,
            tx_end: manifest.tx_end.0,
            root_hash: manifest.root_hash.to_hex(),
            file_hash: manifest.file_hash.to_hex(),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub blob: String,
    pub manifest: ManifestRequest,
}

#[derive(Debug, Deserialize)]
pub struct ManifestRequest {
    pub tenant_id: String,
    pub tx_start: u64,
    pub tx_end: u64,
    pub root_hash: String,
    pub file_hash: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub valid: bool,
    pub mismatches: Vec<String>,
}

/// `POST /checkpoints/import` — `import_verifiable(manifest, blob) ->
/// {valid, mismatches[]}`.
pub async fn import_verifiable(Json(body): Json<ImportRequest>) -> Result<(StatusCode, Json<ImportResponse>), ApiError> {
    let root_hash = parse_hash(&body.manifest.root_hash)?;
    let file_hash = parse_hash(&body.manifest.file_hash)?;
    let blob = base64::engine::general_purpose::STANDARD
        .decode(&body.blob)
        .map_err(|e| map_error(cortex_engine::CortexError::EncodingError(format!("invalid base64 blob: {e}"))))?;

    let manifest = merkle::ExportManifest {
        tenant_id: body.manifest.tenant_id,
        tx_start: TxId(body.manifest.tx_start),
        tx_end: TxId(body.manifest.tx_end),
        root_hash,
        file_hash,
    };

    match merkle::import_verifiable(&blob, &manifest) {
        Ok(_txs) => Ok((StatusCode::OK, Json(ImportResponse { valid: true, mismatches: Vec::new() }))),
        Err(e) => Ok((StatusCode::OK, Json(ImportResponse { valid: false, mismatches: vec![e.to_string()] }))),
    }
}

fn parse_hash(s: &str) -> Result<cortex_engine::types::Hash256, ApiError> {
    cortex_engine::types::Hash256::from_hex(s).ok_or_else(|| map_error(cortex_engine::CortexError::EncodingError(format!("invalid hex hash: {s}"))))
}
