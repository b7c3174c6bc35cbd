//! Maps [`CortexError`] onto HTTP status codes and a stable JSON error
//! body, per `spec.md` §7: "Error kinds are exposed as stable
//! identifiers; message strings are sanitized (no internal paths or
//! SQL)."

use axum::Json;
use axum::http::StatusCode;
use cortex_engine::CortexError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn map_error(err: CortexError) -> ApiError {
    let (status, kind) = match &err {
        CortexError::TenantIsolationError { .. } => (StatusCode::FORBIDDEN, "tenant_isolation_error"),
        CortexError::EncodingError(_) => (StatusCode::BAD_REQUEST, "encoding_error"),
        CortexError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        CortexError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        CortexError::ChainBreak { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "chain_break"),
        CortexError::MerkleMismatch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "merkle_mismatch"),
        CortexError::QuorumUnmet { .. } => (StatusCode::OK, "quorum_unmet"),
        CortexError::EmbeddingDeferred(_) => (StatusCode::OK, "embedding_deferred"),
        CortexError::SearchPartial { .. } => (StatusCode::OK, "search_partial"),
        CortexError::Busy { .. } => (StatusCode::SERVICE_UNAVAILABLE, "busy"),
        CortexError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        CortexError::PrivacyBlocked { .. } => (StatusCode::OK, "privacy_blocked"),
        CortexError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        CortexError::UnknownAgent(_) => (StatusCode::NOT_FOUND, "unknown_agent"),
        CortexError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    };

    (status, Json(ErrorBody { kind, message: err.to_string() }))
}
