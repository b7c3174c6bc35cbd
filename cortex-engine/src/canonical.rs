//! Canonical encoding for hash-bearing records (`spec.md` §4.A, the
//! Canonicalizer).
//!
//! `content_hash` and `tx_hash` are SHA-256 digests over a canonical
//! byte representation, not over whatever a naive `serde_json::to_vec`
//! would produce, because JSON does not otherwise guarantee key order,
//! timestamp format, or float formatting are stable across encoders.
//! The rules, from `spec.md`:
//!
//! - object keys sorted lexicographically,
//! - no insignificant whitespace,
//! - timestamps as RFC3339 UTC with microsecond precision,
//! - numbers that aren't integers as fixed 6-decimal-place decimal
//!   strings (never raw JSON floats),
//! - null fields elided rather than emitted as `null`,
//! - arrays preserve caller-given order (tags, not re-sorted).
//!
//! `serde_json::Map` is backed by a `BTreeMap` whenever the
//! `preserve_order` feature is off (it is, in this workspace), so
//! building a `Value::Object` from one already yields sorted keys; this
//! module only needs to own the float/timestamp/null rules on top of
//! that.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::CortexError;
use crate::types::{Fact, Transaction, TxAction};

/// Formats a UTC timestamp the canonical way: RFC3339 with microsecond
/// precision and a literal `Z` suffix.
pub fn canonical_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Formats a float as a fixed 6-decimal-place decimal string, per
/// §4.A's "numbers as decimal strings (no float formatting ambiguity)".
pub fn canonical_decimal(value: f64) -> String {
    format!("{value:.6}")
}

/// Serializes a [`Value`] to canonical bytes: compact (no insignificant
/// whitespace) and, because `Map` is BTreeMap-backed here, with object
/// keys in lexicographic order.
fn canonical_bytes(value: &Value) -> Result<Vec<u8>, CortexError> {
    serde_json::to_vec(value).map_err(|e| CortexError::EncodingError(e.to_string()))
}

fn put(map: &mut Map<String, Value>, key: &str, value: Value) {
    // Elide nulls rather than emitting `"key": null`.
    if !value.is_null() {
        map.insert(key.to_string(), value);
    }
}

/// Builds the canonical JSON object for a fact's content, i.e. the
/// fields that determine its `content_hash`. Deliberately excludes
/// `id`, `content_hash`, `confidence`, and `consensus_score`, since
/// those are either assigned after hashing or mutate over the fact's
/// lifetime without changing its identity.
fn fact_content_value(draft_tenant: &str, project: &str, fact_type: &str, content: &str, tags: &[String], source: &str) -> Value {
    let mut map = Map::new();
    put(&mut map, "tenant_id", Value::String(draft_tenant.to_string()));
    put(&mut map, "project", Value::String(project.to_string()));
    put(&mut map, "fact_type", Value::String(fact_type.to_string()));
    put(&mut map, "content", Value::String(content.to_string()));
    put(
        &mut map,
        "tags",
        Value::Array(tags.iter().map(|t| Value::String(t.clone())).collect()),
    );
    put(&mut map, "source", Value::String(source.to_string()));
    Value::Object(map)
}

/// Computes the canonical content hash for a not-yet-committed fact's
/// identity fields.
pub fn content_hash_for(
    tenant_id: &str,
    project: &str,
    fact_type: &str,
    content: &str,
    tags: &[String],
    source: &str,
) -> Result<crate::types::Hash256, CortexError> {
    let value = fact_content_value(tenant_id, project, fact_type, content, tags, source);
    let bytes = canonical_bytes(&value)?;
    Ok(crate::types::Hash256::compute(&bytes))
}

/// Computes the content hash of an already-constructed [`Fact`]. Used
/// to verify a stored fact's hash still matches its fields (chain
/// verification).
pub fn fact_content_hash(fact: &Fact) -> Result<crate::types::Hash256, CortexError> {
    content_hash_for(
        fact.tenant_id.as_str(),
        &fact.project,
        fact.fact_type.as_str(),
        &fact.content,
        &fact.tags,
        &fact.source,
    )
}

/// Canonical JSON value for a transaction's hash-bearing fields:
/// everything except `hash` itself, which is computed over this value.
fn tx_value(tx: &Transaction) -> Result<Value, CortexError> {
    let mut map = Map::new();
    put(&mut map, "id", Value::Number(tx.id.0.into()));
    put(&mut map, "tenant_id", Value::String(tx.tenant_id.as_str().to_string()));
    put(
        &mut map,
        "action",
        serde_json::to_value(&tx.action).map_err(|e| CortexError::EncodingError(e.to_string()))?,
    );
    put(&mut map, "timestamp", Value::String(canonical_timestamp(tx.timestamp)));
    put(&mut map, "prev_hash", Value::String(tx.prev_hash.to_hex()));
    Ok(Value::Object(map))
}

/// Computes `tx_hash = SHA256(canonical(tx without its own hash field))`.
pub fn tx_hash(tx: &Transaction) -> Result<crate::types::Hash256, CortexError> {
    let value = tx_value(tx)?;
    let bytes = canonical_bytes(&value)?;
    Ok(crate::types::Hash256::compute(&bytes))
}

/// Rejects content that the canonicalizer cannot represent faithfully:
/// non-UTF-8 byte sequences (already excluded by `&str`'s invariant, so
/// this only guards against lone surrogates smuggled through escape
/// sequences) and timestamps not in UTC.
pub fn validate_encodable(content: &str) -> Result<(), CortexError> {
    if content.contains('\u{FFFD}') {
        return Err(CortexError::EncodingError(
            "content contains the Unicode replacement character, suggesting invalid input encoding".to_string(),
        ));
    }
    Ok(())
}
