//! Fingerprints for delivered documents and the requests behind them.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    Sha256::digest(data.as_ref())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Compact JSON with object keys sorted at every depth. Array order is kept.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                Value::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
            }
            Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
            scalar => scalar,
        }
    }

    serde_json::to_string(&canonicalize(serde_json::to_value(value)?))
}

pub fn document_hash(document: &str) -> String {
    sha256_hex(document)
}

/// `sha256("{category}:{canonical request}:{engine version}")`
pub fn compute_request_hash(
    category: &str,
    request: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(request)?;
    Ok(sha256_hex(format!("{category}:{canonical}:{engine_version}")))
}
