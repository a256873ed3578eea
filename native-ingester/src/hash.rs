use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Fingerprint of a content body, sent as `X-Native-Hash` so the native store
/// can detect duplicate writes.
///
/// SHA-256 over the JSON serialization of the body with object keys sorted at
/// every level, hex encoded. Field order in the incoming message does not
/// change the hash.
pub fn native_hash(body: &Map<String, Value>) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(&sorted_object(body))?;
    Ok(format!("{:x}", Sha256::digest(&canonical)))
}

fn sorted_object(map: &Map<String, Value>) -> Value {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.clone(), sorted(value)))
            .collect(),
    )
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => sorted_object(map),
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
