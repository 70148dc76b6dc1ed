use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort object keys for stable hashing.
pub fn canonical_json(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new_map = serde_json::Map::new();
            for k in keys {
                let child = map.get(&k).cloned().unwrap_or(Value::Null);
                new_map.insert(k, canonical_json(&child));
            }
            Value::Object(new_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// sha256 over the canonical JSON encoding of `v`.
pub fn canonical_hash(v: &Value) -> String {
    let bytes = canonical_json(v).to_string();
    sha256_hex(bytes.as_bytes())
}
