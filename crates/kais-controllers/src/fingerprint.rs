//! Content-addressed hashing used by `CellController` (pod-affecting spec
//! changes) and `BlueprintController` (version bumps). Not cryptographic —
//! same non-cryptographic `DefaultHasher`-over-serialised-form shape as the
//! teacher's `agenticlaw_kg::executor::short_hash`.

use std::hash::{Hash, Hasher};

use serde::Serialize;

use kais_core::Result;

pub fn fingerprint<T: Serialize>(value: &T) -> Result<String> {
    // serde_json's default `Map` is BTreeMap-backed (no `preserve_order`
    // feature enabled anywhere in this workspace), so the serialised form is
    // stable regardless of struct field order or `HashMap` iteration order.
    let json = serde_json::to_string(value)?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    json.hash(&mut hasher);
    Ok(format!("{:016x}", hasher.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_value_same_fingerprint() {
        let a = fingerprint(&json!({"a": 1, "b": [1,2,3]})).unwrap();
        let b = fingerprint(&json!({"a": 1, "b": [1,2,3]})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_value_different_fingerprint() {
        let a = fingerprint(&json!({"a": 1})).unwrap();
        let b = fingerprint(&json!({"a": 2})).unwrap();
        assert_ne!(a, b);
    }
}
