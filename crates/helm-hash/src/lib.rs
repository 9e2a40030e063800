//! Canonical JSON, SHA-256 hashing, and Merkle roots.
//!
//! This is the one place in the workspace that decides what "the hash of a
//! value" means; every other crate that needs a stable hash (ledger chaining,
//! package manifests, attention context fingerprints) goes through here so the
//! rule is enforced in exactly one place.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("value is not representable in canonical form: {0}")]
    NotCanonicalizable(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Canonicalize a JSON value: object keys sorted recursively, no insignificant
/// whitespace, UTF-8 strings passed through unescaped beyond what JSON requires,
/// and no `NaN`/`Infinity` (unrepresentable in `serde_json::Number` to begin
/// with, so this falls out of the type rather than needing a runtime check).
///
/// Two values that are structurally equal after recursively sorting object
/// keys canonicalize to the same bytes, regardless of original key order.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(&Value::String((*k).clone()), out);
                out.push(':');
                write_canonical(&map[*k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => {
            // Strings, numbers, bools, null: serde_json's compact form already
            // satisfies the no-whitespace / no-NaN-or-Inf rule.
            out.push_str(&serde_json::to_string(other).unwrap_or_default());
        }
    }
}

/// SHA-256 over a value's canonical form, hex-encoded.
pub fn hash_json(value: &Value) -> String {
    hash_string(&canonicalize(value))
}

/// SHA-256 over an arbitrary string, hex-encoded.
pub fn hash_string(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 over raw bytes, hex-encoded.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 over a file's contents, hex-encoded, prefixed `sha256:` the way
/// package manifest hash fields are specified.
pub async fn hash_file(path: impl AsRef<Path>) -> Result<String, HashError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| HashError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(format!("sha256:{}", hash_bytes(&bytes)))
}

/// Build a Merkle root over an ordered list of leaf hashes (hex strings).
/// An empty input hashes to the SHA-256 of the empty string. An odd level is
/// completed by duplicating its last node, the common convention for binary
/// Merkle trees.
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return hash_string("");
    }
    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level.last().unwrap().clone());
        }
        level = level
            .chunks(2)
            .map(|pair| hash_string(&format!("{}{}", pair[0], pair[1])))
            .collect();
    }
    level.into_iter().next().unwrap()
}

/// Hash a JSON object after removing a named field, used by the ledger to
/// compute `entry_hash` over "the entry without entry_hash".
pub fn hash_json_excluding(value: &Value, excluded_field: &str) -> Result<String, HashError> {
    let Value::Object(map) = value else {
        return Err(HashError::NotCanonicalizable(
            "expected a JSON object".to_string(),
        ));
    };
    let mut pruned = map.clone();
    pruned.remove(excluded_field);
    Ok(hash_json(&Value::Object(pruned)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_form_ignores_key_order() {
        let a = json!({"b": 1, "a": 2, "c": {"y": 1, "x": 2}});
        let b = json!({"a": 2, "c": {"x": 2, "y": 1}, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(hash_json(&a), hash_json(&b));
    }

    #[test]
    fn canonical_form_has_no_whitespace() {
        let v = json!({"a": [1, 2, 3], "b": "x"});
        let s = canonicalize(&v);
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn merkle_root_of_single_leaf_is_itself() {
        let leaf = hash_string("only");
        assert_eq!(merkle_root(&[leaf.clone()]), leaf);
    }

    #[test]
    fn merkle_root_of_empty_is_stable() {
        assert_eq!(merkle_root(&[]), hash_string(""));
    }

    #[test]
    fn merkle_root_handles_odd_leaf_count() {
        let leaves: Vec<String> = vec!["a", "b", "c"]
            .into_iter()
            .map(hash_string)
            .collect();
        // Should not panic and should be deterministic.
        let r1 = merkle_root(&leaves);
        let r2 = merkle_root(&leaves);
        assert_eq!(r1, r2);
    }

    #[test]
    fn hash_json_excluding_matches_manual_removal() {
        let v = json!({"entry_hash": "abc", "x": 1});
        let expected = hash_json(&json!({"x": 1}));
        assert_eq!(hash_json_excluding(&v, "entry_hash").unwrap(), expected);
    }

    proptest::proptest! {
        #[test]
        fn canonicalize_is_deterministic(a in 0i64..1000, b in 0i64..1000, s in "[a-z]{0,10}") {
            let v1 = json!({"a": a, "b": b, "s": s.clone()});
            let v2 = json!({"b": b, "s": s, "a": a});
            proptest::prop_assert_eq!(canonicalize(&v1), canonicalize(&v2));
        }
    }
}
