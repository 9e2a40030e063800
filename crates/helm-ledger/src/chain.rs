use helm_types::LedgerEntry;
use serde_json::to_value;

use crate::error::LedgerError;

/// Result of verifying a sequence of ledger entries against the hash-chain
/// invariant: `entries[i].previous_hash == entries[i-1].entry_hash` for every
/// `i > 0`, and every entry's own `entry_hash` matches its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainVerification {
    pub ok: bool,
    pub total_entries: usize,
    pub verified_entries: usize,
    pub break_at: Option<usize>,
    pub reason: Option<String>,
}

/// Recompute an entry's `entry_hash` from its content (everything but the hash
/// field itself) and compare to the stored value.
pub fn verify_entry(entry: &LedgerEntry) -> Result<bool, LedgerError> {
    let value = to_value(entry)?;
    let computed = helm_hash::hash_json_excluding(&value, "entry_hash")?;
    Ok(computed == entry.entry_hash)
}

/// Walk a full ledger (already read into memory, in file order) and verify
/// both per-entry hash correctness and chain linkage.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<ChainVerification, LedgerError> {
    if entries.is_empty() {
        return Ok(ChainVerification {
            ok: true,
            total_entries: 0,
            verified_entries: 0,
            break_at: None,
            reason: None,
        });
    }

    for (i, entry) in entries.iter().enumerate() {
        if !verify_entry(entry)? {
            return Ok(ChainVerification {
                ok: false,
                total_entries: entries.len(),
                verified_entries: i,
                break_at: Some(i),
                reason: Some(format!("entry {} has a mismatched entry_hash", entry.entry_id)),
            });
        }

        if i > 0 {
            let expected_prev = &entries[i - 1].entry_hash;
            if entry.previous_hash.as_ref() != Some(expected_prev) {
                return Ok(ChainVerification {
                    ok: false,
                    total_entries: entries.len(),
                    verified_entries: i,
                    break_at: Some(i),
                    reason: Some(format!(
                        "entry {} previous_hash mismatch: expected {}, got {:?}",
                        entry.entry_id, expected_prev, entry.previous_hash
                    )),
                });
            }
        }
    }

    Ok(ChainVerification {
        ok: true,
        total_entries: entries.len(),
        verified_entries: entries.len(),
        break_at: None,
        reason: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::build_entry;
    use helm_types::{Metadata, Scope, Tier};

    fn entry(event_type: &str, prev: Option<String>) -> LedgerEntry {
        build_entry(
            event_type,
            Metadata {
                scope: Scope { tier: Tier::Ho1 },
                ..Default::default()
            },
            prev,
        )
    }

    #[test]
    fn empty_chain_is_ok() {
        let result = verify_chain(&[]).unwrap();
        assert!(result.ok);
    }

    #[test]
    fn single_entry_chain_is_ok() {
        let e = entry("WO_PLANNED", None);
        let result = verify_chain(&[e]).unwrap();
        assert!(result.ok);
    }

    #[test]
    fn linked_chain_is_ok() {
        let e1 = entry("WO_PLANNED", None);
        let e2 = entry("WO_DISPATCHED", Some(e1.entry_hash.clone()));
        let result = verify_chain(&[e1, e2]).unwrap();
        assert!(result.ok);
    }

    #[test]
    fn broken_link_is_detected() {
        let e1 = entry("WO_PLANNED", None);
        let mut e2 = entry("WO_DISPATCHED", Some(e1.entry_hash.clone()));
        e2.previous_hash = Some("not-the-right-hash".to_string());
        let result = verify_chain(&[e1, e2]).unwrap();
        assert!(!result.ok);
        assert_eq!(result.break_at, Some(1));
    }

    #[test]
    fn tampered_entry_is_detected() {
        let e1 = entry("WO_PLANNED", None);
        let mut e2 = entry("WO_DISPATCHED", Some(e1.entry_hash.clone()));
        e2.metadata.outcome.status = Some("tampered".to_string());
        let result = verify_chain(&[e1, e2]).unwrap();
        assert!(!result.ok);
        assert_eq!(result.break_at, Some(1));
    }
}
