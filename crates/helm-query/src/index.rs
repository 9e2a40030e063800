use std::collections::HashMap;
use std::time::{Duration, Instant};

use helm_types::LedgerEntry;

/// A cached snapshot of one tier's ledger plus an inverted index by
/// `event_type`. The index is a cache, never a source of truth: staleness is
/// decided by entry-count drift or TTL, and a stale index always triggers a
/// full re-read rather than returning answers from old data.
pub struct TierIndex {
    pub snapshot: Vec<LedgerEntry>,
    pub by_event_type: HashMap<String, Vec<usize>>,
    built_at: Instant,
    entry_count_at_build: usize,
}

impl TierIndex {
    pub fn build(snapshot: Vec<LedgerEntry>) -> Self {
        let mut by_event_type: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in snapshot.iter().enumerate() {
            by_event_type.entry(entry.event_type.clone()).or_default().push(i);
        }
        let entry_count_at_build = snapshot.len();
        Self {
            snapshot,
            by_event_type,
            built_at: Instant::now(),
            entry_count_at_build,
        }
    }

    pub fn is_stale(&self, current_entry_count: usize, rebuild_threshold: usize, ttl: Duration) -> bool {
        current_entry_count.saturating_sub(self.entry_count_at_build) >= rebuild_threshold
            || self.built_at.elapsed() >= ttl
    }

    /// Indices of entries whose event_type is one of `event_types`. Returns
    /// `None` when `event_types` is empty, meaning "no event-type narrowing
    /// available — caller must full-scan".
    pub fn candidates_for_event_types(&self, event_types: &[String]) -> Option<Vec<usize>> {
        if event_types.is_empty() {
            return None;
        }
        let mut out: Vec<usize> = event_types
            .iter()
            .filter_map(|t| self.by_event_type.get(t))
            .flatten()
            .copied()
            .collect();
        out.sort_unstable();
        out.dedup();
        Some(out)
    }
}
