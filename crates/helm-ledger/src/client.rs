use std::path::{Path, PathBuf};

use helm_types::{LedgerEntry, Metadata};
use serde_json::to_value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chain::{verify_chain, ChainVerification};
use crate::error::LedgerError;
use helm_types::config::LedgerConfig;

/// Build a ledger entry for `event_type`/`metadata`, chained onto `previous_hash`,
/// with `entry_hash = SHA256(canonicalize(entry without entry_hash))`.
pub fn build_entry(event_type: &str, metadata: Metadata, previous_hash: Option<String>) -> LedgerEntry {
    let mut entry = LedgerEntry {
        entry_id: Uuid::new_v4().to_string(),
        event_type: event_type.to_string(),
        timestamp: chrono::Utc::now(),
        previous_hash,
        entry_hash: String::new(),
        metadata,
    };
    let value = to_value(&entry).expect("LedgerEntry always serializes");
    entry.entry_hash = helm_hash::hash_json_excluding(&value, "entry_hash")
        .expect("canonicalization of a LedgerEntry object never fails");
    entry
}

#[derive(Debug)]
struct ChainState {
    last_hash: Option<String>,
    entry_count: u64,
    segment_index: u32,
    segment_entry_count: u64,
    segment_bytes: u64,
}

/// Append-only, hash-chained JSONL ledger over a segmented set of files named
/// `<base>.NNNNN.jsonl`. One `LedgerClient` owns exactly one logical ledger
/// (e.g. `HO1/ledger/worker` or a per-session `exec`/`evidence` stream);
/// appends are serialized through an in-process lock standing in for the
/// single-writer-per-path advisory-lock discipline the design calls for.
pub struct LedgerClient {
    base_path: PathBuf,
    config: LedgerConfig,
    state: Mutex<ChainState>,
}

impl LedgerClient {
    /// Open (or create) the ledger rooted at `base_path` (no extension — segment
    /// suffixes and `.jsonl` are appended). Scans existing segments to recover
    /// chain state so restarts never lose `previous_hash` continuity.
    pub async fn open(base_path: impl Into<PathBuf>, config: LedgerConfig) -> Result<Self, LedgerError> {
        let base_path = base_path.into();
        if let Some(parent) = base_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let (segment_index, state) = Self::recover_state(&base_path).await?;
        let mut state = state;
        state.segment_index = segment_index;

        Ok(Self {
            base_path,
            config,
            state: Mutex::new(state),
        })
    }

    fn segment_path(base_path: &Path, index: u32) -> PathBuf {
        let file_name = base_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("ledger");
        base_path.with_file_name(format!("{file_name}.{index:05}.jsonl"))
    }

    async fn recover_state(base_path: &Path) -> Result<(u32, ChainState), LedgerError> {
        let mut index = 0u32;
        loop {
            let candidate = Self::segment_path(base_path, index + 1);
            if !candidate.exists() {
                break;
            }
            index += 1;
        }

        let current = Self::segment_path(base_path, index);
        if !current.exists() {
            return Ok((
                index,
                ChainState {
                    last_hash: None,
                    entry_count: 0,
                    segment_index: index,
                    segment_entry_count: 0,
                    segment_bytes: 0,
                },
            ));
        }

        let file = File::open(&current).await?;
        let meta = file.metadata().await?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut last_hash = None;
        let mut segment_entry_count = 0u64;
        let mut total = 0u64;
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(trimmed)?;
            last_hash = Some(entry.entry_hash);
            segment_entry_count += 1;
            total += 1;
        }

        Ok((
            index,
            ChainState {
                last_hash,
                entry_count: total,
                segment_index: index,
                segment_entry_count,
                segment_bytes: meta.len(),
            },
        ))
    }

    /// Append a new entry for `event_type`/`metadata`, returning its `entry_id`.
    /// Rotates to a new segment first if the current one has crossed its
    /// configured size or entry-count threshold; the new segment's first entry
    /// embeds the prior segment's terminal hash as `previous_hash`, preserving
    /// the chain across the rotation boundary.
    pub async fn append(&self, event_type: &str, metadata: Metadata) -> Result<String, LedgerError> {
        let mut state = self.state.lock().await;

        if state.segment_entry_count > 0
            && (state.segment_bytes >= self.config.segment_max_bytes
                || state.segment_entry_count >= self.config.segment_max_entries)
        {
            state.segment_index += 1;
            state.segment_entry_count = 0;
            state.segment_bytes = 0;
        }

        let entry = build_entry(event_type, metadata, state.last_hash.clone());
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let path = Self::segment_path(&self.base_path, state.segment_index);
        let write_result: Result<(), LedgerError> = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(e) = write_result {
            tracing::error!(entry_id = %entry.entry_id, error = %e, "ledger append failed");
            return Err(LedgerError::WriteFailed(e.to_string()));
        }

        state.last_hash = Some(entry.entry_hash.clone());
        state.entry_count += 1;
        state.segment_entry_count += 1;
        state.segment_bytes += line.len() as u64;

        tracing::debug!(entry_id = %entry.entry_id, event_type, "ledger entry appended");
        Ok(entry.entry_id)
    }

    /// Read every entry across every segment, in file/rotation order.
    pub async fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = Vec::new();
        let mut index = 0u32;
        loop {
            let path = Self::segment_path(&self.base_path, index);
            if !path.exists() {
                break;
            }
            entries.extend(Self::read_segment(&path).await?);
            index += 1;
        }
        Ok(entries)
    }

    async fn read_segment(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
        let file = File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(trimmed)?);
        }
        Ok(entries)
    }

    /// Read entries with 0-based index in `[start, end)` across the logical
    /// (concatenated) ledger.
    pub async fn read_range(&self, start: usize, end: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        let all = self.read_all().await?;
        let end = end.min(all.len());
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(all[start..end].to_vec())
    }

    /// Read the most recent `n` entries, in chronological order.
    pub async fn read_recent(&self, n: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        let all = self.read_all().await?;
        let start = all.len().saturating_sub(n);
        Ok(all[start..].to_vec())
    }

    /// Read entries whose `event_type` matches.
    pub async fn query_by_event_type(&self, event_type: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let all = self.read_all().await?;
        Ok(all.into_iter().filter(|e| e.event_type == event_type).collect())
    }

    /// Verify the full chain (all segments concatenated in order). Detection
    /// never auto-repairs — a break is reported, not fixed.
    pub async fn verify_chain(&self) -> Result<ChainVerification, LedgerError> {
        let all = self.read_all().await?;
        verify_chain(&all)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::{Scope, Tier};

    fn meta() -> Metadata {
        Metadata {
            scope: Scope { tier: Tier::Ho1 },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn append_and_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let client = LedgerClient::open(dir.path().join("worker"), LedgerConfig::default())
            .await
            .unwrap();

        client.append("WO_PLANNED", meta()).await.unwrap();
        client.append("WO_DISPATCHED", meta()).await.unwrap();

        let all = client.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, "WO_PLANNED");
        assert_eq!(all[1].previous_hash.as_deref(), Some(all[0].entry_hash.as_str()));
    }

    #[tokio::test]
    async fn verify_chain_passes_on_fresh_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let client = LedgerClient::open(dir.path().join("worker"), LedgerConfig::default())
            .await
            .unwrap();
        for i in 0..5 {
            client.append(&format!("EVENT_{i}"), meta()).await.unwrap();
        }
        let result = client.verify_chain().await.unwrap();
        assert!(result.ok);
        assert_eq!(result.total_entries, 5);
    }

    #[tokio::test]
    async fn segment_rotation_chains_across_segments() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            segment_max_bytes: u64::MAX,
            segment_max_entries: 2,
        };
        let client = LedgerClient::open(dir.path().join("worker"), config)
            .await
            .unwrap();

        client.append("A", meta()).await.unwrap();
        client.append("B", meta()).await.unwrap();
        // Rotation happens lazily on the next append after the threshold is hit.
        client.append("C", meta()).await.unwrap();

        assert!(dir.path().join("worker.00000.jsonl").exists());
        assert!(dir.path().join("worker.00001.jsonl").exists());

        let all = client.read_all().await.unwrap();
        assert_eq!(all.len(), 3);
        let result = client.verify_chain().await.unwrap();
        assert!(result.ok, "chain must stay linked across a segment rotation");
    }

    #[tokio::test]
    async fn reopening_recovers_chain_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker");
        {
            let client = LedgerClient::open(&path, LedgerConfig::default()).await.unwrap();
            client.append("A", meta()).await.unwrap();
        }
        let client = LedgerClient::open(&path, LedgerConfig::default()).await.unwrap();
        let id = client.append("B", meta()).await.unwrap();
        let all = client.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].entry_id, id);
        assert!(client.verify_chain().await.unwrap().ok);
    }

    #[tokio::test]
    async fn read_recent_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let client = LedgerClient::open(dir.path().join("worker"), LedgerConfig::default())
            .await
            .unwrap();
        for i in 0..10 {
            client.append(&format!("E{i}"), meta()).await.unwrap();
        }
        let recent = client.read_recent(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent.last().unwrap().event_type, "E9");

        let range = client.read_range(2, 5).await.unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].event_type, "E2");
    }
}
