use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::PackageError;

/// A single row of `file_ownership.csv`. Rows are never rewritten or deleted;
/// the latest row for a given `file_path` defines the current owner, and the
/// full history stays on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OwnershipRow {
    pub file_path: String,
    pub owner_package_id: String,
    pub installed_date: String,
    #[serde(default)]
    pub replaced_date: Option<String>,
    #[serde(default)]
    pub superseded_by: Option<String>,
}

impl OwnershipRow {
    pub fn new_ownership(file_path: impl Into<String>, owner_package_id: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            owner_package_id: owner_package_id.into(),
            installed_date: Utc::now().to_rfc3339(),
            replaced_date: None,
            superseded_by: None,
        }
    }

    pub fn supersession(file_path: impl Into<String>, old_owner: impl Into<String>, new_owner: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            file_path: file_path.into(),
            owner_package_id: old_owner.into(),
            installed_date: now.clone(),
            replaced_date: Some(now),
            superseded_by: Some(new_owner.into()),
        }
    }
}

/// Append-only accessor over `file_ownership.csv`. Mirrors the ledger's
/// append-first, never-rewrite discipline for a tabular registry instead of a
/// hash-chained one.
pub struct OwnershipCsv {
    path: PathBuf,
}

impl OwnershipCsv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(&self) -> Result<Vec<OwnershipRow>, PackageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// The current owner of `file_path`: the owner on the *last* row matching
    /// it, since rows are append-only and later rows supersede earlier ones.
    /// A supersession row's `owner_package_id` names the superseded package,
    /// not the new owner, so callers should prefer the nearest ownership row
    /// (no `superseded_by`) when both exist for the same path.
    pub fn current_owner(&self, file_path: &str) -> Result<Option<String>, PackageError> {
        let rows = self.read_all()?;
        Ok(rows
            .iter()
            .rev()
            .find(|r| r.file_path == file_path && r.superseded_by.is_none())
            .map(|r| r.owner_package_id.clone()))
    }

    /// Append `rows` to the file, writing a header only if the file is new.
    pub fn append_rows(&self, rows: &[OwnershipRow]) -> Result<(), PackageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file_exists = self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_owner_is_none_before_any_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv = OwnershipCsv::new(dir.path().join("file_ownership.csv"));
        assert!(csv.current_owner("lib/foo").unwrap().is_none());
    }

    #[test]
    fn ownership_transfer_preserves_history() {
        let dir = tempfile::tempdir().unwrap();
        let csv = OwnershipCsv::new(dir.path().join("file_ownership.csv"));

        csv.append_rows(&[OwnershipRow::new_ownership("lib/foo", "pkg-a")]).unwrap();
        assert_eq!(csv.current_owner("lib/foo").unwrap().as_deref(), Some("pkg-a"));

        csv.append_rows(&[
            OwnershipRow::supersession("lib/foo", "pkg-a", "pkg-b"),
            OwnershipRow::new_ownership("lib/foo", "pkg-b"),
        ])
        .unwrap();

        assert_eq!(csv.current_owner("lib/foo").unwrap().as_deref(), Some("pkg-b"));

        let rows = csv.read_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].owner_package_id, "pkg-a");
        assert!(rows[0].replaced_date.is_none());
    }
}
