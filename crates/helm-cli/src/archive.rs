use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempDir;

use crate::error::CliResult;

/// An extracted package archive. Holds the `TempDir` guard so the unpacked
/// tree is cleaned up when the command finishes.
pub struct ExtractedArchive {
    _dir: TempDir,
    root: PathBuf,
}

impl ExtractedArchive {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Unpack a tar.gz package archive into a fresh temp directory. Archive
/// entries are expected flat at the root (no leading `./`), with
/// `manifest.json` alongside the declared asset paths.
pub fn extract(archive_path: &Path) -> CliResult<ExtractedArchive> {
    let file = std::fs::File::open(archive_path)?;
    let dir = tempfile::tempdir()?;

    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);
    archive.unpack(dir.path())?;

    Ok(ExtractedArchive {
        root: dir.path().to_path_buf(),
        _dir: dir,
    })
}
