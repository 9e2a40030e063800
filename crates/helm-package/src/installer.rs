use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use helm_ledger::LedgerClient;
use helm_types::{Metadata, Provenance, RelatedArtifact, Relational};
use uuid::Uuid;

use crate::error::PackageError;
use crate::gates::{default_pipeline, FrameworkCompletenessValidator, Gate, GateOutcome, InstallContext};
use crate::manifest::{AssetDeclaration, InstallReceipt, PackageManifest};
use crate::ownership::{OwnershipCsv, OwnershipRow};

#[derive(Clone, Debug)]
pub struct InstallOutcome {
    pub package_id: String,
    /// Files whose ownership transferred from another package to this one.
    pub transferred: HashMap<String, String>,
}

pub struct PackageInstaller {
    plane_root: PathBuf,
    backup_root: PathBuf,
    ledger: Arc<LedgerClient>,
    ownership: OwnershipCsv,
    gates: Vec<Box<dyn Gate>>,
    specs_registry: HashMap<String, String>,
    frameworks_registry: HashSet<String>,
    trusted_keys: HashSet<String>,
    completeness_validator: Option<Arc<dyn FrameworkCompletenessValidator>>,
    dev_mode: bool,
    allow_unsigned: bool,
}

impl PackageInstaller {
    pub fn new(plane_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>, ledger: Arc<LedgerClient>) -> Self {
        let plane_root = plane_root.into();
        let ownership = OwnershipCsv::new(plane_root.join("registries").join("file_ownership.csv"));
        Self {
            plane_root,
            backup_root: backup_root.into(),
            ledger,
            ownership,
            gates: default_pipeline(),
            specs_registry: HashMap::new(),
            frameworks_registry: HashSet::new(),
            trusted_keys: HashSet::new(),
            completeness_validator: None,
            dev_mode: false,
            allow_unsigned: false,
        }
    }

    pub fn with_registries(mut self, specs: HashMap<String, String>, frameworks: HashSet<String>) -> Self {
        self.specs_registry = specs;
        self.frameworks_registry = frameworks;
        self
    }

    pub fn with_trusted_keys(mut self, keys: HashSet<String>) -> Self {
        self.trusted_keys = keys;
        self
    }

    pub fn with_completeness_validator(mut self, validator: Arc<dyn FrameworkCompletenessValidator>) -> Self {
        self.completeness_validator = Some(validator);
        self
    }

    pub fn dev_mode(mut self, on: bool) -> Self {
        self.dev_mode = on;
        self
    }

    pub fn allow_unsigned(mut self, on: bool) -> Self {
        self.allow_unsigned = on;
        self
    }

    fn receipts_dir(&self) -> PathBuf {
        self.plane_root.join(".receipts")
    }

    fn receipt_path(&self, package_id: &str) -> PathBuf {
        self.receipts_dir().join(format!("{package_id}.json"))
    }

    fn load_existing_receipts(&self) -> Result<Vec<InstallReceipt>, PackageError> {
        let dir = self.receipts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut receipts = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                let bytes = std::fs::read(entry.path())?;
                receipts.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(receipts)
    }

    fn asset_metadata(manifest: &PackageManifest) -> Metadata {
        Metadata {
            provenance: Provenance {
                package_id: Some(manifest.package_id.clone()),
                ..Default::default()
            },
            relational: Relational {
                related_artifacts: manifest
                    .assets
                    .iter()
                    .map(|a| RelatedArtifact {
                        artifact_type: "file".to_string(),
                        id: a.path.clone(),
                    })
                    .collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn fail(&self, manifest: &PackageManifest, reason: String) -> Result<(), PackageError> {
        let mut metadata = Self::asset_metadata(manifest);
        metadata.outcome.status = Some("failed".to_string());
        metadata.outcome.error = Some(reason.clone());
        self.ledger
            .append("INSTALL_FAILED", metadata)
            .await
            .map_err(|e| PackageError::LedgerWriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Run the full install pipeline. On any validation failure, no file is
    /// touched and no ledger/ownership/receipt write happens beyond
    /// `INSTALL_STARTED`/`INSTALL_FAILED`. On integrity failure discovered
    /// post-copy, already-copied files are rolled back before the failure is
    /// recorded.
    pub async fn install(&self, manifest: PackageManifest, extracted_dir: PathBuf) -> Result<InstallOutcome, PackageError> {
        self.ledger
            .append("INSTALL_STARTED", Self::asset_metadata(&manifest))
            .await
            .map_err(|e| PackageError::LedgerWriteFailed(e.to_string()))?;

        let existing_receipts = self.load_existing_receipts()?;

        let ctx = InstallContext {
            manifest: manifest.clone(),
            extracted_dir: extracted_dir.clone(),
            plane_root: self.plane_root.clone(),
            existing_receipts,
            specs_registry: self.specs_registry.clone(),
            frameworks_registry: self.frameworks_registry.clone(),
            trusted_keys: self.trusted_keys.clone(),
            completeness_validator: self.completeness_validator.clone(),
            dev_mode: self.dev_mode,
            allow_unsigned: self.allow_unsigned,
        };

        for gate in &self.gates {
            match gate.validate(&ctx).await? {
                GateOutcome::Pass => {
                    tracing::debug!(gate = gate.name(), package_id = %manifest.package_id, "gate passed");
                }
                GateOutcome::Fail(reason) => {
                    let reason = format!("{}: {reason}", gate.name());
                    tracing::warn!(gate = gate.name(), package_id = %manifest.package_id, %reason, "gate denied install");
                    self.fail(&manifest, reason.clone()).await?;
                    return Err(PackageError::Validation(reason));
                }
            }
        }

        let mut transfer_paths = HashMap::new();
        for asset in &manifest.assets {
            if let Some(owner) = self.ownership.current_owner(&asset.path)? {
                if owner != manifest.package_id {
                    transfer_paths.insert(asset.path.clone(), owner);
                }
            }
        }

        let install_dir = self.backup_root.join(format!("install-{}", Uuid::new_v4()));
        let backed_up = self.backup_existing(&manifest, &install_dir)?;
        self.copy_assets(&manifest, &extracted_dir)?;

        if let Err(reason) = self.post_install_validate(&manifest).await {
            self.rollback(&manifest, &install_dir, &backed_up)?;
            self.fail(&manifest, reason.clone()).await?;
            return Err(PackageError::Integrity(reason));
        }

        // Commit order: ledger first (ledger is truth), then ownership rows,
        // then the receipt file.
        let mut metadata = Self::asset_metadata(&manifest);
        metadata.outcome.status = Some("installed".to_string());
        self.ledger
            .append("INSTALLED", metadata)
            .await
            .map_err(|e| PackageError::LedgerWriteFailed(e.to_string()))?;

        let mut rows = Vec::new();
        for asset in &manifest.assets {
            if let Some(old_owner) = transfer_paths.get(&asset.path) {
                rows.push(OwnershipRow::supersession(&asset.path, old_owner, &manifest.package_id));
            }
            rows.push(OwnershipRow::new_ownership(&asset.path, &manifest.package_id));
        }
        self.ownership.append_rows(&rows)?;

        self.write_receipt(&manifest)?;

        Ok(InstallOutcome {
            package_id: manifest.package_id,
            transferred: transfer_paths,
        })
    }

    fn backup_existing(&self, manifest: &PackageManifest, install_dir: &Path) -> Result<Vec<PathBuf>, PackageError> {
        let mut backed_up = Vec::new();
        for asset in &manifest.assets {
            let target = self.plane_root.join(&asset.path);
            if target.exists() {
                let backup_path = install_dir.join(&asset.path);
                if let Some(parent) = backup_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&target, &backup_path)?;
                backed_up.push(asset.path.clone().into());
            }
        }
        Ok(backed_up)
    }

    fn copy_assets(&self, manifest: &PackageManifest, extracted_dir: &Path) -> Result<(), PackageError> {
        for asset in &manifest.assets {
            let src = extracted_dir.join(&asset.path);
            let dst = self.plane_root.join(&asset.path);
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dst)?;
        }
        Ok(())
    }

    async fn post_install_validate(&self, manifest: &PackageManifest) -> Result<(), String> {
        for asset in &manifest.assets {
            let path = self.plane_root.join(&asset.path);
            let actual = helm_hash::hash_file(&path).await.map_err(|e| e.to_string())?;
            if actual != asset.hash {
                return Err(format!("post-install hash mismatch for {}", asset.path));
            }
        }
        Ok(())
    }

    /// Restore backed-up files from `install_dir`, remove newly-installed
    /// files that had no backup (meaning they did not previously exist), and
    /// prune directories left empty by the removal.
    fn rollback(&self, manifest: &PackageManifest, install_dir: &Path, backed_up: &[PathBuf]) -> Result<(), PackageError> {
        let backed_up: HashSet<&Path> = backed_up.iter().map(|p| p.as_path()).collect();
        for asset in &manifest.assets {
            let target = self.plane_root.join(&asset.path);
            let rel = Path::new(&asset.path);
            if backed_up.contains(rel) {
                let backup_path = install_dir.join(rel);
                std::fs::copy(&backup_path, &target)?;
                continue;
            }
            if target.exists() {
                std::fs::remove_file(&target)?;
                let mut dir = target.parent();
                while let Some(d) = dir {
                    if d == self.plane_root || !d.exists() {
                        break;
                    }
                    if std::fs::read_dir(d)?.next().is_none() {
                        std::fs::remove_dir(d)?;
                        dir = d.parent();
                    } else {
                        break;
                    }
                }
            }
        }
        tracing::warn!(package_id = %manifest.package_id, "install rolled back");
        Ok(())
    }

    fn write_receipt(&self, manifest: &PackageManifest) -> Result<(), PackageError> {
        let receipt = InstallReceipt {
            package_id: manifest.package_id.clone(),
            spec_id: manifest.spec_id.clone(),
            version: manifest.version.clone(),
            installed_at: Utc::now(),
            assets: manifest.assets.clone(),
        };
        std::fs::create_dir_all(self.receipts_dir())?;
        let bytes = serde_json::to_vec_pretty(&receipt)?;
        std::fs::write(self.receipt_path(&manifest.package_id), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_ledger::LedgerClient;
    use helm_types::config::LedgerConfig;

    fn asset(path: &str, hash: &str) -> AssetDeclaration {
        AssetDeclaration {
            path: path.to_string(),
            hash: hash.to_string(),
        }
    }

    async fn write_extracted(dir: &Path, path: &str, contents: &[u8]) -> String {
        let full = dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, contents).unwrap();
        helm_hash::hash_file(&full).await.unwrap()
    }

    #[tokio::test]
    async fn successful_install_commits_ledger_ownership_and_receipt() {
        let root = tempfile::tempdir().unwrap();
        let plane_root = root.path().join("plane");
        let backup_root = root.path().join("backups");
        let extracted = root.path().join("extracted");

        let hash = write_extracted(&extracted, "lib/foo.yaml", b"hello").await;
        let manifest = PackageManifest {
            package_id: "pkg-a".into(),
            spec_id: "spec-1".into(),
            version: "1.0.0".into(),
            signature: None,
            assets: vec![asset("lib/foo.yaml", &hash)],
        };

        let mut specs = HashMap::new();
        specs.insert("spec-1".to_string(), "framework-1".to_string());
        let mut frameworks = HashSet::new();
        frameworks.insert("framework-1".to_string());

        let ledger = Arc::new(
            LedgerClient::open(plane_root.join("ledger").join("install"), LedgerConfig::default())
                .await
                .unwrap(),
        );
        let installer = PackageInstaller::new(plane_root.clone(), backup_root, ledger.clone())
            .with_registries(specs, frameworks)
            .dev_mode(true);

        let outcome = installer.install(manifest, extracted).await.unwrap();
        assert_eq!(outcome.package_id, "pkg-a");
        assert!(plane_root.join("lib/foo.yaml").exists());

        let entries = ledger.read_all().await.unwrap();
        assert!(entries.iter().any(|e| e.event_type == "INSTALL_STARTED"));
        assert!(entries.iter().any(|e| e.event_type == "INSTALLED"));

        let ownership = OwnershipCsv::new(plane_root.join("registries").join("file_ownership.csv"));
        assert_eq!(ownership.current_owner("lib/foo.yaml").unwrap().as_deref(), Some("pkg-a"));
    }

    #[tokio::test]
    async fn hash_mismatch_is_rejected_without_side_effects() {
        let root = tempfile::tempdir().unwrap();
        let plane_root = root.path().join("plane");
        let backup_root = root.path().join("backups");
        let extracted = root.path().join("extracted");

        write_extracted(&extracted, "lib/foo.yaml", b"hello").await;
        let manifest = PackageManifest {
            package_id: "pkg-a".into(),
            spec_id: "spec-1".into(),
            version: "1.0.0".into(),
            signature: None,
            assets: vec![asset("lib/foo.yaml", "sha256:deadbeef")],
        };

        let mut specs = HashMap::new();
        specs.insert("spec-1".to_string(), "framework-1".to_string());
        let mut frameworks = HashSet::new();
        frameworks.insert("framework-1".to_string());

        let ledger = Arc::new(
            LedgerClient::open(plane_root.join("ledger").join("install"), LedgerConfig::default())
                .await
                .unwrap(),
        );
        let installer = PackageInstaller::new(plane_root.clone(), backup_root, ledger)
            .with_registries(specs, frameworks)
            .dev_mode(true);

        let err = installer.install(manifest, extracted).await.unwrap_err();
        assert!(matches!(err, PackageError::Validation(_)));
        assert!(!plane_root.join("lib/foo.yaml").exists());

        let ownership = OwnershipCsv::new(plane_root.join("registries").join("file_ownership.csv"));
        assert!(ownership.current_owner("lib/foo.yaml").unwrap().is_none());
    }

    #[tokio::test]
    async fn ownership_transfer_is_recorded_on_reinstall_by_another_package() {
        let root = tempfile::tempdir().unwrap();
        let plane_root = root.path().join("plane");
        let backup_root = root.path().join("backups");

        let mut specs = HashMap::new();
        specs.insert("spec-1".to_string(), "framework-1".to_string());
        let mut frameworks = HashSet::new();
        frameworks.insert("framework-1".to_string());

        let ledger = Arc::new(
            LedgerClient::open(plane_root.join("ledger").join("install"), LedgerConfig::default())
                .await
                .unwrap(),
        );
        let installer = PackageInstaller::new(plane_root.clone(), backup_root, ledger)
            .with_registries(specs, frameworks)
            .dev_mode(true);

        let extracted_a = root.path().join("extracted-a");
        let hash_a = write_extracted(&extracted_a, "lib/foo.yaml", b"version-a").await;
        installer
            .install(
                PackageManifest {
                    package_id: "pkg-a".into(),
                    spec_id: "spec-1".into(),
                    version: "1.0.0".into(),
                    signature: None,
                    assets: vec![asset("lib/foo.yaml", &hash_a)],
                },
                extracted_a,
            )
            .await
            .unwrap();

        let extracted_b = root.path().join("extracted-b");
        let hash_b = write_extracted(&extracted_b, "lib/foo.yaml", b"version-b").await;
        let outcome = installer
            .install(
                PackageManifest {
                    package_id: "pkg-b".into(),
                    spec_id: "spec-1".into(),
                    version: "1.0.0".into(),
                    signature: None,
                    assets: vec![asset("lib/foo.yaml", &hash_b)],
                },
                extracted_b,
            )
            .await
            .unwrap();

        assert_eq!(outcome.transferred.get("lib/foo.yaml").map(String::as_str), Some("pkg-a"));

        let ownership = OwnershipCsv::new(plane_root.join("registries").join("file_ownership.csv"));
        assert_eq!(ownership.current_owner("lib/foo.yaml").unwrap().as_deref(), Some("pkg-b"));
        let rows = ownership.read_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].owner_package_id, "pkg-a");
        assert!(rows[0].replaced_date.is_none(), "original row must stay unmodified");
    }
}
