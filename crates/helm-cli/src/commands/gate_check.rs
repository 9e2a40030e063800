use std::path::PathBuf;

use helm_package::{default_pipeline, GateOutcome, InstallContext, PackageManifest};
use helm_types::HelmConfig;

use crate::archive::extract;
use crate::config::load_registries;
use crate::error::{CliError, CliResult};
use crate::output::{failure, success};

/// Dry-run the install pipeline against a tar.gz archive without copying
/// files, writing the ledger, or touching ownership — the same gates
/// `install` runs, reported without committing anything.
pub async fn run(archive: PathBuf, gate: Option<String>, all: bool, root: PathBuf, config: &HelmConfig) -> CliResult<()> {
    let extracted = extract(&archive)?;
    let manifest_path = extracted.root().join("manifest.json");
    let bytes = std::fs::read(&manifest_path)?;
    let manifest: PackageManifest = serde_json::from_slice(&bytes)?;

    let registries = load_registries(&root)?;
    let ctx = InstallContext {
        manifest,
        extracted_dir: extracted.root().to_path_buf(),
        plane_root: root,
        existing_receipts: Vec::new(),
        specs_registry: registries.specs,
        frameworks_registry: registries.frameworks,
        trusted_keys: registries.trusted_keys,
        completeness_validator: None,
        dev_mode: config.gateway.dev_mode,
        allow_unsigned: config.package.allow_unsigned,
    };

    let gates = default_pipeline();
    let selected: Vec<_> = gates
        .iter()
        .filter(|g| all || gate.is_none() || gate.as_deref() == Some(g.name()))
        .collect();

    if selected.is_empty() {
        return Err(CliError::Usage(format!("no gate named {gate:?} in the pipeline")));
    }

    let mut any_failed = false;
    for gate in selected {
        match gate.validate(&ctx).await? {
            GateOutcome::Pass => success(format!("{} pass", gate.name())),
            GateOutcome::Fail(reason) => {
                any_failed = true;
                failure(format!("{} fail: {reason}", gate.name()));
            }
        }
    }

    if any_failed {
        Err(CliError::Usage("one or more gates failed".to_string()))
    } else {
        Ok(())
    }
}
