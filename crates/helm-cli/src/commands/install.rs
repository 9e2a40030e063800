use std::path::PathBuf;
use std::sync::Arc;

use helm_ledger::LedgerClient;
use helm_package::{PackageInstaller, PackageManifest};
use helm_types::HelmConfig;

use crate::archive::extract;
use crate::config::load_registries;
use crate::error::CliResult;
use crate::output::success;

/// `archive` is a tar.gz package archive; it's unpacked to a temp directory
/// that holds `manifest.json` at its root plus every asset the manifest
/// declares, under the relative paths the manifest uses.
pub async fn run(archive: PathBuf, dev: bool, force: bool, root: PathBuf, config: &HelmConfig) -> CliResult<()> {
    let extracted = extract(&archive)?;
    let manifest_path = extracted.root().join("manifest.json");
    let bytes = std::fs::read(&manifest_path)?;
    let manifest: PackageManifest = serde_json::from_slice(&bytes)?;

    let registries = load_registries(&root)?;
    let ledger = Arc::new(LedgerClient::open(root.join("ledger").join("install"), config.ledger.clone()).await?);

    let installer = PackageInstaller::new(root.clone(), root.join(".backups"), ledger)
        .with_registries(registries.specs, registries.frameworks)
        .with_trusted_keys(registries.trusted_keys)
        .dev_mode(config.gateway.dev_mode || dev || force)
        .allow_unsigned(config.package.allow_unsigned);

    let outcome = installer.install(manifest, extracted.root().to_path_buf()).await?;

    success(format!("installed {}", outcome.package_id));
    if !outcome.transferred.is_empty() {
        for (path, old_owner) in &outcome.transferred {
            println!("  ownership transferred: {path} (was {old_owner})");
        }
    }
    Ok(())
}
