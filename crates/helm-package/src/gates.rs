use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PackageError;
use crate::manifest::{InstallReceipt, PackageManifest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Fail(String),
}

impl GateOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateOutcome::Pass)
    }
}

/// Capability probe for G1-COMPLETE. Absent entirely at Layer 0 bootstrap, in
/// which case that gate passes trivially.
#[async_trait]
pub trait FrameworkCompletenessValidator: Send + Sync {
    async fn validate(&self, framework_id: &str) -> Result<bool, PackageError>;
}

/// Everything a gate needs to render a verdict. Built fresh per install.
pub struct InstallContext {
    pub manifest: PackageManifest,
    pub extracted_dir: PathBuf,
    pub plane_root: PathBuf,
    pub existing_receipts: Vec<InstallReceipt>,
    pub specs_registry: HashMap<String, String>,
    pub frameworks_registry: HashSet<String>,
    pub trusted_keys: HashSet<String>,
    pub completeness_validator: Option<Arc<dyn FrameworkCompletenessValidator>>,
    pub dev_mode: bool,
    pub allow_unsigned: bool,
}

/// A single stage of the install pipeline. Gates are a capability set, not a
/// fixed list — register additional gates without modifying the driver.
#[async_trait]
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;
    async fn validate(&self, ctx: &InstallContext) -> Result<GateOutcome, PackageError>;
}

/// G0B: for every existing receipt, rehash every file it lists and compare
/// against the recorded hash. Passes trivially if there are no receipts yet.
pub struct SystemIntegrityGate;

#[async_trait]
impl Gate for SystemIntegrityGate {
    fn name(&self) -> &'static str {
        "G0B"
    }

    async fn validate(&self, ctx: &InstallContext) -> Result<GateOutcome, PackageError> {
        let mut mismatches = Vec::new();
        for receipt in &ctx.existing_receipts {
            for asset in &receipt.assets {
                let path = ctx.plane_root.join(&asset.path);
                if !path.exists() {
                    mismatches.push(format!("{} (missing)", asset.path));
                    continue;
                }
                let actual = helm_hash::hash_file(&path).await?;
                if actual != asset.hash {
                    mismatches.push(asset.path.clone());
                }
            }
        }
        if mismatches.is_empty() {
            Ok(GateOutcome::Pass)
        } else {
            Ok(GateOutcome::Fail(format!(
                "system integrity violated for: {}",
                mismatches.join(", ")
            )))
        }
    }
}

/// G0A: every file in the extracted set is declared in the manifest, every
/// declared file exists with a matching hash, and no declared path escapes
/// the plane root.
pub struct PackageDeclarationGate;

#[async_trait]
impl Gate for PackageDeclarationGate {
    fn name(&self) -> &'static str {
        "G0A"
    }

    async fn validate(&self, ctx: &InstallContext) -> Result<GateOutcome, PackageError> {
        if let Some(escaped) = ctx.manifest.declares_path_escape() {
            return Ok(GateOutcome::Fail(format!("declared path escapes plane root: {escaped}")));
        }

        let extracted = list_files_relative(&ctx.extracted_dir)?;
        let declared: HashSet<&str> = ctx.manifest.assets.iter().map(|a| a.path.as_str()).collect();

        let undeclared: Vec<&String> = extracted
            .iter()
            .filter(|p| p.as_str() != "manifest.json" && !declared.contains(p.as_str()))
            .collect();
        if !undeclared.is_empty() {
            return Ok(GateOutcome::Fail(format!(
                "extracted files not declared in manifest: {}",
                undeclared.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            )));
        }

        let mut mismatches = Vec::new();
        for asset in &ctx.manifest.assets {
            let path = ctx.extracted_dir.join(&asset.path);
            if !path.exists() {
                mismatches.push(format!("{} (missing)", asset.path));
                continue;
            }
            let actual = helm_hash::hash_file(&path).await?;
            if actual != asset.hash {
                mismatches.push(asset.path.clone());
            }
        }
        if mismatches.is_empty() {
            Ok(GateOutcome::Pass)
        } else {
            Ok(GateOutcome::Fail(format!(
                "declared hash mismatch for: {}",
                mismatches.join(", ")
            )))
        }
    }
}

fn list_files_relative(root: &Path) -> Result<Vec<String>, PackageError> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out)?;
            } else {
                let rel = path.strip_prefix(root).unwrap_or(&path);
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
    let mut out = Vec::new();
    if root.exists() {
        walk(root, root, &mut out)?;
    }
    Ok(out)
}

/// G1: manifest's `spec_id` resolves in the specs registry, and that spec's
/// `framework_id` resolves in the frameworks registry.
pub struct ChainGate;

#[async_trait]
impl Gate for ChainGate {
    fn name(&self) -> &'static str {
        "G1"
    }

    async fn validate(&self, ctx: &InstallContext) -> Result<GateOutcome, PackageError> {
        let Some(framework_id) = ctx.specs_registry.get(&ctx.manifest.spec_id) else {
            return Ok(GateOutcome::Fail(format!(
                "spec_id {} does not resolve in the specs registry",
                ctx.manifest.spec_id
            )));
        };
        if ctx.frameworks_registry.contains(framework_id) {
            Ok(GateOutcome::Pass)
        } else {
            Ok(GateOutcome::Fail(format!(
                "framework_id {framework_id} does not resolve in the frameworks registry"
            )))
        }
    }
}

/// G1-COMPLETE: state-gated via a capability probe. Absent means pass
/// trivially (Layer 0 bootstrap); present means its verdict is binding.
pub struct CompletenessGate;

#[async_trait]
impl Gate for CompletenessGate {
    fn name(&self) -> &'static str {
        "G1-COMPLETE"
    }

    async fn validate(&self, ctx: &InstallContext) -> Result<GateOutcome, PackageError> {
        let Some(validator) = &ctx.completeness_validator else {
            return Ok(GateOutcome::Pass);
        };
        let framework_id = ctx
            .specs_registry
            .get(&ctx.manifest.spec_id)
            .map(String::as_str)
            .unwrap_or(ctx.manifest.spec_id.as_str());
        if validator.validate(framework_id).await? {
            Ok(GateOutcome::Pass)
        } else {
            Ok(GateOutcome::Fail(format!(
                "framework {framework_id} failed completeness validation"
            )))
        }
    }
}

/// G5: verify the attached signature against the trusted key registry,
/// unless running in `--dev` mode or `ALLOW_UNSIGNED` is set.
pub struct SignatureGate;

#[async_trait]
impl Gate for SignatureGate {
    fn name(&self) -> &'static str {
        "G5"
    }

    async fn validate(&self, ctx: &InstallContext) -> Result<GateOutcome, PackageError> {
        if ctx.dev_mode || ctx.allow_unsigned {
            return Ok(GateOutcome::Pass);
        }
        match &ctx.manifest.signature {
            Some(sig) if ctx.trusted_keys.contains(sig) => Ok(GateOutcome::Pass),
            Some(_) => Ok(GateOutcome::Fail("signature not in trusted key registry".into())),
            None => Ok(GateOutcome::Fail("package is unsigned".into())),
        }
    }
}

/// The canonical pipeline in required order: G0B, G0A, G1, G1-COMPLETE, G5.
pub fn default_pipeline() -> Vec<Box<dyn Gate>> {
    vec![
        Box::new(SystemIntegrityGate),
        Box::new(PackageDeclarationGate),
        Box::new(ChainGate),
        Box::new(CompletenessGate),
        Box::new(SignatureGate),
    ]
}
