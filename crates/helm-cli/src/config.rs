use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use helm_types::HelmConfig;

use crate::error::CliResult;

/// Resolve the install root: `--root`, then `HELM_ROOT` (picked up by clap's
/// `env` attribute on the flag already), then the legacy `CONTROL_PLANE_ROOT`
/// alias, then whatever `HelmConfig` defaults to.
pub fn resolve_root(cli_root: Option<String>, config: &HelmConfig) -> PathBuf {
    let root = cli_root
        .or_else(|| std::env::var("CONTROL_PLANE_ROOT").ok())
        .unwrap_or_else(|| config.root.path.clone());
    PathBuf::from(root)
}

pub fn load_config(config_path: Option<&str>, dev: bool) -> CliResult<HelmConfig> {
    let mut config = HelmConfig::load(config_path)?;
    if dev || env_flag("DEV_MODE") {
        config.gateway.dev_mode = true;
    }
    if env_flag("ALLOW_UNSIGNED") {
        config.package.allow_unsigned = true;
    }
    Ok(config)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Registries live as plain JSON under `<root>/registries/` — a spec resolving
/// to its framework, the set of known frameworks, and trusted signing keys.
/// Absent files mean empty registries (every `G1`/`G5` check then fails closed
/// unless `--dev`/`ALLOW_UNSIGNED` is set).
pub struct Registries {
    pub specs: HashMap<String, String>,
    pub frameworks: HashSet<String>,
    pub trusted_keys: HashSet<String>,
}

pub fn load_registries(root: &Path) -> CliResult<Registries> {
    let dir = root.join("registries");
    Ok(Registries {
        specs: read_json_or_default(&dir.join("specs.json"))?,
        frameworks: read_json_or_default(&dir.join("frameworks.json"))?,
        trusted_keys: read_json_or_default(&dir.join("trusted_keys.json"))?,
    })
}

fn read_json_or_default<T: Default + serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
