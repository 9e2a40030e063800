use serde::{Deserialize, Serialize};

/// Declares the assets a package brings to the control plane and what they
/// hash to, plus the registry chain (`spec_id` -> `framework_id`) G1 resolves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageManifest {
    pub package_id: String,
    pub spec_id: String,
    pub version: String,
    #[serde(default)]
    pub signature: Option<String>,
    pub assets: Vec<AssetDeclaration>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetDeclaration {
    /// Relative path under the plane root, e.g. `prompts/classify.yaml`.
    pub path: String,
    /// `sha256:<hex>` as produced by `helm_hash::hash_file`.
    pub hash: String,
}

impl PackageManifest {
    /// A path is an escape attempt if it is absolute or contains a `..`
    /// component, either of which would let an installed asset land outside
    /// the plane root.
    pub fn declares_path_escape(&self) -> Option<&str> {
        self.assets.iter().find_map(|a| {
            let is_escape = std::path::Path::new(&a.path).is_absolute()
                || a.path.split('/').any(|seg| seg == "..");
            is_escape.then_some(a.path.as_str())
        })
    }
}

/// Written to `<plane_root>/.receipts/<package_id>.json` after a successful
/// install; read back on every future install to drive the G0B system
/// integrity rehash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub package_id: String,
    pub spec_id: String,
    pub version: String,
    pub installed_at: chrono::DateTime<chrono::Utc>,
    pub assets: Vec<AssetDeclaration>,
}
