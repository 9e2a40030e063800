//! PackageInstaller + Gates (C3): a strictly-ordered install pipeline over a
//! shared control-plane root, with append-only ownership history and
//! ledger-first commit ordering.

pub mod error;
pub mod gates;
pub mod installer;
pub mod manifest;
pub mod ownership;

pub use error::PackageError;
pub use gates::{
    default_pipeline, ChainGate, CompletenessGate, FrameworkCompletenessValidator, Gate, GateOutcome,
    InstallContext, PackageDeclarationGate, SignatureGate, SystemIntegrityGate,
};
pub use installer::{InstallOutcome, PackageInstaller};
pub use manifest::{AssetDeclaration, InstallReceipt, PackageManifest};
pub use ownership::{OwnershipCsv, OwnershipRow};
