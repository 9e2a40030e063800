use std::path::PathBuf;

use helm_ledger::LedgerClient;
use helm_types::{Metadata, Outcome, Provenance, Scope, SandboxConfig, Tier};
use walkdir::WalkDir;

use crate::env::EnvGuard;
use crate::error::SandboxError;
use crate::writes::{DeclaredOutput, RealizedWrite, WriteReport};

/// A session's exclusive scratch and output trees, plus the redirected
/// environment an agent's tool calls see while the turn runs.
///
/// Dropping a `TurnSandbox` restores the prior environment but does not
/// delete `tmp/<sid>/` or `output/<sid>/` — callers that want cleanup call
/// [`TurnSandbox::enter`] again for the next turn of the same session, which
/// reuses the same directories.
pub struct TurnSandbox {
    session_id: String,
    tmp_dir: PathBuf,
    output_dir: PathBuf,
    declared_outputs: Vec<DeclaredOutput>,
    _env: EnvGuard,
}

impl TurnSandbox {
    /// Create (or reuse) `tmp/<sid>/` and `output/<sid>/` under `config`'s
    /// roots and redirect `TMPDIR`/`TEMP`/`TMP`/`PYTHONDONTWRITEBYTECODE` to
    /// point inside them.
    pub fn enter(
        config: &SandboxConfig,
        session_id: impl Into<String>,
        declared_outputs: Vec<DeclaredOutput>,
    ) -> Result<Self, SandboxError> {
        let session_id = session_id.into();
        let tmp_dir = PathBuf::from(&config.tmp_root).join(&session_id);
        let output_dir = PathBuf::from(&config.output_root).join(&session_id);
        std::fs::create_dir_all(&tmp_dir)?;
        std::fs::create_dir_all(&output_dir)?;

        let env = EnvGuard::apply(&tmp_dir);

        tracing::debug!(session_id = %session_id, tmp = %tmp_dir.display(), out = %output_dir.display(), "sandbox entered");

        Ok(Self {
            session_id,
            tmp_dir,
            output_dir,
            declared_outputs,
            _env: env,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn tmp_dir(&self) -> &std::path::Path {
        &self.tmp_dir
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    async fn realized_writes(&self) -> Result<Vec<RealizedWrite>, SandboxError> {
        let mut writes = Vec::new();
        for (root_name, root) in [("tmp", &self.tmp_dir), ("output", &self.output_dir)] {
            if !root.exists() {
                continue;
            }
            for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
                let path = format!("{root_name}/{}", rel.to_string_lossy().replace('\\', "/"));
                let hash = helm_hash::hash_file(entry.path()).await?;
                writes.push(RealizedWrite { path, hash });
            }
        }
        writes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(writes)
    }

    /// Walk both trees, hash every file found, and diff against the
    /// declared output set. Never fails closed by erroring out of the I/O
    /// itself — a non-empty `missing`/`undeclared` is reported, not raised,
    /// so callers can log and promote/reject as they see fit.
    pub async fn verify_writes(&self) -> Result<WriteReport, SandboxError> {
        let realized = self.realized_writes().await?;
        Ok(WriteReport::diff(&self.declared_outputs, realized))
    }

    /// Run [`Self::verify_writes`] and fold the result into the HO1 evidence
    /// ledger: `SANDBOX_VERIFIED` on a clean diff, `CAPABILITY_VIOLATION` on
    /// a dirty one. Returns the report on success and
    /// `SandboxError::CapabilityViolation` on a dirty diff — the caller is
    /// expected to treat that as a failed turn and skip promoting outputs.
    pub async fn verify_and_log(&self, ledger: &LedgerClient) -> Result<WriteReport, SandboxError> {
        let report = self.verify_writes().await?;

        let mut metadata = Metadata {
            provenance: Provenance {
                session_id: Some(self.session_id.clone()),
                ..Default::default()
            },
            scope: Scope { tier: Tier::Ho1 },
            ..Default::default()
        };

        if report.valid {
            metadata.outcome = Outcome {
                status: Some("valid".to_string()),
                ..Default::default()
            };
            ledger.append("SANDBOX_VERIFIED", metadata).await?;
            return Ok(report);
        }

        let detail = format!(
            "missing={:?} undeclared={:?}",
            report.missing, report.undeclared
        );
        metadata.outcome = Outcome {
            status: Some("violation".to_string()),
            error: Some(detail.clone()),
            ..Default::default()
        };
        ledger.append("CAPABILITY_VIOLATION", metadata).await?;
        tracing::warn!(session_id = %self.session_id, %detail, "sandbox write diff failed closed");

        Err(SandboxError::CapabilityViolation {
            session_id: self.session_id.clone(),
            missing: report.missing,
            undeclared: report.undeclared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_ledger::LedgerConfig;
    use tempfile::tempdir;

    fn config(root: &std::path::Path) -> SandboxConfig {
        SandboxConfig {
            tmp_root: root.join("tmp").to_string_lossy().to_string(),
            output_root: root.join("output").to_string_lossy().to_string(),
        }
    }

    #[tokio::test]
    async fn matching_declared_output_verifies_clean() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let sandbox = TurnSandbox::enter(
            &cfg,
            "s-1",
            vec![DeclaredOutput {
                path: "output/result.json".to_string(),
                role: "final".to_string(),
            }],
        )
        .unwrap();

        std::fs::write(sandbox.output_dir().join("result.json"), b"{}").unwrap();

        let report = sandbox.verify_writes().await.unwrap();
        assert!(report.valid);
        assert_eq!(report.realized.len(), 1);
    }

    #[tokio::test]
    async fn undeclared_write_fails_closed_via_ledger() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let sandbox = TurnSandbox::enter(&cfg, "s-2", vec![]).unwrap();
        std::fs::write(sandbox.output_dir().join("sneaky.txt"), b"oops").unwrap();

        let ledger = LedgerClient::open(dir.path().join("ledger"), LedgerConfig::default())
            .await
            .unwrap();

        let err = sandbox.verify_and_log(&ledger).await.unwrap_err();
        assert!(matches!(err, SandboxError::CapabilityViolation { .. }));

        let entries = ledger.read_all().await.unwrap();
        assert!(entries.iter().any(|e| e.event_type == "CAPABILITY_VIOLATION"));
    }

    #[tokio::test]
    async fn missing_declared_output_fails_closed() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let sandbox = TurnSandbox::enter(
            &cfg,
            "s-3",
            vec![DeclaredOutput {
                path: "output/result.json".to_string(),
                role: "final".to_string(),
            }],
        )
        .unwrap();

        let report = sandbox.verify_writes().await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.missing, vec!["output/result.json".to_string()]);
    }

    #[test]
    fn enter_redirects_tmpdir_env() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let sandbox = TurnSandbox::enter(&cfg, "s-4", vec![]).unwrap();
        assert_eq!(
            std::env::var("TMPDIR").unwrap(),
            sandbox.tmp_dir().display().to_string()
        );
    }
}
