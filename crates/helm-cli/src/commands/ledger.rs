use std::path::{Path, PathBuf};

use clap::Subcommand;
use helm_ledger::LedgerClient;
use helm_types::config::LedgerConfig;

use crate::error::CliResult;
use crate::output::{failure, success, warn};

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Verify the hash chain of a ledger partition (or every partition under
    /// a tier, when `--tier` is given).
    Verify {
        /// HOT, HO2, or HO1 — verify every per-agent-class partition under
        /// that tier. Omit to verify the package installer's ledger.
        #[arg(long)]
        tier: Option<String>,
    },
}

pub async fn execute(command: LedgerCommands, root: PathBuf, config: &LedgerConfig) -> CliResult<()> {
    match command {
        LedgerCommands::Verify { tier } => verify(root, tier, config).await,
    }
}

async fn verify(root: PathBuf, tier: Option<String>, config: &LedgerConfig) -> CliResult<()> {
    let paths = match tier {
        Some(tier) => {
            let tier_dir = root.join(tier_dir_name(&tier)?).join("ledger");
            partitions_under(&tier_dir)
        }
        None => vec![root.join("ledger").join("install")],
    };

    if paths.is_empty() {
        warn("no ledger partitions found to verify");
        return Ok(());
    }

    let mut any_broken = false;
    for path in paths {
        let client = LedgerClient::open(path.clone(), config.clone()).await?;
        let result = client.verify_chain().await?;
        if result.ok {
            success(format!(
                "{}: {} entries verified",
                path.display(),
                result.verified_entries
            ));
        } else {
            any_broken = true;
            failure(format!(
                "{}: chain broken at entry {:?} ({})",
                path.display(),
                result.break_at,
                result.reason.as_deref().unwrap_or("unknown")
            ));
        }
    }

    if any_broken {
        Err(crate::error::CliError::Usage("ledger chain verification failed".to_string()))
    } else {
        Ok(())
    }
}

fn tier_dir_name(tier: &str) -> CliResult<&'static str> {
    match tier.to_ascii_lowercase().as_str() {
        "hot" => Ok("HOT"),
        "ho2" => Ok("HO2"),
        "ho1" => Ok("HO1"),
        other => Err(crate::error::CliError::Usage(format!("unknown tier {other}"))),
    }
}

fn partitions_under(tier_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(tier_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect()
}
