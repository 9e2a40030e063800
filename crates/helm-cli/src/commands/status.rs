use std::path::{Path, PathBuf};

use helm_types::HelmConfig;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(serde::Serialize, tabled::Tabled)]
struct TierStatus {
    tier: String,
    partitions: usize,
}

pub fn run(root: PathBuf, config: &HelmConfig, format: OutputFormat) -> CliResult<()> {
    let rows: Vec<TierStatus> = [("HOT", "hot"), ("HO2", "ho2"), ("HO1", "ho1")]
        .into_iter()
        .map(|(dir, label)| TierStatus {
            tier: label.to_string(),
            partitions: count_partitions(&root.join(dir).join("ledger")),
        })
        .collect();

    println!("root: {}", root.display());
    println!("dev_mode: {}", config.gateway.dev_mode);
    println!("allow_unsigned: {}", config.package.allow_unsigned);
    crate::output::print_rows(rows, format);
    Ok(())
}

fn count_partitions(tier_dir: &Path) -> usize {
    std::fs::read_dir(tier_dir)
        .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()).count())
        .unwrap_or(0)
}
