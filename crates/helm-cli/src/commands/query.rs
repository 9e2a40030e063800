use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use helm_ledger::LedgerClient;
use helm_query::{LedgerQuery, QueryRequest};
use helm_types::config::{LedgerConfig, QueryConfig};
use helm_types::Tier;

use crate::error::{CliError, CliResult};
use crate::output::print_one;

/// `request` is either a literal JSON object or `@path/to/file.json`.
pub async fn run(request: String, root: PathBuf, ledger_config: &LedgerConfig, query_config: &QueryConfig) -> CliResult<()> {
    let json = if let Some(path) = request.strip_prefix('@') {
        std::fs::read_to_string(path)?
    } else {
        request
    };
    let parsed: QueryRequest = serde_json::from_str(&json)?;

    let mut ledgers: HashMap<Tier, Arc<LedgerClient>> = HashMap::new();
    for (tier, dir) in [(Tier::Hot, "HOT"), (Tier::Ho2, "HO2"), (Tier::Ho1, "HO1")] {
        for path in partitions(&root.join(dir).join("ledger")) {
            let client = LedgerClient::open(path, ledger_config.clone()).await?;
            // Last partition discovered per tier wins if several exist; real
            // deployments query a specific agent class one tier at a time via
            // the embedded components rather than this aggregate CLI view.
            ledgers.insert(tier, Arc::new(client));
        }
    }

    if ledgers.is_empty() {
        return Err(CliError::Usage(format!("no ledger partitions found under {}", root.display())));
    }

    let engine = LedgerQuery::new(ledgers, query_config.clone());
    let result = engine.query(&parsed).await?;
    print_one(&result, crate::output::OutputFormat::Json);
    Ok(())
}

fn partitions(tier_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(tier_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect()
}
