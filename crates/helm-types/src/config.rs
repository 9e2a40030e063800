use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Aggregate configuration for the whole runtime, loaded layered:
/// default literal -> optional file -> `HELM_`-prefixed environment variables.
///
/// Every numeric knob named throughout the design (segment sizes, TTLs,
/// thresholds, chars_per_token, circuit breaker window, budget defaults) lives
/// here rather than as a literal in code, per the "dynamic config" design note.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmConfig {
    pub root: RootConfig,
    pub ledger: LedgerConfig,
    pub budget: BudgetConfig,
    pub gateway: GatewayConfig,
    pub attention: AttentionConfig,
    pub query: QueryConfig,
    pub sandbox: SandboxConfig,
    pub package: PackageConfig,
    pub logging: LoggingConfig,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            root: RootConfig::default(),
            ledger: LedgerConfig::default(),
            budget: BudgetConfig::default(),
            gateway: GatewayConfig::default(),
            attention: AttentionConfig::default(),
            query: QueryConfig::default(),
            sandbox: SandboxConfig::default(),
            package: PackageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HelmConfig {
    /// Load configuration the way `palm-daemon` does: a literal default as the
    /// base layer, an optional file (TOML/YAML/JSON, inferred from extension),
    /// then environment variables prefixed `HELM` with `__` as the nesting
    /// separator (e.g. `HELM_GATEWAY__DEFAULT_TIMEOUT_SECS`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let builder = Config::builder()
            .add_source(Config::try_from(&HelmConfig::default())?)
            .add_source(File::with_name(path.unwrap_or("helm")).required(path.is_some()))
            .add_source(Environment::with_prefix("HELM").separator("__").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn development() -> Self {
        let mut cfg = Self::default();
        cfg.gateway.dev_mode = true;
        cfg.package.allow_unsigned = true;
        cfg
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    pub path: String,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            path: "./helm-root".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub segment_max_bytes: u64,
    pub segment_max_entries: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            segment_max_bytes: 16 * 1024 * 1024,
            segment_max_entries: 50_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub default_session_budget: u64,
    pub default_wo_budget: u64,
    pub default_call_budget: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_session_budget: 200_000,
            default_wo_budget: 20_000,
            default_call_budget: 4_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub dev_mode: bool,
    pub default_timeout_secs: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_success_threshold: u32,
    pub circuit_reset_timeout_secs: u64,
    pub circuit_half_open_max_requests: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            default_timeout_secs: 30,
            circuit_failure_threshold: 5,
            circuit_success_threshold: 2,
            circuit_reset_timeout_secs: 30,
            circuit_half_open_max_requests: 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    pub cache_ttl_secs: u64,
    pub default_chars_per_token: usize,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            default_chars_per_token: 4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub max_page_size: usize,
    pub index_rebuild_threshold: usize,
    pub index_ttl_seconds: u64,
    pub query_timeout_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_page_size: 500,
            index_rebuild_threshold: 1_000,
            index_ttl_seconds: 60,
            query_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub tmp_root: String,
    pub output_root: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            tmp_root: "tmp".to_string(),
            output_root: "output".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    pub allow_unsigned: bool,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            allow_unsigned: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
