//! Shared data model for the helm governance runtime.
//!
//! Every other `helm-*` crate depends on this one; this crate depends on none of
//! them. Types here are the wire shape for ledger entries, work orders, prompt
//! contracts, attention templates, sessions, and budgets, plus the umbrella error
//! and configuration types that compose the per-crate ones.

pub mod config;
pub mod error;
pub mod ledger;
pub mod syscall;
pub mod tier;
pub mod workorder;

pub use config::HelmConfig;
pub use error::HelmError;
pub use ledger::{
    ContextFingerprint, LedgerEntry, Metadata, Outcome, Provenance, RelatedArtifact, Relational, Scope,
    TokensUsed,
};
pub use syscall::Syscall;
pub use tier::Tier;
pub use workorder::{Cost, WoConstraints, WoError, WoState, WoType, WorkOrder};

/// A prompt contract: schema-bearing template defining a WO's LLM call shape.
///
/// Owned by the HOT registry; read-only at runtime by every other tier.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PromptContract {
    pub contract_id: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub template: String,
    #[serde(default)]
    pub required_context: RequiredContext,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub budget_defaults: BudgetDefaults,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct RequiredContext {
    #[serde(default)]
    pub ledger_queries: Vec<serde_json::Value>,
    #[serde(default)]
    pub framework_refs: Vec<String>,
    #[serde(default)]
    pub file_refs: Vec<String>,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct BudgetDefaults {
    #[serde(default)]
    pub token_budget: Option<u64>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// An attention template: config-driven context-assembly pipeline.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AttentionTemplate {
    pub template_id: String,
    pub applies_to: AppliesTo,
    pub pipeline: Vec<StageSpec>,
    pub budget: AttentionBudget,
    #[serde(default)]
    pub fallback: AttentionFallback,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct AppliesTo {
    #[serde(default)]
    pub agent_class: Vec<String>,
    #[serde(default)]
    pub framework_id: Vec<String>,
    #[serde(default)]
    pub tier: Vec<Tier>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StageSpec {
    pub stage: String,
    #[serde(rename = "type")]
    pub stage_type: StageType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    TierSelect,
    LedgerQuery,
    RegistryQuery,
    FileRead,
    HorizontalSearch,
    Structuring,
    Halting,
    Custom,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AttentionBudget {
    pub max_context_tokens: usize,
    pub max_queries: usize,
    pub timeout_ms: u64,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

fn default_chars_per_token() -> usize {
    4
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    ReturnPartial,
    Fail,
    UseCached,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AttentionFallback {
    pub on_empty: FallbackAction,
    pub on_timeout: FallbackAction,
}

impl Default for AttentionFallback {
    fn default() -> Self {
        Self {
            on_empty: FallbackAction::ReturnPartial,
            on_timeout: FallbackAction::ReturnPartial,
        }
    }
}

/// Role used by the auth/authz layer (C14).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Maintainer,
    Auditor,
    Reader,
}

/// A budget scope key: `(session_id, wo_id?, call_id?)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScopeKey {
    pub session_id: String,
    pub wo_id: Option<String>,
    pub call_id: Option<String>,
}

impl ScopeKey {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            wo_id: None,
            call_id: None,
        }
    }

    pub fn work_order(session_id: impl Into<String>, wo_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            wo_id: Some(wo_id.into()),
            call_id: None,
        }
    }

    pub fn call(
        session_id: impl Into<String>,
        wo_id: impl Into<String>,
        call_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            wo_id: Some(wo_id.into()),
            call_id: Some(call_id.into()),
        }
    }
}
