use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Tier;

/// A single append-only, hash-chained ledger entry.
///
/// `entry_hash = SHA256(canonicalize(entry without entry_hash))`; `previous_hash`
/// equals the prior entry's `entry_hash` within the same ledger file. See
/// `helm-hash` for canonicalization and `helm-ledger` for the chained-append
/// implementation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub provenance: Provenance,
    pub scope: Scope,
    #[serde(default)]
    pub relational: Relational,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub context_fingerprint: ContextFingerprint,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scope {
    pub tier: Tier,
}

impl Default for Scope {
    fn default() -> Self {
        Self { tier: Tier::Ho1 }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Relational {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_event_id: Option<String>,
    #[serde(default)]
    pub related_artifacts: Vec<RelatedArtifact>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelatedArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_signal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextFingerprint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_pack_id: Option<String>,
    #[serde(default)]
    pub tokens_used: TokensUsed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokensUsed {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
}
