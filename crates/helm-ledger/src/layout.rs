use std::path::PathBuf;

use helm_types::Tier;

/// Resolves the filesystem layout named in the external interfaces:
///
/// ```text
/// <root>/
///   HOT/ | HO2/ | HO1/
///     ledger/{governance|workorder|worker}.jsonl
///     ledger/sessions/<session_id>/{exec,evidence}.jsonl
///     ledger/<AGENT_CLASS>/...
/// ```
///
/// Base paths returned here have no extension — [`crate::LedgerClient::open`]
/// appends the segment suffix and `.jsonl`.
#[derive(Clone, Debug)]
pub struct LedgerLayout {
    root: PathBuf,
}

fn tier_dir(tier: Tier) -> &'static str {
    match tier {
        Tier::Hot => "HOT",
        Tier::Ho2 => "HO2",
        Tier::Ho1 => "HO1",
    }
}

/// The per-tier primary ledger file stem, per the filesystem layout:
/// HOT -> governance, HO2 -> workorder, HO1 -> worker.
fn primary_ledger_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Hot => "governance",
        Tier::Ho2 => "workorder",
        Tier::Ho1 => "worker",
    }
}

impl LedgerLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// The tier's primary ledger base path.
    pub fn tier_ledger(&self, tier: Tier) -> PathBuf {
        self.root
            .join(tier_dir(tier))
            .join("ledger")
            .join(primary_ledger_name(tier))
    }

    /// A session's execution or evidence stream under a given tier.
    pub fn session_ledger(&self, tier: Tier, session_id: &str, stream: SessionStream) -> PathBuf {
        self.root
            .join(tier_dir(tier))
            .join("ledger")
            .join("sessions")
            .join(session_id)
            .join(stream.as_str())
    }

    /// A cognitive-stack's per-agent-class ledger partition. No other stack
    /// may read this path (enforced by the factory, not by the filesystem).
    pub fn agent_class_ledger(&self, tier: Tier, agent_class: &str, name: &str) -> PathBuf {
        self.root
            .join(tier_dir(tier))
            .join("ledger")
            .join(agent_class)
            .join(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStream {
    Exec,
    Evidence,
}

impl SessionStream {
    fn as_str(self) -> &'static str {
        match self {
            SessionStream::Exec => "exec",
            SessionStream::Evidence => "evidence",
        }
    }
}
