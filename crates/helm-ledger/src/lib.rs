//! Append-only, hash-chained JSONL ledger (C2).
//!
//! One [`LedgerClient`] owns one logical, segmented ledger file. Higher layers
//! (`helm-query`, `helm-executor`, `helm-supervisor`) compose many clients —
//! one per tier, one per session, one per agent-class partition — rather than
//! this crate knowing about tiers or sessions itself.

pub mod chain;
pub mod client;
pub mod error;
pub mod layout;

pub use chain::{verify_chain, verify_entry, ChainVerification};
pub use client::{build_entry, LedgerClient};
pub use error::LedgerError;
pub use layout::LedgerLayout;
