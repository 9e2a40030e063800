//! HO2 supervisor and cognitive-stack factory (C12): per-agent-class
//! isolation over the shared executor/gateway/attention infrastructure.

mod dispatch;
mod error;
mod stack;

pub use dispatch::DispatchPattern;
pub use error::SupervisorError;
pub use stack::{CognitiveStack, CognitiveStackFactory, StackConfig, TurnOutcome};
