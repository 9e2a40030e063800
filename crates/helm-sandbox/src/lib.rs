//! Per-session sandbox: scratch/output directories, environment redirection,
//! and declared-vs-realized write enforcement (C10).

mod env;
mod error;
mod sandbox;
mod writes;

pub use error::SandboxError;
pub use sandbox::TurnSandbox;
pub use writes::{DeclaredOutput, RealizedWrite, WriteReport};
