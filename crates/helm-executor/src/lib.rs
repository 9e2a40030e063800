//! HO1 work order executor (C11): budget allocation, attention, gateway
//! dispatch, output validation, ledger trace.

mod error;
mod executor;
mod render;
mod tool;

pub use error::ExecutorError;
pub use executor::{ExecuteContext, Executor};
pub use render::render_prompt;
pub use tool::ToolInvoker;
