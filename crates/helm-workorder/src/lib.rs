//! Work order planning, identity, and execute-time validation (C9).
//!
//! The `WorkOrder` type and its state-machine transition live in `helm-types`
//! since every tier and the CLI share that wire shape; this crate owns the
//! surrounding rules: `wo_id` generation, plan-time validation against an
//! active `TokenBudgeter`, and the execute-time checks HO1 runs before
//! trusting a WO's output.

mod error;
mod execute;
mod plan;

pub use error::WorkOrderError;
pub use execute::{fail, validate_output, validate_tool_call, validate_turn_count};
pub use plan::{next_wo_id, plan, PlanRequest};
