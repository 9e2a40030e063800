use async_trait::async_trait;
use helm_types::WorkOrder;

use crate::error::ExecutorError;

/// A tool a `tool_call` work order can invoke. Registered by name against the
/// name declared in `wo.input_context.user_input`, gated by
/// `wo.constraints.tools_allowed` before this trait is ever reached.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, wo: &WorkOrder) -> Result<serde_json::Value, ExecutorError>;
}
