use serde_json::Value;

use helm_schema::validate_once;
use helm_types::{PromptContract, WoType, WorkOrder};

use crate::error::WorkOrderError;

/// Execute-time checks HO1 runs before and after invoking a contract: tool
/// gating, turn-limit enforcement, and output-schema validation. None of
/// these mutate `wo`; callers decide how to fold a failure into the WO's
/// `error`/state transition (see [`crate::fail`]).
pub fn validate_tool_call(wo: &WorkOrder, tool: &str) -> Result<(), WorkOrderError> {
    if wo.wo_type == WoType::ToolCall && !wo.constraints.tools_allowed.iter().any(|t| t == tool) {
        return Err(WorkOrderError::ToolNotAllowed { tool: tool.to_string() });
    }
    Ok(())
}

pub fn validate_turn_count(wo: &WorkOrder, turns_used: u32) -> Result<(), WorkOrderError> {
    if turns_used > wo.constraints.turn_limit {
        return Err(WorkOrderError::TurnLimitExceeded {
            limit: wo.constraints.turn_limit,
            used: turns_used,
        });
    }
    Ok(())
}

/// Validate a gateway/tool response against the contract's output schema.
pub fn validate_output(contract: &PromptContract, output: &Value) -> Result<(), WorkOrderError> {
    validate_once(&contract.output_schema, output)?;
    Ok(())
}

/// Transition `wo` to `failed`, recording `code`/`message` as its error. Used
/// whenever budget exhaustion or output-schema mismatch ends a WO's
/// execution; per the state machine, `failed` is reachable from any
/// non-terminal state.
pub fn fail(wo: &mut WorkOrder, code: &str, message: impl Into<String>) -> Result<(), WorkOrderError> {
    wo.transition(helm_types::WoState::Failed)?;
    wo.error = Some(helm_types::WoErrorInfo {
        code: code.to_string(),
        message: message.into(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::{Cost, InputContext, WoConstraints, WoState};

    fn tool_wo(tools_allowed: Vec<String>) -> WorkOrder {
        WorkOrder {
            wo_id: "WO-S-1-001".to_string(),
            session_id: "S-1".to_string(),
            parent_wo_id: None,
            wo_type: WoType::ToolCall,
            tier_target: "HO1".to_string(),
            state: WoState::Executing,
            created_by: "ho2".to_string(),
            input_context: InputContext::default(),
            constraints: WoConstraints {
                prompt_contract_id: None,
                token_budget: 100,
                turn_limit: 2,
                timeout_seconds: 30,
                tools_allowed,
            },
            output_result: None,
            error: None,
            completed_at: None,
            cost: Cost::default(),
        }
    }

    #[test]
    fn disallowed_tool_is_rejected() {
        let wo = tool_wo(vec!["search".to_string()]);
        let err = validate_tool_call(&wo, "delete").unwrap_err();
        assert!(matches!(err, WorkOrderError::ToolNotAllowed { .. }));
    }

    #[test]
    fn allowed_tool_passes() {
        let wo = tool_wo(vec!["search".to_string()]);
        assert!(validate_tool_call(&wo, "search").is_ok());
    }

    #[test]
    fn turn_limit_exceeded_is_rejected() {
        let wo = tool_wo(vec!["search".to_string()]);
        let err = validate_turn_count(&wo, 3).unwrap_err();
        assert!(matches!(err, WorkOrderError::TurnLimitExceeded { .. }));
    }

    #[test]
    fn fail_transitions_to_failed_with_error_info() {
        let mut wo = tool_wo(vec!["search".to_string()]);
        fail(&mut wo, "OUTPUT_INVALID", "schema mismatch").unwrap();
        assert_eq!(wo.state, WoState::Failed);
        assert_eq!(wo.error.unwrap().code, "OUTPUT_INVALID");
    }

    #[test]
    fn output_schema_mismatch_is_reported() {
        let contract = PromptContract {
            contract_id: "c1".to_string(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({
                "type": "object",
                "required": ["response_text"]
            }),
            template: "{{input}}".to_string(),
            required_context: Default::default(),
            tools: vec![],
            budget_defaults: Default::default(),
        };
        let err = validate_output(&contract, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, WorkOrderError::OutputInvalid(_)));
    }
}
