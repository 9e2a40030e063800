use helm_budget::TokenBudgeter;
use helm_types::{
    Cost, InputContext, ScopeKey, WoConstraints, WoError, WoState, WoType, WorkOrder,
};

use crate::error::WorkOrderError;

/// `wo_id = "WO-<session_id>-<seq:03d>"`. `seq` is the 1-based ordinal of this
/// WO within its session, tracked by the caller (typically the HO2 supervisor
/// that owns the session's WO chain).
pub fn next_wo_id(session_id: &str, seq: u32) -> String {
    format!("WO-{session_id}-{seq:03}")
}

/// Everything [`plan`] needs to construct and validate a new work order.
pub struct PlanRequest<'a> {
    pub session_id: String,
    pub seq: u32,
    pub parent: Option<&'a WorkOrder>,
    pub wo_type: WoType,
    pub created_by: String,
    pub input_context: InputContext,
    pub constraints: WoConstraints,
}

/// Validate and construct a `planned` work order, allocating its budget scope
/// as a child of the session scope. Plan-time validation, per the state
/// machine: a valid `wo_type` is guaranteed by the type system; every other
/// check below can fail.
pub fn plan(budgeter: &TokenBudgeter, req: PlanRequest<'_>) -> Result<WorkOrder, WorkOrderError> {
    if let Some(parent) = req.parent {
        if parent.session_id != req.session_id {
            return Err(WorkOrderError::Wo(WoError::SessionMismatch));
        }
        if parent.state != WoState::Completed {
            return Err(WorkOrderError::Wo(WoError::ParentNotCompleted(parent.wo_id.clone())));
        }
    }

    if req.constraints.token_budget == 0 {
        return Err(WorkOrderError::Wo(WoError::NonPositiveBudget));
    }

    if matches!(req.wo_type, WoType::Classify | WoType::Synthesize) && req.constraints.prompt_contract_id.is_none() {
        return Err(WorkOrderError::Wo(WoError::MissingContract(req.wo_type)));
    }

    if req.wo_type == WoType::ToolCall && req.constraints.tools_allowed.is_empty() {
        return Err(WorkOrderError::Wo(WoError::EmptyToolsAllowed));
    }

    let wo_id = next_wo_id(&req.session_id, req.seq);
    let session_scope = ScopeKey::session(req.session_id.clone());
    let wo_scope = ScopeKey::work_order(req.session_id.clone(), wo_id.clone());

    let remaining = budgeter.check(&session_scope)?;
    if req.constraints.token_budget > remaining {
        return Err(WorkOrderError::Wo(WoError::BudgetExceedsSession {
            requested: req.constraints.token_budget,
            remaining,
        }));
    }
    budgeter.allocate(session_scope, wo_scope, req.constraints.token_budget)?;

    tracing::debug!(wo_id = %wo_id, wo_type = ?req.wo_type, "work order planned");

    Ok(WorkOrder {
        wo_id,
        session_id: req.session_id,
        parent_wo_id: req.parent.map(|p| p.wo_id.clone()),
        wo_type: req.wo_type,
        tier_target: "HO1".to_string(),
        state: WoState::Planned,
        created_by: req.created_by,
        input_context: req.input_context,
        constraints: req.constraints,
        output_result: None,
        error: None,
        completed_at: None,
        cost: Cost::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::{InputContext, WoConstraints};

    fn budgeter_with_session(session_id: &str, amount: u64) -> TokenBudgeter {
        let b = TokenBudgeter::new();
        b.allocate_root(ScopeKey::session(session_id), amount);
        b
    }

    fn constraints(token_budget: u64) -> WoConstraints {
        WoConstraints {
            prompt_contract_id: Some("contract-1".to_string()),
            token_budget,
            turn_limit: 1,
            timeout_seconds: 30,
            tools_allowed: vec![],
        }
    }

    #[test]
    fn plans_valid_classify_wo() {
        let budgeter = budgeter_with_session("S-1", 1000);
        let wo = plan(
            &budgeter,
            PlanRequest {
                session_id: "S-1".to_string(),
                seq: 1,
                parent: None,
                wo_type: WoType::Classify,
                created_by: "ho2-classifier".to_string(),
                input_context: InputContext {
                    user_input: "hi".to_string(),
                    ..Default::default()
                },
                constraints: constraints(100),
            },
        )
        .unwrap();
        assert_eq!(wo.wo_id, "WO-S-1-001");
        assert_eq!(wo.state, WoState::Planned);
    }

    #[test]
    fn rejects_budget_exceeding_session_remaining() {
        let budgeter = budgeter_with_session("S-1", 50);
        let err = plan(
            &budgeter,
            PlanRequest {
                session_id: "S-1".to_string(),
                seq: 1,
                parent: None,
                wo_type: WoType::Classify,
                created_by: "ho2".to_string(),
                input_context: InputContext::default(),
                constraints: constraints(100),
            },
        )
        .unwrap_err();
        assert!(matches!(err, WorkOrderError::Wo(WoError::BudgetExceedsSession { .. })));
    }

    #[test]
    fn missing_contract_for_synthesize_is_rejected() {
        let budgeter = budgeter_with_session("S-1", 1000);
        let mut c = constraints(100);
        c.prompt_contract_id = None;
        let err = plan(
            &budgeter,
            PlanRequest {
                session_id: "S-1".to_string(),
                seq: 1,
                parent: None,
                wo_type: WoType::Synthesize,
                created_by: "ho2".to_string(),
                input_context: InputContext::default(),
                constraints: c,
            },
        )
        .unwrap_err();
        assert!(matches!(err, WorkOrderError::Wo(WoError::MissingContract(WoType::Synthesize))));
    }

    #[test]
    fn tool_call_requires_nonempty_tools_allowed() {
        let budgeter = budgeter_with_session("S-1", 1000);
        let mut c = constraints(100);
        c.prompt_contract_id = None;
        let err = plan(
            &budgeter,
            PlanRequest {
                session_id: "S-1".to_string(),
                seq: 1,
                parent: None,
                wo_type: WoType::ToolCall,
                created_by: "ho2".to_string(),
                input_context: InputContext::default(),
                constraints: c,
            },
        )
        .unwrap_err();
        assert!(matches!(err, WorkOrderError::Wo(WoError::EmptyToolsAllowed)));
    }

    #[test]
    fn incomplete_parent_blocks_plan() {
        let budgeter = budgeter_with_session("S-1", 1000);
        let parent = plan(
            &budgeter,
            PlanRequest {
                session_id: "S-1".to_string(),
                seq: 1,
                parent: None,
                wo_type: WoType::Classify,
                created_by: "ho2".to_string(),
                input_context: InputContext::default(),
                constraints: constraints(100),
            },
        )
        .unwrap();

        let err = plan(
            &budgeter,
            PlanRequest {
                session_id: "S-1".to_string(),
                seq: 2,
                parent: Some(&parent),
                wo_type: WoType::Synthesize,
                created_by: "ho2".to_string(),
                input_context: InputContext::default(),
                constraints: constraints(100),
            },
        )
        .unwrap_err();
        assert!(matches!(err, WorkOrderError::Wo(WoError::ParentNotCompleted(_))));
    }
}
