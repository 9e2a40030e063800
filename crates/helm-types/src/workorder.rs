use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Work order type. `execute` is reserved for tool/process invocations that are
/// neither a classification nor a synthesis call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WoType {
    Classify,
    ToolCall,
    Synthesize,
    Execute,
}

/// Work order lifecycle state. Terminal states (`Completed`, `Failed`) are
/// permanent: no transition is defined out of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WoState {
    Planned,
    Dispatched,
    Executing,
    Completed,
    Failed,
}

impl WoState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WoState::Completed | WoState::Failed)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputContext {
    pub user_input: String,
    #[serde(default)]
    pub prior_results: Vec<serde_json::Value>,
    #[serde(default)]
    pub assembled_context: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WoConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_contract_id: Option<String>,
    pub token_budget: u64,
    pub turn_limit: u32,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub tools_allowed: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WoErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Cost {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub llm_calls: u32,
    #[serde(default)]
    pub tool_calls: u32,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl Cost {
    pub fn record_llm_call(&mut self, input: u64, output: u64, elapsed_ms: u64) {
        self.input_tokens += input;
        self.output_tokens += output;
        self.total_tokens += input + output;
        self.llm_calls += 1;
        self.elapsed_ms += elapsed_ms;
    }

    pub fn record_tool_call(&mut self, elapsed_ms: u64) {
        self.tool_calls += 1;
        self.elapsed_ms += elapsed_ms;
    }
}

/// A bounded, one-shot instruction created by HO2 and executed by HO1.
///
/// Identity `wo_id = "WO-<session_id>-<seq:03d>"`. HO2 creates and dispatches;
/// HO1 mutates to `executing`/`completed`/`failed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkOrder {
    pub wo_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_wo_id: Option<String>,
    pub wo_type: WoType,
    #[serde(default = "default_tier_target")]
    pub tier_target: String,
    pub state: WoState,
    pub created_by: String,
    pub input_context: InputContext,
    pub constraints: WoConstraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WoErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cost: Cost,
}

fn default_tier_target() -> String {
    "HO1".to_string()
}

#[derive(Debug, Error)]
pub enum WoError {
    #[error("invalid work order type for this operation")]
    InvalidType,
    #[error("session mismatch: work order belongs to a different session")]
    SessionMismatch,
    #[error("token budget must be greater than zero")]
    NonPositiveBudget,
    #[error("requested budget {requested} exceeds remaining session budget {remaining}")]
    BudgetExceedsSession { requested: u64, remaining: u64 },
    #[error("prompt_contract_id is required for work order type {0:?}")]
    MissingContract(WoType),
    #[error("tools_allowed must be non-empty for tool_call work orders")]
    EmptyToolsAllowed,
    #[error("parent work order {0} has not completed")]
    ParentNotCompleted(String),
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: WoState, to: WoState },
    #[error("terminal work order {0} cannot be mutated")]
    TerminalMutation(String),
}

impl WorkOrder {
    /// Attempt a state transition, enforcing the lattice in the spec:
    /// `planned -> dispatched -> executing -> completed|failed`, terminal states
    /// immutable, and `dispatched->planned`/`executing->planned` forbidden.
    pub fn transition(&mut self, to: WoState) -> Result<(), WoError> {
        if self.state.is_terminal() {
            return Err(WoError::TerminalMutation(self.wo_id.clone()));
        }
        let allowed = matches!(
            (self.state, to),
            (WoState::Planned, WoState::Dispatched)
                | (WoState::Dispatched, WoState::Executing)
                | (WoState::Executing, WoState::Completed)
                | (WoState::Executing, WoState::Failed)
                | (WoState::Planned, WoState::Failed)
                | (WoState::Dispatched, WoState::Failed)
        );
        if !allowed {
            return Err(WoError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
