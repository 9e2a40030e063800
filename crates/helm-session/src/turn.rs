use helm_sandbox::DeclaredOutput;
use helm_types::TokensUsed;

#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub session_id: String,
    pub turn_number: u32,
    pub user_message: String,
    pub declared_inputs: Vec<String>,
    pub declared_outputs: Vec<DeclaredOutput>,
    pub work_order_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    Success,
    Failure,
    Rejected,
    Timeout,
    BudgetExhausted,
}

#[derive(Clone, Debug)]
pub struct TurnResult {
    pub status: TurnStatus,
    pub response: Option<String>,
    pub tokens_used: TokensUsed,
    pub ledger_entry_ids: Vec<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TurnResult {
    pub fn rejected(reason: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: TurnStatus::Rejected,
            response: None,
            tokens_used: TokensUsed::default(),
            ledger_entry_ids: vec![],
            error: Some(reason.into()),
            duration_ms,
        }
    }

    pub fn failure(reason: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: TurnStatus::Failure,
            response: None,
            tokens_used: TokensUsed::default(),
            ledger_entry_ids: vec![],
            error: Some(reason.into()),
            duration_ms,
        }
    }
}
