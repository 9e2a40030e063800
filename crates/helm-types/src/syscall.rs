use serde::{Deserialize, Serialize};

/// Enumerated service invocation from a lower tier to higher-tier infrastructure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Syscall {
    LlmGatewayCall,
    LedgerWrite,
    LedgerRead,
    SchemaValidate,
    BudgetCheck,
    BudgetDebit,
    PolicyLookup,
}

impl Syscall {
    /// Whether this syscall mutates shared state (as opposed to only reading it).
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Syscall::LedgerWrite | Syscall::BudgetDebit | Syscall::LlmGatewayCall
        )
    }
}
