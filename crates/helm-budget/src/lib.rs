//! Hierarchical token budget scopes: session -> work order -> call (C4).
//!
//! Scopes nest; `check` is O(1) and returns the minimum of every ancestor's
//! remaining budget; `debit` propagates to all ancestors atomically under a
//! single lock so a concurrent `check` never observes a half-applied debit.

use std::collections::HashMap;

use helm_types::ScopeKey;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("scope not found: {0:?}")]
    NotFound(ScopeKey),

    #[error("parent scope not found: {0:?}")]
    ParentNotFound(ScopeKey),

    #[error(
        "requested budget {requested} exceeds remaining parent budget {remaining} for {parent:?}"
    )]
    ExceedsParent {
        parent: ScopeKey,
        requested: u64,
        remaining: u64,
    },

    #[error("scope {0:?} is exhausted and cannot be re-extended")]
    Exhausted(ScopeKey),

    #[error("debit of {requested} at {scope:?} exceeds remaining {remaining}")]
    DebitExceedsRemaining {
        scope: ScopeKey,
        requested: u64,
        remaining: u64,
    },
}

#[derive(Clone, Debug)]
struct ScopeNode {
    allocated: u64,
    consumed: u64,
    parent: Option<ScopeKey>,
}

impl ScopeNode {
    fn remaining(&self) -> u64 {
        self.allocated.saturating_sub(self.consumed)
    }
}

/// A read-only snapshot of a scope's allocation, returned by `allocate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetScope {
    pub scope_key: ScopeKey,
    pub allocated: u64,
    pub consumed: u64,
}

/// The hierarchical budget tree. One instance per session is typical, but
/// nothing prevents sharing one across sessions since every scope is keyed by
/// its full `ScopeKey` (which includes `session_id`).
pub struct TokenBudgeter {
    scopes: Mutex<HashMap<ScopeKey, ScopeNode>>,
}

impl Default for TokenBudgeter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBudgeter {
    pub fn new() -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a root scope (typically a session) with no parent.
    pub fn allocate_root(&self, scope_key: ScopeKey, requested: u64) -> BudgetScope {
        let mut scopes = self.scopes.lock();
        scopes.insert(
            scope_key.clone(),
            ScopeNode {
                allocated: requested,
                consumed: 0,
                parent: None,
            },
        );
        BudgetScope {
            scope_key,
            allocated: requested,
            consumed: 0,
        }
    }

    /// Allocate a child scope under `parent`. Enforces
    /// `child.allocated <= parent.allocated - parent.consumed_by_other_children`,
    /// i.e. the request must fit within what the parent has not yet committed
    /// to other children or consumed itself.
    pub fn allocate(
        &self,
        parent: ScopeKey,
        scope_key: ScopeKey,
        requested: u64,
    ) -> Result<BudgetScope, BudgetError> {
        let mut scopes = self.scopes.lock();

        let parent_remaining = {
            let parent_node = scopes
                .get(&parent)
                .ok_or_else(|| BudgetError::ParentNotFound(parent.clone()))?;
            parent_node.remaining()
        };

        let already_committed: u64 = scopes
            .values()
            .filter(|n| n.parent.as_ref() == Some(&parent))
            .map(|n| n.allocated)
            .sum();

        let available = parent_remaining.saturating_sub(already_committed);
        if requested > available {
            return Err(BudgetError::ExceedsParent {
                parent,
                requested,
                remaining: available,
            });
        }

        scopes.insert(
            scope_key.clone(),
            ScopeNode {
                allocated: requested,
                consumed: 0,
                parent: Some(parent),
            },
        );

        Ok(BudgetScope {
            scope_key,
            allocated: requested,
            consumed: 0,
        })
    }

    /// O(1) check returning the minimum of this scope's own remaining budget
    /// and every ancestor's remaining budget — debiting this scope can never
    /// silently exceed any ancestor's ceiling.
    pub fn check(&self, scope_key: &ScopeKey) -> Result<u64, BudgetError> {
        let scopes = self.scopes.lock();
        let mut current = scopes
            .get(scope_key)
            .ok_or_else(|| BudgetError::NotFound(scope_key.clone()))?;
        let mut min_remaining = current.remaining();

        while let Some(parent_key) = &current.parent {
            current = scopes
                .get(parent_key)
                .ok_or_else(|| BudgetError::ParentNotFound(parent_key.clone()))?;
            min_remaining = min_remaining.min(current.remaining());
        }

        Ok(min_remaining)
    }

    /// Debit `amount` from `scope_key` and every ancestor, atomically: either
    /// every node in the chain is debited, or none are. Exhausted scopes
    /// (remaining == 0 and amount > 0) return [`BudgetError::Exhausted`]
    /// instead of going negative.
    pub fn debit(&self, scope_key: &ScopeKey, amount: u64) -> Result<(), BudgetError> {
        if amount == 0 {
            return Ok(());
        }

        let mut scopes = self.scopes.lock();

        // Collect the chain of keys first so we can validate before mutating.
        let mut chain = vec![scope_key.clone()];
        {
            let mut cursor = scopes
                .get(scope_key)
                .ok_or_else(|| BudgetError::NotFound(scope_key.clone()))?;
            while let Some(parent_key) = &cursor.parent {
                chain.push(parent_key.clone());
                cursor = scopes
                    .get(parent_key)
                    .ok_or_else(|| BudgetError::ParentNotFound(parent_key.clone()))?;
            }
        }

        for key in &chain {
            let node = scopes.get(key).expect("validated above");
            if node.remaining() == 0 {
                return Err(BudgetError::Exhausted(key.clone()));
            }
            if amount > node.remaining() {
                return Err(BudgetError::DebitExceedsRemaining {
                    scope: key.clone(),
                    requested: amount,
                    remaining: node.remaining(),
                });
            }
        }

        for key in &chain {
            scopes.get_mut(key).expect("validated above").consumed += amount;
        }

        tracing::debug!(?scope_key, amount, "budget debited");
        Ok(())
    }

    /// Read-only snapshot of a scope's current state.
    pub fn snapshot(&self, scope_key: &ScopeKey) -> Result<BudgetScope, BudgetError> {
        let scopes = self.scopes.lock();
        let node = scopes
            .get(scope_key)
            .ok_or_else(|| BudgetError::NotFound(scope_key.clone()))?;
        Ok(BudgetScope {
            scope_key: scope_key.clone(),
            allocated: node.allocated,
            consumed: node.consumed,
        })
    }
}
