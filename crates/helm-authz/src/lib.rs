//! Auth/Authz (C14): `role_check(identity, action) AND tier_check(caller_tier,
//! target, syscall)`.

use std::collections::{HashMap, HashSet};

use helm_types::{Role, Syscall, Tier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An administrative or operator action gated by role, independent of tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ReadLedger,
    WriteLedger,
    InstallPackage,
    RevokePackage,
    ReadConfig,
    WriteConfig,
    ExecuteWorkOrder,
    ManageRoles,
}

#[derive(Clone, Debug)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
}

impl Identity {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("role {role:?} is not permitted to perform {action:?}")]
    RoleDenied { role: Role, action: Action },

    #[error("tier {caller:?} may not invoke {syscall:?} against tier {target:?}")]
    TierDenied {
        caller: Tier,
        target: Tier,
        syscall: Syscall,
    },
}

/// Static role -> allowed-actions matrix. `admin` can do everything;
/// `maintainer` can operate packages and config but not manage roles;
/// `auditor` is read-only across ledger and config; `reader` is read-only on
/// the ledger alone.
fn role_matrix() -> HashMap<Role, HashSet<Action>> {
    use Action::*;
    let mut m = HashMap::new();
    m.insert(
        Role::Admin,
        HashSet::from([
            ReadLedger,
            WriteLedger,
            InstallPackage,
            RevokePackage,
            ReadConfig,
            WriteConfig,
            ExecuteWorkOrder,
            ManageRoles,
        ]),
    );
    m.insert(
        Role::Maintainer,
        HashSet::from([
            ReadLedger,
            WriteLedger,
            InstallPackage,
            RevokePackage,
            ReadConfig,
            WriteConfig,
            ExecuteWorkOrder,
        ]),
    );
    m.insert(Role::Auditor, HashSet::from([ReadLedger, ReadConfig]));
    m.insert(Role::Reader, HashSet::from([ReadLedger]));
    m
}

/// Whether `role` is permitted to perform `action`, independent of tier.
pub fn role_check(role: Role, action: Action) -> bool {
    role_matrix()
        .get(&role)
        .map(|allowed| allowed.contains(&action))
        .unwrap_or(false)
}

/// Whether `caller` may invoke `syscall` against `target`.
///
/// Mutating syscalls (`LEDGER_WRITE`, `BUDGET_DEBIT`) are confined to a tier's
/// own state: a tier never mutates another tier's ledger or budget directly.
/// Read/lookup syscalls follow the tier rank order — HOT (rank 2) can read
/// HO2/HO1, HO2 (rank 1) can read HO1, but HO1 cannot read HO2 or HOT.
/// `LLM_GATEWAY_CALL` is shared infrastructure reachable from any tier.
pub fn tier_check(caller: Tier, target: Tier, syscall: Syscall) -> bool {
    match syscall {
        Syscall::LedgerWrite | Syscall::BudgetDebit => caller == target,
        Syscall::LedgerRead | Syscall::PolicyLookup | Syscall::SchemaValidate | Syscall::BudgetCheck => {
            caller.rank() >= target.rank()
        }
        Syscall::LlmGatewayCall => true,
    }
}

/// Full access decision: `role_check(identity, action) AND tier_check(caller,
/// target, syscall)`.
pub fn authorize(
    identity: &Identity,
    action: Action,
    caller: Tier,
    target: Tier,
    syscall: Syscall,
) -> Result<(), AuthzError> {
    if !role_check(identity.role, action) {
        return Err(AuthzError::RoleDenied {
            role: identity.role,
            action,
        });
    }
    if !tier_check(caller, target, syscall) {
        return Err(AuthzError::TierDenied {
            caller,
            target,
            syscall,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_is_denied_every_mutating_action() {
        assert!(!role_check(Role::Reader, Action::WriteLedger));
        assert!(!role_check(Role::Reader, Action::InstallPackage));
        assert!(role_check(Role::Reader, Action::ReadLedger));
    }

    #[test]
    fn admin_can_do_everything_a_maintainer_can() {
        for action in [
            Action::ReadLedger,
            Action::WriteLedger,
            Action::InstallPackage,
            Action::RevokePackage,
            Action::ReadConfig,
            Action::WriteConfig,
            Action::ExecuteWorkOrder,
        ] {
            assert!(role_check(Role::Admin, action));
            assert!(role_check(Role::Maintainer, action));
        }
        assert!(role_check(Role::Admin, Action::ManageRoles));
        assert!(!role_check(Role::Maintainer, Action::ManageRoles));
    }

    #[test]
    fn lower_tier_cannot_write_higher_tier_ledger() {
        assert!(!tier_check(Tier::Ho1, Tier::Ho2, Syscall::LedgerWrite));
        assert!(tier_check(Tier::Ho1, Tier::Ho1, Syscall::LedgerWrite));
    }

    #[test]
    fn higher_tier_can_read_lower_tier_ledger_but_not_vice_versa() {
        assert!(tier_check(Tier::Hot, Tier::Ho1, Syscall::LedgerRead));
        assert!(!tier_check(Tier::Ho1, Tier::Hot, Syscall::LedgerRead));
    }

    #[test]
    fn gateway_call_is_reachable_from_every_tier() {
        for t in [Tier::Hot, Tier::Ho2, Tier::Ho1] {
            assert!(tier_check(t, Tier::Hot, Syscall::LlmGatewayCall));
        }
    }

    #[test]
    fn authorize_requires_both_checks_to_pass() {
        let id = Identity::new("op-1", Role::Reader);
        let err = authorize(
            &id,
            Action::WriteLedger,
            Tier::Ho1,
            Tier::Ho1,
            Syscall::LedgerWrite,
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::RoleDenied { .. }));

        let id = Identity::new("op-2", Role::Admin);
        let err = authorize(
            &id,
            Action::WriteLedger,
            Tier::Ho1,
            Tier::Hot,
            Syscall::LedgerWrite,
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::TierDenied { .. }));

        let id = Identity::new("op-3", Role::Admin);
        assert!(authorize(
            &id,
            Action::WriteLedger,
            Tier::Ho1,
            Tier::Ho1,
            Syscall::LedgerWrite
        )
        .is_ok());
    }
}
