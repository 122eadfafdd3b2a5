//! Shared security primitives for contract modules
//!
//! Owner/operator access control and the reentrancy guard wrapped around
//! every value-moving entry point.

use escrow_types::ids::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::AccessError;

/// Reentrancy guard preventing nested calls into protected functions.
///
/// A contract function acquires the guard before executing state-changing
/// logic and releases it on completion. Any nested call attempt fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReentrancyGuard {
    locked: bool,
}

impl ReentrancyGuard {
    /// Create a new unlocked guard.
    pub fn new() -> Self {
        Self { locked: false }
    }

    /// Acquire the guard. Returns `false` if already locked.
    pub fn acquire(&mut self) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        true
    }

    pub fn release(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Default for ReentrancyGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Privileged roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Administers the asset whitelist, the payment receiver and ownership
    Owner,
    /// Resolves withdrawal requests
    Operator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Operator => write!(f, "operator"),
        }
    }
}

/// Single-owner, single-operator access control.
///
/// The owner is set at deployment and may hand ownership to any address,
/// including the zero address. The operator is fixed for the lifetime of
/// the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    operator: Address,
}

impl AccessControl {
    pub fn new(owner: Address, operator: Address) -> Self {
        Self { owner, operator }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn is_owner(&self, caller: &Address) -> bool {
        self.owner == *caller
    }

    pub fn is_operator(&self, caller: &Address) -> bool {
        self.operator == *caller
    }

    /// Fails with `PermissionDenied` unless `caller` holds `role`.
    pub fn ensure(&self, caller: &Address, role: Role) -> Result<(), AccessError> {
        let allowed = match role {
            Role::Owner => self.is_owner(caller),
            Role::Operator => self.is_operator(caller),
        };
        if allowed {
            Ok(())
        } else {
            Err(AccessError::PermissionDenied {
                caller: *caller,
                role,
            })
        }
    }

    /// Hand ownership to `new_owner`. Only the current owner may call this.
    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> Result<(), AccessError> {
        self.ensure(caller, Role::Owner)?;
        self.owner = new_owner;
        Ok(())
    }
}
