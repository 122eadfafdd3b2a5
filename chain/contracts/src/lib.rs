//! Contract Logic for the Escrow Payment Ledger
//!
//! Deposits in the native currency or whitelisted tokens are forwarded to a
//! payment receiver; withdrawals go through a request queue that a single
//! operator confirms or rejects.
//!
//! # Modules
//! - `errors`: Contract-specific error types
//! - `events`: Events emitted by contract operations
//! - `security`: Owner/operator access control and the reentrancy guard
//! - `bank`: The asset transfer collaborator and the in-memory bank
//! - `registry`: Asset whitelist and per-asset minimum amounts
//! - `deposit`: Deposit validation and forwarding
//! - `withdrawal`: Withdrawal requests and their resolution
//! - `contract`: The deployed contract composing the modules above
//! - `ledger`: Atomic execution of operations against contract + bank

pub mod bank;
pub mod contract;
pub mod deposit;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod security;
pub mod withdrawal;

pub use bank::{AssetFlow, Bank, Checkpointed, InMemoryBank};
pub use contract::{CallContext, ContractConfig, PaymentContract};
pub use errors::ContractError;
pub use events::ContractEvent;
pub use ledger::{Ledger, Operation, Receipt, Staged};

/// Contract ABI version, frozen after release
pub const CONTRACT_ABI_VERSION: &str = "1.0.0";
