//! Contract-specific error types
//!
//! One enum per module, rolled up into [`ContractError`]. Every variant
//! aborts the call that produced it; the ledger restores the pre-call state.

use escrow_types::asset::AssetId;
use escrow_types::ids::{Address, RequestId};
use escrow_types::numeric::Amount;
use thiserror::Error;

use crate::security::Role;

/// Access control errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Permission denied: {caller} is not the {role}")]
    PermissionDenied { caller: Address, role: Role },
}

/// Asset registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Asset already exists: {asset}")]
    AlreadyExists { asset: AssetId },

    #[error("Asset does not exist: {asset}")]
    NotFound { asset: AssetId },
}

/// Asset transfer errors raised by the bank
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient balance of {asset} for {holder}: required {required}, available {available}")]
    InsufficientBalance {
        asset: AssetId,
        holder: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Insufficient allowance on {token} from {owner} to {spender}: required {required}, available {available}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Native currency has no allowances")]
    NotAToken,

    #[error("Arithmetic overflow in balance calculation")]
    Overflow,
}

/// Deposit errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepositError {
    #[error("Payment method is not allowed: {asset}")]
    AssetNotAllowed { asset: AssetId },

    #[error("Invalid payment method: native value attached to a token deposit")]
    InvalidMethod,

    #[error("Insufficient paid amount: required {required}, paid {paid}")]
    InsufficientPaid { required: Amount, paid: Amount },

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Arithmetic overflow in deposit accounting")]
    Overflow,
}

/// Withdrawal queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalError {
    #[error("Asset is not allowed: {asset}")]
    AssetNotAllowed { asset: AssetId },

    #[error("Amount is lower than minimum required: {amount} < {min_amount}")]
    AmountTooLow { amount: Amount, min_amount: Amount },

    #[error("Insufficient request fee: required {required}, paid {paid}")]
    InsufficientFee { required: Amount, paid: Amount },

    #[error("Not a pending request: {id}")]
    NotPending { id: RequestId },

    #[error("Request identifiers exhausted")]
    IdsExhausted,

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Arithmetic overflow in fee accounting")]
    Overflow,
}

/// Top-level error returned by every contract entry point
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Deposit(#[from] DepositError),

    #[error(transparent)]
    Withdrawal(#[from] WithdrawalError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Reentrancy detected")]
    Reentrancy,
}

impl ContractError {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            ContractError::Access(AccessError::PermissionDenied { .. }) => "PERMISSION_DENIED",
            ContractError::Registry(RegistryError::AlreadyExists { .. }) => "ALREADY_EXISTS",
            ContractError::Registry(RegistryError::NotFound { .. }) => "NOT_FOUND",
            ContractError::Deposit(DepositError::AssetNotAllowed { .. })
            | ContractError::Withdrawal(WithdrawalError::AssetNotAllowed { .. }) => {
                "ASSET_NOT_ALLOWED"
            }
            ContractError::Deposit(DepositError::InvalidMethod) => "INVALID_METHOD",
            ContractError::Deposit(DepositError::InsufficientPaid { .. }) => "INSUFFICIENT_PAID",
            ContractError::Withdrawal(WithdrawalError::AmountTooLow { .. }) => "AMOUNT_TOO_LOW",
            ContractError::Withdrawal(WithdrawalError::InsufficientFee { .. }) => "INSUFFICIENT_FEE",
            ContractError::Withdrawal(WithdrawalError::NotPending { .. }) => "NOT_PENDING",
            ContractError::Withdrawal(WithdrawalError::IdsExhausted) => "IDS_EXHAUSTED",
            ContractError::Deposit(DepositError::Transfer(e))
            | ContractError::Withdrawal(WithdrawalError::Transfer(e))
            | ContractError::Transfer(e) => e.code(),
            ContractError::Deposit(DepositError::Overflow)
            | ContractError::Withdrawal(WithdrawalError::Overflow) => "OVERFLOW",
            ContractError::Reentrancy => "REENTRANCY",
        }
    }
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::InsufficientAllowance { .. } => "INSUFFICIENT_ALLOWANCE",
            TransferError::NotAToken => "NOT_A_TOKEN",
            TransferError::Overflow => "OVERFLOW",
        }
    }
}
