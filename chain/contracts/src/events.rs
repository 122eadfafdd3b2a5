//! Contract events
//!
//! Events are immutable records emitted by contract operations, consumed by
//! indexers and clients. Administrative operations emit nothing.

use escrow_types::asset::AssetId;
use escrow_types::ids::{Address, RequestId};
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};

/// Deposit forwarded to the payment receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositToken {
    /// Account the deposit is credited to (`onBehalfOf`)
    pub player: Address,
    pub asset: AssetId,
    pub amount: Amount,
}

/// Withdrawal request queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub player: Address,
    pub asset: AssetId,
    pub amount: Amount,
    pub request_id: RequestId,
}

/// Withdrawal request confirmed and paid out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfirmed {
    pub player: Address,
    pub asset: AssetId,
    pub amount: Amount,
    pub request_id: RequestId,
}

/// Withdrawal request rejected, nothing paid out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRejected {
    pub player: Address,
    pub asset: AssetId,
    pub amount: Amount,
    pub request_id: RequestId,
}

/// Enum wrapper for all contract events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    DepositToken(DepositToken),
    WithdrawRequest(WithdrawRequest),
    RequestConfirmed(RequestConfirmed),
    RequestRejected(RequestRejected),
}

impl ContractEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ContractEvent::DepositToken(_) => "DepositToken",
            ContractEvent::WithdrawRequest(_) => "WithdrawRequest",
            ContractEvent::RequestConfirmed(_) => "RequestConfirmed",
            ContractEvent::RequestRejected(_) => "RequestRejected",
        }
    }

    /// Request the event refers to, if any
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            ContractEvent::DepositToken(_) => None,
            ContractEvent::WithdrawRequest(e) => Some(e.request_id),
            ContractEvent::RequestConfirmed(e) => Some(e.request_id),
            ContractEvent::RequestRejected(e) => Some(e.request_id),
        }
    }
}
