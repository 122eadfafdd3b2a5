use escrow_contracts::ContractEvent;
use escrow_contracts::withdrawal::WithdrawalRequest;
use escrow_types::asset::AssetId;
use escrow_types::ids::{Address, RequestId};
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    pub contract: Address,
    pub owner: Address,
    pub operator: Address,
    pub payment_receiver: Address,
    pub request_fee: Amount,
    pub collected_fees: Amount,
    pub last_request_id: RequestId,
    pub deposit_count: u64,
    pub abi_version: String,
    pub journal_sequence: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetResponse {
    pub asset: AssetId,
    pub is_available: bool,
    pub min_amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddAssetRequest {
    pub asset: AssetId,
    pub min_amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMinAmountRequest {
    pub min_amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePaymentReceiverRequest {
    pub payment_receiver: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferOwnershipRequest {
    pub new_owner: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub asset: AssetId,
    /// Credited player; defaults to the caller
    pub on_behalf_of: Option<Address>,
    pub amount: Amount,
    /// Native value attached to the call
    #[serde(default)]
    pub value: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub asset: AssetId,
    pub amount: Amount,
    /// Native value attached to pay the request fee
    pub value: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub id: RequestId,
    pub player: Address,
    pub quote_token: AssetId,
    pub amount: Amount,
    pub is_pending: bool,
}

impl WithdrawalResponse {
    pub fn new(id: RequestId, request: WithdrawalRequest) -> Self {
        Self {
            id,
            player: request.player,
            quote_token: request.quote_token,
            amount: request.amount,
            is_pending: request.is_pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingResponse {
    pub ids: Vec<RequestId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    pub events: Vec<ContractEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub asset: AssetId,
    pub holder: Address,
    pub balance: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub asset: AssetId,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveRequest {
    pub token: Address,
    pub spender: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MintRequest {
    pub asset: AssetId,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub total: usize,
    pub events: Vec<ContractEvent>,
}
