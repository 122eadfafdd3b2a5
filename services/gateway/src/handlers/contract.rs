use crate::auth::Caller;
use crate::error::AppError;
use crate::handlers::receipt_response;
use crate::models::{
    ContractInfo, ReceiptResponse, TransferOwnershipRequest, UpdatePaymentReceiverRequest,
};
use crate::state::AppState;
use axum::{Json, extract::State};
use escrow_contracts::{CONTRACT_ABI_VERSION, Operation};

pub async fn get_config(State(state): State<AppState>) -> Json<ContractInfo> {
    let ledger = state.ledger.lock().await;
    let contract = ledger.ledger().contract();
    Json(ContractInfo {
        contract: contract.address(),
        owner: contract.owner(),
        operator: contract.operator(),
        payment_receiver: contract.payment_receiver(),
        request_fee: contract.request_fee(),
        collected_fees: contract.collected_fees(),
        last_request_id: contract.last_request_id(),
        deposit_count: contract.deposit_count(),
        abi_version: CONTRACT_ABI_VERSION.to_string(),
        journal_sequence: ledger.last_sequence(),
    })
}

pub async fn update_payment_receiver(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<UpdatePaymentReceiverRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "admin")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::UpdatePaymentReceiver {
                new_receiver: payload.payment_receiver,
            },
        )
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<TransferOwnershipRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "admin")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::TransferOwnership {
                new_owner: payload.new_owner,
            },
        )
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}
