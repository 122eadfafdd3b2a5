use crate::auth::Caller;
use crate::error::AppError;
use crate::handlers::receipt_response;
use crate::models::{ApproveRequest, BalanceResponse, MintRequest, ReceiptResponse, TransferRequest};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use escrow_contracts::Operation;
use escrow_types::asset::AssetId;
use escrow_types::ids::Address;

pub async fn get_balance(
    State(state): State<AppState>,
    Path((asset, holder)): Path<(AssetId, Address)>,
) -> Json<BalanceResponse> {
    let balance = state.ledger.lock().await.ledger().balance_of(&asset, &holder);
    Json(BalanceResponse {
        asset,
        holder,
        balance,
    })
}

pub async fn transfer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "bank")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::Transfer {
                asset: payload.asset,
                to: payload.to,
                amount: payload.amount,
            },
        )
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}

pub async fn approve(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<ApproveRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "bank")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::Approve {
                token: payload.token,
                spender: payload.spender,
                amount: payload.amount,
            },
        )
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}

/// Test faucet. Refused unless the gateway was started with it enabled.
pub async fn mint(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<MintRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    if !state.faucet_enabled {
        return Err(AppError::Forbidden("Faucet is disabled".into()));
    }
    state.throttle(&caller, "bank")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::Mint {
                asset: payload.asset,
                to: payload.to,
                amount: payload.amount,
            },
        )
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}
