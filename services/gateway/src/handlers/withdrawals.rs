use crate::auth::Caller;
use crate::error::AppError;
use crate::handlers::receipt_response;
use crate::models::{PendingResponse, ReceiptResponse, WithdrawRequest, WithdrawalResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use escrow_contracts::Operation;
use escrow_types::ids::RequestId;

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<ReceiptResponse>), AppError> {
    state.throttle(&caller, "withdraw")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::WithdrawRequest {
                asset: payload.asset,
                amount: payload.amount,
                value: payload.value,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt_response(receipt, sequence))))
}

pub async fn confirm_withdrawal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "resolve")?;
    let (receipt, sequence) = state
        .submit(caller, Operation::ConfirmRequest { id: RequestId::new(id) })
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "resolve")?;
    let (receipt, sequence) = state
        .submit(caller, Operation::RejectRequest { id: RequestId::new(id) })
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}

/// Pending ids in queue order.
pub async fn pending_withdrawals(State(state): State<AppState>) -> Json<PendingResponse> {
    let ids = state.ledger.lock().await.ledger().contract().pending_requests();
    Json(PendingResponse { ids })
}

/// Request record; ids never issued read as the zeroed record.
pub async fn get_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<WithdrawalResponse> {
    let id = RequestId::new(id);
    let request = state.ledger.lock().await.ledger().contract().request_status(id);
    Json(WithdrawalResponse::new(id, request))
}
