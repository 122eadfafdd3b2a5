use crate::auth::Caller;
use crate::error::AppError;
use crate::handlers::receipt_response;
use crate::models::{DepositRequest, ReceiptResponse};
use crate::state::AppState;
use axum::{Json, extract::State};
use escrow_contracts::Operation;

pub async fn deposit(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "deposit")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::Deposit {
                asset: payload.asset,
                on_behalf_of: payload.on_behalf_of.unwrap_or(caller),
                amount: payload.amount,
                value: payload.value,
            },
        )
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}
