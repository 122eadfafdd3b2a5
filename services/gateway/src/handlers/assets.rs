use crate::auth::Caller;
use crate::error::AppError;
use crate::handlers::receipt_response;
use crate::models::{AddAssetRequest, AssetResponse, ReceiptResponse, UpdateMinAmountRequest};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use escrow_contracts::Operation;
use escrow_types::asset::AssetId;

/// Whitelisted assets.
pub async fn list_assets(State(state): State<AppState>) -> Json<Vec<AssetResponse>> {
    let ledger = state.ledger.lock().await;
    let assets = ledger
        .ledger()
        .contract()
        .quote_tokens()
        .into_iter()
        .map(|(asset, config)| AssetResponse {
            asset,
            is_available: config.is_available,
            min_amount: config.min_amount,
        })
        .collect();
    Json(assets)
}

/// Configuration of any asset; unlisted assets read as unavailable with a
/// zero minimum.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset): Path<AssetId>,
) -> Json<AssetResponse> {
    let config = state
        .ledger
        .lock()
        .await
        .ledger()
        .contract()
        .check_quote_token(&asset);
    Json(AssetResponse {
        asset,
        is_available: config.is_available,
        min_amount: config.min_amount,
    })
}

pub async fn add_asset(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<AddAssetRequest>,
) -> Result<(StatusCode, Json<ReceiptResponse>), AppError> {
    state.throttle(&caller, "admin")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::AddQuoteToken {
                asset: payload.asset,
                min_amount: payload.min_amount,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt_response(receipt, sequence))))
}

pub async fn remove_asset(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(asset): Path<AssetId>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "admin")?;
    let (receipt, sequence) = state
        .submit(caller, Operation::RemoveQuoteToken { asset })
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}

pub async fn update_min_amount(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(asset): Path<AssetId>,
    Json(payload): Json<UpdateMinAmountRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    state.throttle(&caller, "admin")?;
    let (receipt, sequence) = state
        .submit(
            caller,
            Operation::UpdateMinAmount {
                asset,
                new_amount: payload.min_amount,
            },
        )
        .await?;
    Ok(Json(receipt_response(receipt, sequence)))
}
