use crate::handlers::{assets, bank, contract, events, payments, withdrawals};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/config", get(contract::get_config))
        .route("/payment-receiver", put(contract::update_payment_receiver))
        .route("/owner", put(contract::transfer_ownership))
        .route("/assets", get(assets::list_assets).post(assets::add_asset))
        .route(
            "/assets/{asset}",
            get(assets::get_asset).delete(assets::remove_asset),
        )
        .route("/assets/{asset}/min-amount", put(assets::update_min_amount))
        .route("/deposits", post(payments::deposit))
        .route("/withdrawals", post(withdrawals::request_withdrawal))
        .route("/withdrawals/pending", get(withdrawals::pending_withdrawals))
        .route("/withdrawals/{id}", get(withdrawals::get_withdrawal))
        .route("/withdrawals/{id}/confirm", post(withdrawals::confirm_withdrawal))
        .route("/withdrawals/{id}/reject", post(withdrawals::reject_withdrawal))
        .route("/balances/{asset}/{holder}", get(bank::get_balance))
        .route("/bank/transfer", post(bank::transfer))
        .route("/bank/approve", post(bank::approve))
        .route("/bank/mint", post(bank::mint))
        .route("/events", get(events::list_events))
        .route("/events/ws", get(events::ws_handler));

    Router::new()
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
