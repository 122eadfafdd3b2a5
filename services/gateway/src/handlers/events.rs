use crate::models::{EventsQuery, EventsResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{
        Query, State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::StreamExt;
use tokio::sync::broadcast::error::RecvError;

/// Contract event log, oldest first.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let ledger = state.ledger.lock().await;
    let all = ledger.ledger().contract().events();
    let start = query.offset.min(all.len());
    let end = match query.limit {
        Some(limit) => start.saturating_add(limit).min(all.len()),
        None => all.len(),
    };
    Json(EventsResponse {
        total: all.len(),
        events: all[start..end].to_vec(),
    })
}

/// Live feed of newly committed events as JSON text frames.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(Utf8Bytes::from(text))).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
