use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, RawQuery, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::KeyPushMessage;
use crate::rotation::{run_push_rotation, RotationLease};
use crate::state::AppState;

/// WebSocket routes
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/{room_id}/generate-key", get(ws_upgrade))
}

/// WebSocket upgrade handler. Only the room host may connect, once per room.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let claims = state
        .tokens
        .extract_from_query(query.as_deref().unwrap_or_default())?;
    let claims = state.session.require_host_claims(&room_id, claims).await?;

    let lease = state.rotations.try_start(&room_id).ok_or_else(|| {
        AppError::Conflict(format!("Key rotation already running for room {}", room_id))
    })?;

    tracing::info!(
        room_id = %room_id,
        participant_id = %claims.participant_id,
        "Key rotation WebSocket upgrade"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, lease)))
}

/// Run the room's push rotation for as long as the host stays connected
async fn handle_socket(socket: WebSocket, state: AppState, room_id: String, lease: RotationLease) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(4);

    let rotation = tokio::spawn(run_push_rotation(
        state.keys.clone(),
        room_id.clone(),
        state.config.key_rotation_interval(),
        tx,
        lease.token(),
    ));

    // Forward keys until the rotation stops or the socket breaks
    let mut send_task = tokio::spawn(async move {
        while let Some(key) = rx.recv().await {
            let json = match serde_json::to_string(&KeyPushMessage { key }) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode key message");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(room_id = %room_id, "Key rotation WebSocket closed by host");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(room_id = %room_id, error = %e, "Key rotation WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    // Releasing the lease cancels the rotation
    drop(lease);
    match rotation.await {
        Ok(exit) => tracing::info!(room_id = %room_id, exit = ?exit, "Key rotation WebSocket finished"),
        Err(e) => tracing::error!(room_id = %room_id, error = %e, "Key rotation task failed"),
    }

    send_task.abort();
}
