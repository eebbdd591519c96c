use std::convert::Infallible;

use axum::{
    extract::{Path, RawQuery, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::error::{AppError, Result};
use crate::models::KeyEvent;
use crate::rotation::run_poll_rotation;
use crate::state::AppState;

/// Server-sent key updates (poll rotation)
pub fn key_update_routes() -> Router<AppState> {
    Router::new().route("/sse-key-update/{room_id}", get(key_update_stream))
}

/// GET /sse-key-update/{room_id}?token=... - Stream invitation keys to the host
async fn key_update_stream(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let claims = state
        .tokens
        .extract_from_query(query.as_deref().unwrap_or_default())?;
    state.session.require_host_claims(&room_id, claims).await?;

    let lease = state.rotations.try_start(&room_id).ok_or_else(|| {
        AppError::Conflict(format!("Key polling already running for room {}", room_id))
    })?;

    let (tx, rx) = mpsc::channel::<KeyEvent>(8);

    tokio::spawn(run_poll_rotation(
        state.keys.clone(),
        room_id.clone(),
        state.config.key_poll_interval(),
        tx,
        lease.token(),
    ));

    tracing::info!(room_id = %room_id, "Key update stream opened");

    // Dropping the stream (client gone) releases the lease and stops polling
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _lease = &lease;
        Ok(to_sse_event(event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: KeyEvent) -> Event {
    match event {
        KeyEvent::Update(key) => Event::default().event("update").data(key),
        KeyEvent::Error(message) => Event::default().event("error").data(message),
    }
}
