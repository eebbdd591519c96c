use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    extract::WithRejection,
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::error::{AppError, Result};
use crate::models::{
    AuthorizeInviteRequest, AuthorizeInviteResponse, CreateRoomResponse, JoinRoomRequest,
    JoinRoomResponse, RoomInvitationResponse,
};
use crate::state::AppState;

type BearerHeader = TypedHeader<Authorization<Bearer>>;

/// Room and invitation routes
pub fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/create-room", post(create_room))
        .route("/join-room", post(missing_room_id))
        .route("/join-room/", post(missing_room_id))
        .route("/join-room/{room_id}", post(join_room))
        .route("/room-invitation/{room_id}", get(room_invitation))
        .route("/authorize-invite", post(authorize_invite))
}

/// POST /create-room - Create a room and its host
async fn create_room(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateRoomResponse>)> {
    let created = state.session.create_room().await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            id: created.room.id,
            participants: created.host,
            token: created.token,
        }),
    ))
}

async fn missing_room_id() -> Result<Json<JoinRoomResponse>> {
    Err(AppError::BadRequest("Room ID is required".to_string()))
}

/// POST /join-room/{room_id} - Join as host (bearer) or as a new guest
async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    bearer: Option<BearerHeader>,
    WithRejection(Json(request), _): WithRejection<Json<JoinRoomRequest>, AppError>,
) -> Result<Json<JoinRoomResponse>> {
    let token = bearer.as_ref().map(|TypedHeader(auth)| auth.token());

    let joined = state
        .session
        .join_room(&room_id, token, request.name.trim())
        .await?;

    Ok(Json(JoinRoomResponse {
        room_id: joined.room.id,
        participant_id: joined.participant.id,
        token: joined.participant.token,
        participants: joined.room.participants,
    }))
}

/// GET /room-invitation/{room_id} - Issue a fresh invitation key (host only)
async fn room_invitation(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    bearer: Option<BearerHeader>,
) -> Result<Json<RoomInvitationResponse>> {
    let TypedHeader(auth) =
        bearer.ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    state.session.require_host(&room_id, auth.token()).await?;
    let key = state.session.issue_invitation(&room_id).await?;

    tracing::info!(room_id = %room_id, "Invitation key issued");
    Ok(Json(key.into()))
}

/// POST /authorize-invite - Resolve an invitation key to its room
async fn authorize_invite(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<AuthorizeInviteRequest>, AppError>,
) -> (StatusCode, Json<AuthorizeInviteResponse>) {
    match state.session.authorize_invitation(&request.key_input).await {
        Ok(room_id) => (StatusCode::OK, Json(AuthorizeInviteResponse::granted(room_id))),
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Json(AuthorizeInviteResponse::denied()),
        ),
    }
}
