use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use axum_extra::extract::WithRejection;

use crate::error::{AppError, Result};
use crate::models::{AnswerResponse, OfferRequest};
use crate::state::AppState;

/// Signalling routes
pub fn signalling_routes() -> Router<AppState> {
    Router::new().route("/signalling/{room_id}", post(signal))
}

/// POST /signalling/{room_id} - Answer an SDP offer for a room
async fn signal(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    WithRejection(Json(offer), _): WithRejection<Json<OfferRequest>, AppError>,
) -> Result<Json<AnswerResponse>> {
    if !offer.sdp_type.eq_ignore_ascii_case("offer") {
        return Err(AppError::BadRequest(format!(
            "Expected an offer, got {}",
            offer.sdp_type
        )));
    }
    if offer.sdp.trim().is_empty() {
        return Err(AppError::BadRequest("SDP is required".to_string()));
    }

    // Only live rooms negotiate media
    state.rooms.get_host(&room_id).await?;

    let answer = state.media_gateway.create_answer(&room_id, &offer.sdp).await?;

    Ok(Json(AnswerResponse {
        room_id,
        answer: answer.sdp,
        candidates: answer.candidates,
    }))
}
