use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

/// SDP offer submitted by a joining client
#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    #[serde(rename = "type", default = "default_sdp_type")]
    pub sdp_type: String,
    pub sdp: String,
}

fn default_sdp_type() -> String {
    "offer".to_string()
}

/// Answer produced by the media endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SessionAnswer {
    pub sdp: String,
    pub candidates: Vec<RTCIceCandidateInit>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub room_id: String,
    pub answer: String,
    pub candidates: Vec<RTCIceCandidateInit>,
}
