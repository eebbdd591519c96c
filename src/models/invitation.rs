use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The current invitation key of a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationKey {
    pub value: String,
    pub room_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Request to resolve an invitation key to its room
#[derive(Debug, Deserialize)]
pub struct AuthorizeInviteRequest {
    #[serde(rename = "keyInput")]
    pub key_input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeInviteResponse {
    #[serde(rename = "isAuthorized")]
    pub is_authorized: bool,
    #[serde(rename = "roomID")]
    pub room_id: String,
}

impl AuthorizeInviteResponse {
    pub fn granted(room_id: String) -> Self {
        Self {
            is_authorized: true,
            room_id,
        }
    }

    pub fn denied() -> Self {
        Self {
            is_authorized: false,
            room_id: String::new(),
        }
    }
}

/// Response of `GET /room-invitation/{room_id}`
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomInvitationResponse {
    pub invitation_key: String,
    pub expires_at: DateTime<Utc>,
}

impl From<InvitationKey> for RoomInvitationResponse {
    fn from(key: InvitationKey) -> Self {
        Self {
            invitation_key: key.value,
            expires_at: key.expires_at,
        }
    }
}

/// Message pushed to the host over the key WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPushMessage {
    pub key: String,
}

/// Event emitted by the polling rotation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Update(String),
    Error(String),
}
