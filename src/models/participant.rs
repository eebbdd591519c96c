use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a participant id: 16 random bytes, URL-safe base64.
pub const PARTICIPANT_ID_LEN: usize = 22;

/// A member of a room
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(rename = "isHost")]
    pub is_host: bool,
    #[serde(rename = "jwt", default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl Participant {
    pub fn host(id: String) -> Self {
        Self {
            id,
            name: String::new(),
            is_host: true,
            token: String::new(),
        }
    }

    pub fn guest(id: String, name: String) -> Self {
        Self {
            id,
            name,
            is_host: false,
            token: String::new(),
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = token;
        self
    }
}

/// Generate a short participant id from a random UUID
pub fn generate_participant_id() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

/// Identity token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub participant_id: String,
    pub is_host: bool,
    pub iat: i64,
    pub exp: i64,
}
