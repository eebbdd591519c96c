use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Participant;

/// A call session and its participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    #[serde(default)]
    pub host_id: String,
    pub participants: HashMap<String, Participant>,
}

impl Room {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            host_id: String::new(),
            participants: HashMap::new(),
        }
    }

    pub fn add_participant(&mut self, participant: Participant) {
        if participant.is_host {
            self.host_id = participant.id.clone();
        }
        self.participants.insert(participant.id.clone(), participant);
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

/// Response after creating a room
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub id: String,
    pub participants: Participant,
    pub token: String,
}

/// Request to join a room
#[derive(Debug, Default, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub name: String,
}

/// Response after joining a room
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub room_id: String,
    pub participant_id: String,
    pub token: String,
    pub participants: HashMap<String, Participant>,
}
