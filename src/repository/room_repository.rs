use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::error::{AppError, Result};
use crate::models::{generate_participant_id, Participant, Room};
use crate::store::{keys, KvStore, WriteBatch};

/// Room and participant records in the key-value store
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn KvStore>,
    tokens: Arc<TokenService>,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn KvStore>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    // ==================== Room Operations ====================

    /// Allocate a room and persist its record
    pub async fn create_room(&self) -> Result<Room> {
        let room = Room::new();

        self.store
            .hset(&keys::room(&room.id), vec![("id".into(), room.id.clone())])
            .await?;

        tracing::info!(room_id = %room.id, "Room created");
        Ok(room)
    }

    /// Rebuild a room with its participants from the store
    pub async fn get_room(&self, room_id: &str) -> Result<Room> {
        let record = self.store.hgetall(&keys::room(room_id)).await?;
        if record.is_empty() {
            return Err(AppError::NotFound(format!("Room {} not found", room_id)));
        }

        let participants = self.get_participants(room_id).await?;

        Ok(Room {
            id: record
                .get("id")
                .cloned()
                .unwrap_or_else(|| room_id.to_string()),
            host_id: record.get("host_id").cloned().unwrap_or_default(),
            participants,
        })
    }

    /// Id of the room's host participant
    pub async fn get_host(&self, room_id: &str) -> Result<String> {
        self.store
            .hget(&keys::room(room_id), "host_id")
            .await?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))
    }

    // ==================== Participant Operations ====================

    /// Create the host participant. Set membership, participant record and
    /// the room's `host_id` pointer are written in one atomic batch.
    pub async fn set_host_participant(&self, room_id: &str) -> Result<Participant> {
        let participant = Participant::host(generate_participant_id());

        let batch = WriteBatch::new()
            .sadd(keys::participants(room_id), participant.id.clone())
            .hset(
                keys::participant(room_id, &participant.id),
                participant_fields(&participant),
            )
            .hset(keys::room(room_id), [("host_id", participant.id.clone())]);

        self.store.apply(batch).await?;

        tracing::debug!(room_id = %room_id, participant_id = %participant.id, "Host participant set");
        Ok(participant)
    }

    /// Join a room.
    ///
    /// The host path renames the existing host and hands back the caller's
    /// token. The guest path creates a new participant and mints its token;
    /// the returned participant carries only that token.
    pub async fn join_room(
        &self,
        room_id: &str,
        participant_id: &str,
        token: &str,
        name: &str,
        is_host: bool,
    ) -> Result<Participant> {
        let host_id = self.get_host(room_id).await?;

        if is_host {
            if participant_id != host_id {
                return Err(AppError::Unauthorized(
                    "Token does not belong to this room's host".to_string(),
                ));
            }

            self.rename_participant(room_id, &host_id, name).await?;

            tracing::info!(room_id = %room_id, participant_id = %host_id, "Host joined room");
            return Ok(Participant {
                id: host_id,
                name: name.to_string(),
                is_host: true,
                token: token.to_string(),
            });
        }

        let participant = Participant::guest(generate_participant_id(), name.to_string());

        let batch = WriteBatch::new()
            .sadd(keys::participants(room_id), participant.id.clone())
            .hset(
                keys::participant(room_id, &participant.id),
                participant_fields(&participant),
            );
        self.store.apply(batch).await?;

        let token = self.tokens.issue_token(&participant.id, false)?;

        tracing::info!(room_id = %room_id, participant_id = %participant.id, "Guest joined room");
        Ok(Participant {
            id: participant.id,
            token,
            ..Default::default()
        })
    }

    /// Update a participant's display name
    pub async fn rename_participant(
        &self,
        room_id: &str,
        participant_id: &str,
        name: &str,
    ) -> Result<()> {
        self.store
            .hset(
                &keys::participant(room_id, participant_id),
                vec![("name".into(), name.to_string())],
            )
            .await
    }

    /// Check if a participant belongs to a room
    pub async fn is_participant(&self, room_id: &str, participant_id: &str) -> Result<bool> {
        let members = self.store.smembers(&keys::participants(room_id)).await?;
        Ok(members.iter().any(|m| m == participant_id))
    }

    /// All participants of a room, keyed by id
    pub async fn get_participants(&self, room_id: &str) -> Result<HashMap<String, Participant>> {
        let ids = self.store.smembers(&keys::participants(room_id)).await?;

        let mut participants = HashMap::with_capacity(ids.len());
        for id in ids {
            let record = self
                .store
                .hgetall(&keys::participant(room_id, &id))
                .await?;
            if record.is_empty() {
                tracing::warn!(room_id = %room_id, participant_id = %id, "Participant record missing");
                continue;
            }

            let participant = Participant {
                id: id.clone(),
                name: record.get("name").cloned().unwrap_or_default(),
                is_host: record.get("isHost").is_some_and(|v| v == "true" || v == "1"),
                token: String::new(),
            };
            participants.insert(id, participant);
        }

        Ok(participants)
    }

    // ==================== Health Check ====================

    pub async fn health_check(&self) -> Result<bool> {
        self.store.ping().await
    }
}

fn participant_fields(participant: &Participant) -> [(&'static str, String); 3] {
    [
        ("id", participant.id.clone()),
        ("name", participant.name.clone()),
        ("isHost", participant.is_host.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::Config;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn setup() -> (RoomRepository, MemoryStore, Arc<TokenService>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let store = MemoryStore::new(clock.clone());
        let tokens = Arc::new(TokenService::new(&Config::with_defaults("test-secret"), clock));
        let repo = RoomRepository::new(Arc::new(store.clone()), tokens.clone());
        (repo, store, tokens)
    }

    #[tokio::test]
    async fn test_create_then_get_room() {
        let (repo, _, _) = setup();

        let room = repo.create_room().await.unwrap();
        assert!(room.participants.is_empty());

        let fetched = repo.get_room(&room.id).await.unwrap();
        assert_eq!(fetched.id, room.id);
        assert!(fetched.participants.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_room() {
        let (repo, _, _) = setup();
        assert!(matches!(
            repo.get_room("nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_single_host_matches_host_id() {
        let (repo, _, _) = setup();
        let room = repo.create_room().await.unwrap();
        let host = repo.set_host_participant(&room.id).await.unwrap();

        repo.join_room(&room.id, "", "", "Guest", false).await.unwrap();

        let room = repo.get_room(&room.id).await.unwrap();
        let hosts: Vec<_> = room.participants.values().filter(|p| p.is_host).collect();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, host.id);
        assert_eq!(room.host_id, host.id);
        assert_eq!(repo.get_host(&room.id).await.unwrap(), host.id);
    }

    #[tokio::test]
    async fn test_host_join_renames_without_new_entry() {
        let (repo, _, _) = setup();
        let room = repo.create_room().await.unwrap();
        let host = repo.set_host_participant(&room.id).await.unwrap();

        let joined = repo
            .join_room(&room.id, &host.id, "host-token", "Alice", true)
            .await
            .unwrap();

        assert_eq!(joined.id, host.id);
        assert_eq!(joined.token, "host-token");
        assert!(joined.is_host);

        let room = repo.get_room(&room.id).await.unwrap();
        assert_eq!(room.participants.len(), 1);
        assert_eq!(room.participants[&host.id].name, "Alice");
    }

    #[tokio::test]
    async fn test_host_join_with_foreign_host_id_rejected() {
        let (repo, _, _) = setup();
        let room = repo.create_room().await.unwrap();
        repo.set_host_participant(&room.id).await.unwrap();

        let result = repo
            .join_room(&room.id, "someone-else", "t", "Mallory", true)
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_guest_join_creates_distinct_participant() {
        let (repo, _, tokens) = setup();
        let room = repo.create_room().await.unwrap();
        let host = repo.set_host_participant(&room.id).await.unwrap();

        let first = repo.join_room(&room.id, "", "", "Bob", false).await.unwrap();
        let second = repo.join_room(&room.id, "", "", "Bob", false).await.unwrap();

        let first_claims = tokens.validate_token(&first.token).unwrap();
        let second_claims = tokens.validate_token(&second.token).unwrap();
        assert!(!first_claims.is_host);
        assert_ne!(first_claims.participant_id, second_claims.participant_id);
        assert_ne!(first_claims.participant_id, host.id);

        let room = repo.get_room(&room.id).await.unwrap();
        assert_eq!(room.participants.len(), 3);
        assert_eq!(room.participants[&first_claims.participant_id].name, "Bob");
        assert!(repo
            .is_participant(&room.id, &second_claims.participant_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_join_room_without_host() {
        let (repo, _, _) = setup();
        let room = repo.create_room().await.unwrap();

        let result = repo.join_room(&room.id, "", "", "Bob", false).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_no_partial_host() {
        let (repo, store, _) = setup();
        let room = repo.create_room().await.unwrap();

        store.fail_writes_with_prefix(format!("room:{}:participant:", room.id));
        let result = repo.set_host_participant(&room.id).await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));

        store.clear_failures();
        let room = repo.get_room(&room.id).await.unwrap();
        assert!(room.participants.is_empty());
        assert!(room.host_id.is_empty());
    }
}
