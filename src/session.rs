//! Room session orchestration: create, join and authorize.
//!
//! [`RoomSession`] holds no state of its own. It composes the token service,
//! the room repository and the invitation key manager, and lets their errors
//! propagate unchanged.

use std::sync::Arc;

use crate::auth::TokenService;
use crate::error::{AppError, Result};
use crate::models::{Claims, InvitationKey, Participant, Room};
use crate::repository::{InvitationKeyManager, RoomRepository};

/// Outcome of creating a room
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room: Room,
    pub host: Participant,
    pub token: String,
}

/// Outcome of joining a room
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    pub room: Room,
    pub participant: Participant,
}

#[derive(Clone)]
pub struct RoomSession {
    tokens: Arc<TokenService>,
    rooms: Arc<RoomRepository>,
    keys: Arc<InvitationKeyManager>,
}

impl RoomSession {
    pub fn new(
        tokens: Arc<TokenService>,
        rooms: Arc<RoomRepository>,
        keys: Arc<InvitationKeyManager>,
    ) -> Self {
        Self {
            tokens,
            rooms,
            keys,
        }
    }

    /// Create a room with its host and mint the host token.
    pub async fn create_room(&self) -> Result<CreatedRoom> {
        let mut room = self.rooms.create_room().await?;
        let host = self.rooms.set_host_participant(&room.id).await?;
        let token = self.tokens.issue_token(&host.id, true)?;

        let host = host.with_token(token.clone());
        room.add_participant(host.clone());

        Ok(CreatedRoom { room, host, token })
    }

    /// Join a room, with or without an identity token.
    ///
    /// A token that fails validation is rejected; it never falls back to a
    /// fresh guest identity.
    pub async fn join_room(
        &self,
        room_id: &str,
        bearer: Option<&str>,
        name: &str,
    ) -> Result<JoinedRoom> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(AppError::BadRequest("Room ID is required".to_string()));
        }

        let participant = match bearer.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => {
                let claims = self.tokens.validate_token(token)?;
                self.join_with_claims(room_id, token, &claims, name).await?
            }
            None => self.rooms.join_room(room_id, "", "", name, false).await?,
        };

        let mut room = self.rooms.get_room(room_id).await?;
        let participant = match room.participants.get_mut(&participant.id) {
            Some(entry) => {
                entry.token = participant.token;
                entry.clone()
            }
            None => {
                return Err(AppError::InternalError(format!(
                    "Participant {} missing after join",
                    participant.id
                )))
            }
        };

        Ok(JoinedRoom { room, participant })
    }

    async fn join_with_claims(
        &self,
        room_id: &str,
        token: &str,
        claims: &Claims,
        name: &str,
    ) -> Result<Participant> {
        if claims.is_host {
            return self
                .rooms
                .join_room(room_id, &claims.participant_id, token, name, true)
                .await;
        }

        // A guest coming back with its own token keeps its identity
        if !self
            .rooms
            .is_participant(room_id, &claims.participant_id)
            .await?
        {
            self.rooms.get_host(room_id).await?;
            return Err(AppError::Unauthorized(
                "Token does not belong to this room".to_string(),
            ));
        }

        self.rooms
            .rename_participant(room_id, &claims.participant_id, name)
            .await?;

        tracing::info!(room_id = %room_id, participant_id = %claims.participant_id, "Guest rejoined room");
        Ok(Participant {
            id: claims.participant_id.clone(),
            name: name.to_string(),
            is_host: false,
            token: token.to_string(),
        })
    }

    /// Resolve an invitation key to the room it unlocks.
    pub async fn authorize_invitation(&self, key_input: &str) -> Result<String> {
        self.keys.authorize_key(key_input).await
    }

    /// Issue and index a fresh invitation key for a room.
    pub async fn issue_invitation(&self, room_id: &str) -> Result<InvitationKey> {
        self.rooms.get_host(room_id).await?;
        self.keys.issue_room_key(room_id).await
    }

    /// Validate that `token` belongs to the host of `room_id`.
    pub async fn require_host(&self, room_id: &str, token: &str) -> Result<Claims> {
        let claims = self.tokens.validate_token(token)?;
        self.require_host_claims(room_id, claims).await
    }

    pub async fn require_host_claims(&self, room_id: &str, claims: Claims) -> Result<Claims> {
        let host_id = self.rooms.get_host(room_id).await?;
        if !claims.is_host || claims.participant_id != host_id {
            return Err(AppError::Unauthorized(
                "Only the room host may manage invitation keys".to_string(),
            ));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::Config;
    use crate::store::{KvStore, MemoryStore};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    struct Harness {
        session: RoomSession,
        tokens: Arc<TokenService>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::starting_now());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new(dyn_clock.clone()));
        let config = Config::with_defaults("session-secret");

        let tokens = Arc::new(TokenService::new(&config, dyn_clock.clone()));
        let rooms = Arc::new(RoomRepository::new(store.clone(), tokens.clone()));
        let keys = Arc::new(InvitationKeyManager::new(
            store,
            dyn_clock,
            config.invitation_key_ttl(),
        ));

        Harness {
            session: RoomSession::new(tokens.clone(), rooms, keys),
            tokens,
            clock,
        }
    }

    #[tokio::test]
    async fn test_create_room_mints_host_token() {
        let h = harness();
        let created = h.session.create_room().await.unwrap();

        let claims = h.tokens.validate_token(&created.token).unwrap();
        assert!(claims.is_host);
        assert_eq!(claims.participant_id, created.host.id);
        assert_eq!(created.room.host_id, created.host.id);
        assert_eq!(created.room.participants.len(), 1);
        assert_eq!(created.host.name, "");
    }

    #[tokio::test]
    async fn test_end_to_end_invitation_flow() {
        let h = harness();

        let created = h.session.create_room().await.unwrap();
        let room_id = created.room.id.clone();

        let host = h
            .session
            .join_room(&room_id, Some(&created.token), "Host")
            .await
            .unwrap();
        assert_eq!(host.participant.id, created.host.id);
        assert_eq!(host.room.participants.len(), 1);

        let key = h.session.issue_invitation(&room_id).await.unwrap();
        assert_eq!(
            h.session.authorize_invitation(&key.value).await.unwrap(),
            room_id
        );

        let guest = h.session.join_room(&room_id, None, "Guest").await.unwrap();
        assert!(!guest.participant.is_host);
        assert_ne!(guest.participant.token, created.token);
        assert_eq!(guest.room.participants.len(), 2);
        assert!(guest.room.participants.contains_key(&created.host.id));
        assert_eq!(guest.room.participants[&guest.participant.id].name, "Guest");

        let claims = h.tokens.validate_token(&guest.participant.token).unwrap();
        assert_eq!(claims.participant_id, guest.participant.id);

        h.clock.advance(Duration::seconds(61));
        assert!(matches!(
            h.session.authorize_invitation(&key.value).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected_not_downgraded() {
        let h = harness();
        let created = h.session.create_room().await.unwrap();

        let result = h
            .session
            .join_room(&created.room.id, Some("not-a-jwt"), "Eve")
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        h.clock.advance(Duration::minutes(16));
        let result = h
            .session
            .join_room(&created.room.id, Some(&created.token), "Host")
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        // Neither attempt created a participant
        h.clock.advance(Duration::minutes(-16));
        let room = h
            .session
            .join_room(&created.room.id, Some(&created.token), "Host")
            .await
            .unwrap()
            .room;
        assert_eq!(room.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_guest_rejoin_keeps_identity() {
        let h = harness();
        let created = h.session.create_room().await.unwrap();
        let room_id = created.room.id.clone();

        let first = h.session.join_room(&room_id, None, "Bob").await.unwrap();
        let again = h
            .session
            .join_room(&room_id, Some(&first.participant.token), "Robert")
            .await
            .unwrap();

        assert_eq!(again.participant.id, first.participant.id);
        assert_eq!(again.room.participants.len(), 2);
        assert_eq!(again.participant.name, "Robert");
    }

    #[tokio::test]
    async fn test_tokens_do_not_cross_rooms() {
        let h = harness();
        let a = h.session.create_room().await.unwrap();
        let b = h.session.create_room().await.unwrap();

        let host_elsewhere = h.session.join_room(&b.room.id, Some(&a.token), "A").await;
        assert!(matches!(host_elsewhere, Err(AppError::Unauthorized(_))));

        let guest = h.session.join_room(&a.room.id, None, "G").await.unwrap();
        let guest_elsewhere = h
            .session
            .join_room(&b.room.id, Some(&guest.participant.token), "G")
            .await;
        assert!(matches!(guest_elsewhere, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let h = harness();
        let result = h.session.join_room("missing", None, "G").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = h.session.join_room("  ", None, "G").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_require_host() {
        let h = harness();
        let created = h.session.create_room().await.unwrap();
        let guest = h.session.join_room(&created.room.id, None, "G").await.unwrap();

        assert!(h
            .session
            .require_host(&created.room.id, &created.token)
            .await
            .is_ok());
        assert!(matches!(
            h.session
                .require_host(&created.room.id, &guest.participant.token)
                .await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
