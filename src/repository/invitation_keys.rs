use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::models::InvitationKey;
use crate::store::{keys, KvStore, WriteBatch};

/// Random bytes per invitation key (16 base64 characters).
pub const INVITATION_KEY_BYTES: usize = 12;

/// Generate a random invitation key, URL-safe base64.
pub fn generate_key() -> String {
    let mut bytes = [0u8; INVITATION_KEY_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Owns the lifetime of room invitation keys and their reverse index.
#[derive(Clone)]
pub struct InvitationKeyManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl InvitationKeyManager {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60)),
        }
    }

    pub fn generate_key(&self) -> String {
        generate_key()
    }

    /// Overwrite the room's current key and its expiry timestamp.
    pub async fn set_room_key(&self, room_id: &str, key: &str) -> Result<InvitationKey> {
        let expires_at = self.clock.now() + self.ttl;

        self.store
            .hset(
                &keys::room(room_id),
                vec![
                    ("invitation_key".into(), key.to_string()),
                    ("expiresIn".into(), format_expiry(expires_at)),
                ],
            )
            .await?;

        tracing::debug!(room_id = %room_id, expires_at = %expires_at, "Room invitation key set");
        Ok(InvitationKey {
            value: key.to_string(),
            room_id: room_id.to_string(),
            expires_at,
        })
    }

    /// When the room's current key stops being valid, if it has one.
    pub async fn key_expiry(&self, room_id: &str) -> Result<Option<DateTime<Utc>>> {
        let raw = self.store.hget(&keys::room(room_id), "expiresIn").await?;
        Ok(raw.as_deref().and_then(parse_expiry))
    }

    /// True when the room has no key, no room record, or the key has lapsed.
    pub async fn is_key_expired(&self, room_id: &str) -> Result<bool> {
        Ok(match self.key_expiry(room_id).await? {
            Some(expires_at) => expires_at <= self.clock.now(),
            None => true,
        })
    }

    /// Map `key -> room_id`, expiring at the key's own expiry instant.
    ///
    /// The instant comes from the issued key rather than the room record, so
    /// a rotation landing between issuing and indexing cannot extend it.
    pub async fn record_reverse_index(&self, key: &InvitationKey) -> Result<()> {
        self.store
            .apply(WriteBatch::new().set_expiring_at(
                keys::invitation_key(&key.value),
                key.room_id.as_str(),
                key.expires_at,
            ))
            .await?;

        tracing::debug!(room_id = %key.room_id, "Invitation key indexed");
        Ok(())
    }

    /// Resolve a key to its room.
    ///
    /// Unknown keys and store failures both come back as `Unauthorized` so a
    /// caller cannot tell a wrong guess from a backend problem.
    pub async fn authorize_key(&self, key_input: &str) -> Result<String> {
        let key_input = key_input.trim();
        if key_input.is_empty() {
            return Err(unauthorized());
        }

        match self.store.get(&keys::invitation_key(key_input)).await {
            Ok(Some(room_id)) => Ok(room_id),
            Ok(None) => Err(unauthorized()),
            Err(e) => {
                tracing::warn!(error = %e, "Invitation key lookup failed");
                Err(unauthorized())
            }
        }
    }

    /// Generate, persist and index a fresh key for the room.
    pub async fn issue_room_key(&self, room_id: &str) -> Result<InvitationKey> {
        let key = self.generate_key();
        let invitation = self.set_room_key(room_id, &key).await?;
        self.record_reverse_index(&invitation).await?;
        Ok(invitation)
    }
}

fn unauthorized() -> AppError {
    AppError::Unauthorized("Invalid invitation key".to_string())
}

fn format_expiry(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
