//! Invitation key rotation tasks.
//!
//! One task per distribution channel, bound to that channel's lifetime:
//!
//! - **Push**: every rotation interval, generate a key, persist it, deliver it
//!   to the host, then index it. A failed reverse-index write halts the loop;
//!   the delivery channel closes when the task returns.
//! - **Poll**: every poll interval, check whether the room's key has expired
//!   and only then issue and emit a new one.
//!
//! Both loops stop when their [`CancellationToken`] is cancelled or their
//! receiver is dropped.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::models::KeyEvent;
use crate::repository::InvitationKeyManager;

/// Why a rotation task returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationExit {
    Cancelled,
    ReceiverClosed,
    IndexFailed,
}

/// Tracks the single rotation (push or poll) allowed per room.
#[derive(Default)]
pub struct RotationRegistry {
    active: DashMap<String, CancellationToken>,
}

impl RotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the room's rotation slot. `None` when a rotation already runs.
    pub fn try_start(self: &Arc<Self>, room_id: &str) -> Option<RotationLease> {
        use dashmap::mapref::entry::Entry;

        match self.active.entry(room_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                Some(RotationLease {
                    registry: Arc::clone(self),
                    room_id: room_id.to_string(),
                    token,
                })
            }
        }
    }

    pub fn is_active(&self, room_id: &str) -> bool {
        self.active.contains_key(room_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Cancel every running rotation (shutdown).
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            entry.value().cancel();
        }
    }
}

/// Ownership of a room's rotation slot; releasing it cancels the rotation.
pub struct RotationLease {
    registry: Arc<RotationRegistry>,
    room_id: String,
    token: CancellationToken,
}

impl RotationLease {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RotationLease {
    fn drop(&mut self) {
        self.token.cancel();
        self.registry.active.remove(&self.room_id);
    }
}

/// Push rotation: persist, deliver, then index, once per interval.
///
/// The first key is issued immediately so a freshly connected host has one
/// to share.
pub async fn run_push_rotation(
    keys: Arc<InvitationKeyManager>,
    room_id: String,
    interval: Duration,
    outbox: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> RotationExit {
    tracing::info!(room_id = %room_id, interval_secs = interval.as_secs(), "Key rotation started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            _ = cancel.cancelled() => break RotationExit::Cancelled,
            _ = ticker.tick() => {}
        }

        let key = keys.generate_key();
        let issued = match keys.set_room_key(&room_id, &key).await {
            Ok(issued) => issued,
            Err(e) => {
                // Nothing was delivered; the next cycle issues a new key
                tracing::warn!(room_id = %room_id, error = %e, "Failed to persist invitation key");
                continue;
            }
        };

        if outbox.send(key).await.is_err() {
            break RotationExit::ReceiverClosed;
        }

        if let Err(e) = keys.record_reverse_index(&issued).await {
            tracing::warn!(room_id = %room_id, error = %e, "Failed to index invitation key, halting rotation");
            break RotationExit::IndexFailed;
        }

        tracing::debug!(room_id = %room_id, "Invitation key rotated");
    };

    tracing::info!(room_id = %room_id, exit = ?exit, "Key rotation stopped");
    exit
}

/// Poll rotation: issue a new key only once the current one has expired.
pub async fn run_poll_rotation(
    keys: Arc<InvitationKeyManager>,
    room_id: String,
    interval: Duration,
    outbox: mpsc::Sender<KeyEvent>,
    cancel: CancellationToken,
) -> RotationExit {
    tracing::info!(room_id = %room_id, interval_secs = interval.as_secs(), "Key polling started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        if cancel.is_cancelled() {
            break RotationExit::Cancelled;
        }

        tokio::select! {
            _ = cancel.cancelled() => break RotationExit::Cancelled,
            _ = ticker.tick() => {}
        }

        let event = match keys.is_key_expired(&room_id).await {
            Ok(false) => continue,
            Ok(true) => match keys.issue_room_key(&room_id).await {
                Ok(key) => {
                    tracing::debug!(room_id = %room_id, "Expired invitation key replaced");
                    KeyEvent::Update(key.value)
                }
                Err(e) => {
                    tracing::warn!(room_id = %room_id, error = %e, "Failed to issue invitation key");
                    KeyEvent::Error("failed to rotate invitation key".to_string())
                }
            },
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "Failed to check invitation key expiry");
                KeyEvent::Error("failed to check invitation key".to_string())
            }
        };

        if outbox.send(event).await.is_err() {
            break RotationExit::ReceiverClosed;
        }
    };

    tracing::info!(room_id = %room_id, exit = ?exit, "Key polling stopped");
    exit
}
