//! Key-value store handle.
//!
//! Room and key state live in an external hash/set store with per-key expiry.
//! [`KvStore`] is the seam: [`RedisStore`] talks to Redis through a
//! `deadpool-redis` pool, [`MemoryStore`] keeps everything in process and
//! expires entries against an injected [`Clock`](crate::clock::Clock).
//!
//! Every failure surfaces as [`AppError::StoreUnavailable`](crate::error::AppError).

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{create_pool, RedisStore};

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Store key layout
pub mod keys {
    pub fn room(room_id: &str) -> String {
        format!("room:{}", room_id)
    }

    pub fn participants(room_id: &str) -> String {
        format!("room:{}:participants", room_id)
    }

    pub fn participant(room_id: &str, participant_id: &str) -> String {
        format!("room:{}:participant:{}", room_id, participant_id)
    }

    pub fn invitation_key(key: &str) -> String {
        format!("invitationKey:{}", key)
    }
}

/// A single write inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    SAdd {
        key: String,
        member: String,
    },
    SetExpiringAt {
        key: String,
        value: String,
        expires_at: DateTime<Utc>,
    },
}

/// Writes applied as one unit: either all are visible or none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hset<K, V>(
        mut self,
        key: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.ops.push(WriteOp::HSet {
            key: key.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        });
        self
    }

    pub fn sadd(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_expiring_at(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        self.ops.push(WriteOp::SetExpiringAt {
            key: key.into(),
            value: value.into(),
            expires_at,
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Atomic hash/set/string store with per-key expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Apply every write in the batch atomically.
    async fn apply(&self, batch: WriteBatch) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// All fields of a hash; empty when the key does not exist.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<bool>;

    /// Single-hash convenience over [`KvStore::apply`].
    async fn hset(&self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        self.apply(WriteBatch::new().hset(key, fields)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::room("r1"), "room:r1");
        assert_eq!(keys::participants("r1"), "room:r1:participants");
        assert_eq!(keys::participant("r1", "p1"), "room:r1:participant:p1");
        assert_eq!(keys::invitation_key("k"), "invitationKey:k");
    }

    #[test]
    fn test_batch_keeps_order() {
        let batch = WriteBatch::new().sadd("s", "a").hset("h", [("f", "v")]);

        assert_eq!(batch.ops().len(), 2);
        assert!(matches!(batch.ops()[0], WriteOp::SAdd { .. }));
        assert!(matches!(batch.ops()[1], WriteOp::HSet { .. }));
    }
}
