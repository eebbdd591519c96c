use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{KvStore, WriteBatch, WriteOp};
use crate::clock::Clock;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
enum Failure {
    #[default]
    None,
    All,
    WritesWithPrefix(String),
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    failure: Failure,
}

impl State {
    /// Live entry for `key`, dropping it first if it has expired.
    fn live(&mut self, key: &str, now: DateTime<Utc>) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn check_read(&self) -> Result<()> {
        match self.failure {
            Failure::All => Err(unavailable()),
            _ => Ok(()),
        }
    }

    fn check_write(&self, key: &str) -> Result<()> {
        match &self.failure {
            Failure::All => Err(unavailable()),
            Failure::WritesWithPrefix(prefix) if key.starts_with(prefix.as_str()) => {
                Err(unavailable())
            }
            _ => Ok(()),
        }
    }
}

fn unavailable() -> AppError {
    AppError::StoreUnavailable("in-memory store marked unavailable".to_string())
}

fn wrong_type(key: &str) -> AppError {
    AppError::StoreUnavailable(format!(
        "WRONGTYPE operation against key {} holding the wrong kind of value",
        key
    ))
}

/// In-process store with the same atomicity and expiry semantics as the
/// Redis store. Expiry is evaluated lazily against the injected clock.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every read and write fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().failure = if unavailable {
            Failure::All
        } else {
            Failure::None
        };
    }

    /// Make writes to keys starting with `prefix` fail; reads keep working.
    pub fn fail_writes_with_prefix(&self, prefix: impl Into<String>) {
        self.lock().failure = Failure::WritesWithPrefix(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failure = Failure::None;
    }

    /// Whether a live (unexpired) entry exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.lock().live(key, now).is_some()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.lock();

        // Validate everything before touching anything
        for op in batch.ops() {
            let key = match op {
                WriteOp::HSet { key, .. }
                | WriteOp::SAdd { key, .. }
                | WriteOp::SetExpiringAt { key, .. } => key,
            };
            state.check_write(key)?;

            let existing = state.live(key, now).map(|e| e.value.clone());
            match (op, existing) {
                (WriteOp::HSet { .. }, Some(Value::Str(_) | Value::Set(_)))
                | (WriteOp::SAdd { .. }, Some(Value::Str(_) | Value::Hash(_))) => {
                    return Err(wrong_type(key));
                }
                _ => {}
            }
        }

        for op in batch.ops().iter().cloned() {
            match op {
                WriteOp::HSet { key, fields } => {
                    let entry = state.entries.entry(key).or_insert_with(|| Entry {
                        value: Value::Hash(HashMap::new()),
                        expires_at: None,
                    });
                    if let Value::Hash(hash) = &mut entry.value {
                        hash.extend(fields);
                    }
                }
                WriteOp::SAdd { key, member } => {
                    let entry = state.entries.entry(key).or_insert_with(|| Entry {
                        value: Value::Set(BTreeSet::new()),
                        expires_at: None,
                    });
                    if let Value::Set(set) = &mut entry.value {
                        set.insert(member);
                    }
                }
                WriteOp::SetExpiringAt {
                    key,
                    value,
                    expires_at,
                } => {
                    state.entries.insert(
                        key,
                        Entry {
                            value: Value::Str(value),
                            expires_at: Some(expires_at),
                        },
                    );
                }
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.check_read()?;

        match state.live(key, now).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.hgetall(key).await?.remove(field))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.check_read()?;

        match state.live(key, now).map(|e| &e.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.check_read()?;

        match state.live(key, now).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn ping(&self) -> Result<bool> {
        self.lock().check_read()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn store() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (MemoryStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_entry_expires_at_instant() {
        let (store, clock) = store();
        let expires_at = clock.now() + Duration::seconds(1);

        store
            .apply(WriteBatch::new().set_expiring_at("k", "v", expires_at))
            .await
            .unwrap();

        clock.advance(Duration::milliseconds(999));
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        clock.advance(Duration::milliseconds(1));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.contains_key("k"));
    }

    #[tokio::test]
    async fn test_hash_fields_merge() {
        let (store, _) = store();
        store.hset("h", vec![("a".into(), "1".into())]).await.unwrap();
        store
            .hset("h", vec![("b".into(), "2".into()), ("a".into(), "3".into())])
            .await
            .unwrap();

        let all = store.hgetall("h").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.hget("h", "a").await.unwrap(), Some("3".to_string()));
        assert_eq!(store.hget("missing", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let (store, _) = store();
        store.hset("h", vec![("a".into(), "1".into())]).await.unwrap();

        // SADD against a hash fails, so the preceding SADD must not land either
        let result = store
            .apply(WriteBatch::new().sadd("s", "x").sadd("h", "y"))
            .await;

        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
        assert!(store.smembers("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prefix_failure_only_blocks_matching_writes() {
        let (store, clock) = store();
        store.fail_writes_with_prefix("invitationKey:");

        let far = clock.now() + Duration::seconds(60);
        assert!(store
            .apply(WriteBatch::new().set_expiring_at("invitationKey:k", "r", far))
            .await
            .is_err());
        assert!(store.hset("room:r", vec![("id".into(), "r".into())]).await.is_ok());
        assert!(store.get("invitationKey:k").await.is_ok());

        store.clear_failures();
        assert!(store
            .apply(WriteBatch::new().set_expiring_at("invitationKey:k", "r", far))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let (store, _) = store();
        store.set_unavailable(true);

        assert!(store.ping().await.is_err());
        assert!(store.get("k").await.is_err());
        assert!(store.smembers("s").await.is_err());
    }
}
