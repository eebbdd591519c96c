use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};
use redis::AsyncCommands;

use super::{KvStore, WriteBatch, WriteOp};
use crate::config::Config;
use crate::error::{AppError, Result};

/// Create a Redis connection pool
pub fn create_pool(config: &Config) -> Result<Pool> {
    let redis_config = RedisConfig::from_url(&config.redis_url);
    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to create Redis pool: {}", e)))?;

    Ok(pool)
}

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Build the MULTI/EXEC pipeline for a batch.
fn pipeline_for(batch: &WriteBatch) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();

    for op in batch.ops() {
        match op {
            WriteOp::HSet { key, fields } => {
                pipe.hset_multiple(key, fields.as_slice()).ignore();
            }
            WriteOp::SAdd { key, member } => {
                pipe.sadd(key, member).ignore();
            }
            WriteOp::SetExpiringAt {
                key,
                value,
                expires_at,
            } => {
                // PXAT gives the entry an absolute expiry instant
                pipe.cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PXAT")
                    .arg(expires_at.timestamp_millis())
                    .ignore();
            }
        }
    }

    pipe
}

#[async_trait]
impl KvStore for RedisStore {
    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get().await?;
        pipeline_for(&batch).query_async::<()>(&mut *conn).await?;

        tracing::trace!(ops = batch.ops().len(), "Batch applied");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.pool.get().await?;
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn ping(&self) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;

        Ok(pong == "PONG")
    }
}
