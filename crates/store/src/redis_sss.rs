// SPDX-License-Identifier: MIT

//! `RedisSss`: the production Shared State Store, backed by Redis via
//! `redis` + `deadpool-redis` connection pooling. Pub/sub and keyspace
//! notifications need a dedicated, non-pooled connection (Redis multiplexes
//! regular commands and subscriptions differently), so those two
//! operations open their own connection off the client and spawn a
//! forwarding task rather than borrowing from the pool.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures_util::StreamExt;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::{StoreError, StoreResult};
use crate::sss::{ScoredMember, Sss, StreamEntry};

pub struct RedisSss {
    pool: Pool,
    client: redis::Client,
}

impl RedisSss {
    pub fn connect(redis_url: &str) -> StoreResult<Self> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| StoreError::Connection(e.to_string()))?;
        let client = redis::Client::open(redis_url).map_err(StoreError::from)?;
        Ok(Self { pool, client })
    }

    /// Invoke the matcher Lua script, loading it by `EVALSHA` first and
    /// falling back to a plain `EVAL` on a cache miss (`NOSCRIPT`) —
    /// the usual two-step dance for scripts the server may not have
    /// cached yet.
    pub(crate) async fn eval_matcher_script(
        &self,
        pending_queue_key: &str,
        job_key_prefix: &str,
        worker_id: &str,
        scan_limit: usize,
        capabilities_json: &str,
        now_ms: i64,
    ) -> StoreResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let script = redis::Script::new(crate::matcher::MATCHER_SCRIPT);
        let result: Option<String> = script
            .key(pending_queue_key)
            .key(job_key_prefix)
            .arg(worker_id)
            .arg(scan_limit)
            .arg(capabilities_json)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(result)
    }
}

#[async_trait]
impl Sss for RedisSss {
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hset_many(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.hset_multiple::<_, _, _, ()>(key, fields).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.hdel::<_, _, ()>(key, field).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.zrem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<ScoredMember>> {
        let mut conn = self.pool.get().await?;
        let raw: Vec<(String, f64)> = conn.zrangebyscore_withscores(key, min, max).await?;
        Ok(raw.into_iter().map(|(member, score)| ScoredMember { member, score }).collect())
    }

    async fn zrevrange(&self, key: &str, limit: usize) -> StoreResult<Vec<ScoredMember>> {
        let mut conn = self.pool.get().await?;
        let stop = if limit == 0 { 0 } else { limit as isize - 1 };
        let raw: Vec<(String, f64)> = conn.zrevrange_withscores(key, 0, stop).await?;
        Ok(raw.into_iter().map(|(member, score)| ScoredMember { member, score }).collect())
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<usize>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.zrevrank(key, member).await?)
    }

    async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> StoreResult<String> {
        let mut conn = self.pool.get().await?;
        let entry_id: String = conn.xadd(stream, "*", fields).await?;
        Ok(entry_id)
    }

    async fn xrevrange(&self, stream: &str, count: usize) -> StoreResult<Vec<StreamEntry>> {
        let mut conn = self.pool.get().await?;
        let raw: Vec<redis::streams::StreamId> = redis::cmd("XREVRANGE")
            .arg(stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(raw
            .into_iter()
            .map(|entry| StreamEntry {
                entry_id: entry.id,
                fields: entry
                    .map
                    .into_iter()
                    .filter_map(|(k, v)| redis::from_redis_value::<String>(&v).ok().map(|v| (k, v)))
                    .collect(),
            })
            .collect())
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.publish::<_, _, ()>(channel, message).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>> {
        let (tx, rx) = mpsc::channel(256);
        let conn = self.client.get_async_pubsub().await.map_err(StoreError::from)?;
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut pubsub = conn;
            if pubsub.subscribe(&channel).await.is_err() {
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let Ok(payload): Result<String, _> = msg.get_payload() else { continue };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn psubscribe(&self, pattern: &str) -> StoreResult<mpsc::Receiver<(String, String)>> {
        let (tx, rx) = mpsc::channel(256);
        let conn = self.client.get_async_pubsub().await.map_err(StoreError::from)?;
        let pattern = pattern.to_string();
        tokio::spawn(async move {
            let mut pubsub = conn;
            if pubsub.psubscribe(&pattern).await.is_err() {
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let Ok(payload): Result<String, _> = msg.get_payload() else { continue };
                if tx.send((channel, payload)).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
