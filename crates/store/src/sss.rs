// SPDX-License-Identifier: MIT

//! The Shared State Store contract: the primitives every component in
//! this workspace needs from the backing store, independent of
//! whether that store is Redis or an in-process stand-in. Hashes,
//! sorted sets, append-only streams, and pub/sub are all the Matcher,
//! Broker, and Progress Fabric ever touch directly — nobody issues a
//! raw backend command outside this trait's implementors.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::StoreResult;

/// One scored member read back from a sorted set range query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// One entry read back from a stream, in `(entry_id, fields)` form.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub entry_id: String,
    pub fields: HashMap<String, String>,
}

#[async_trait]
pub trait Sss: Send + Sync {
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;
    async fn hset_many(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()>;
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()>;
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Insert or update `member`'s score in the sorted set at `key`.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()>;
    /// Members with score in `[min, max]`, ascending score order.
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<ScoredMember>>;
    /// Top `limit` members by descending score (ties broken by the
    /// backend's natural member ordering, which callers additionally
    /// break on `submission_seq` when exactness matters).
    async fn zrevrange(&self, key: &str, limit: usize) -> StoreResult<Vec<ScoredMember>>;
    /// 0-based rank from the *highest* score, or `None` if absent.
    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<usize>>;

    /// Append one entry; returns the backend-assigned entry id.
    async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> StoreResult<String>;
    /// Most recent `count` entries, newest first.
    async fn xrevrange(&self, stream: &str, count: usize) -> StoreResult<Vec<StreamEntry>>;

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()>;
    /// Subscribe to an exact channel name; the returned receiver yields
    /// message bodies until the subscription or the store is dropped.
    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>>;
    /// Subscribe to a glob pattern (keyspace-notification style).
    async fn psubscribe(&self, pattern: &str) -> StoreResult<mpsc::Receiver<(String, String)>>;
}

/// Lets an `Arc<S>` stand in for `S` itself, so a single store handle
/// can be shared between the Broker and anything else (the Progress
/// Fabric's subscriber task) that needs its own long-lived handle to
/// the same backend.
#[async_trait]
impl<T: Sss + ?Sized> Sss for std::sync::Arc<T> {
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        (**self).hset(key, field, value).await
    }

    async fn hset_many(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        (**self).hset_many(key, fields).await
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        (**self).hget(key, field).await
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        (**self).hgetall(key).await
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        (**self).hdel(key, field).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        (**self).del(key).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        (**self).zadd(key, member, score).await
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        (**self).zrem(key, member).await
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<ScoredMember>> {
        (**self).zrangebyscore(key, min, max).await
    }

    async fn zrevrange(&self, key: &str, limit: usize) -> StoreResult<Vec<ScoredMember>> {
        (**self).zrevrange(key, limit).await
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<usize>> {
        (**self).zrevrank(key, member).await
    }

    async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> StoreResult<String> {
        (**self).xadd(stream, fields).await
    }

    async fn xrevrange(&self, stream: &str, count: usize) -> StoreResult<Vec<StreamEntry>> {
        (**self).xrevrange(stream, count).await
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
        (**self).publish(channel, message).await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>> {
        (**self).subscribe(channel).await
    }

    async fn psubscribe(&self, pattern: &str) -> StoreResult<mpsc::Receiver<(String, String)>> {
        (**self).psubscribe(pattern).await
    }
}
