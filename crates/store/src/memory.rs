// SPDX-License-Identifier: MIT

//! `MemorySss`: a single-process stand-in for the Shared State Store,
//! used by unit/integration tests and the CLI's `--in-memory` dev
//! mode. Every operation that would be an atomic Redis command or
//! script is instead guarded by one `parking_lot::Mutex`, which is a
//! stronger consistency model than production gets but a faithful one
//! for exercising the invariants the real backend must also uphold.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::StoreResult;
use crate::sss::{ScoredMember, Sss, StreamEntry};

#[derive(Default)]
struct State {
    hashes: HashMap<String, HashMap<String, String>>,
    sorted_sets: HashMap<String, HashMap<String, f64>>,
    streams: HashMap<String, Vec<(u64, HashMap<String, String>)>>,
    stream_seq: HashMap<String, u64>,
    subscribers: HashMap<String, Vec<mpsc::Sender<String>>>,
    psubscribers: Vec<(String, mpsc::Sender<(String, String)>)>,
}

pub struct MemorySss {
    state: Mutex<State>,
}

impl Default for MemorySss {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySss {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    fn notify_psubscribers(state: &State, channel: &str, message: &str) {
        for (pattern, tx) in &state.psubscribers {
            if glob_match(pattern, channel) {
                let _ = tx.try_send((channel.to_string(), message.to_string()));
            }
        }
    }
}

/// Minimal `*`-only glob matcher, sufficient for the `__keyspace@*__:x:*`
/// shapes the Progress Fabric subscribes to. Not a general glob engine.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else { return pattern == text };
    if !text.starts_with(first) {
        return false;
    }
    let mut rest = &text[first.len()..];
    for part in parts {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[async_trait]
impl Sss for MemorySss {
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.state.lock().hashes.entry(key.to_string()).or_default().insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hset_many(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        let mut state = self.state.lock();
        let entry = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self.state.lock().hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self.state.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        if let Some(h) = self.state.lock().hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.hashes.remove(key);
        state.sorted_sets.remove(key);
        state.streams.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.state.lock().sorted_sets.entry(key.to_string()).or_default().insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        if let Some(set) = self.state.lock().sorted_sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<ScoredMember>> {
        let state = self.state.lock();
        let mut members: Vec<ScoredMember> = state
            .sorted_sets
            .get(key)
            .into_iter()
            .flatten()
            .filter(|(_, &score)| score >= min && score <= max)
            .map(|(member, &score)| ScoredMember { member: member.clone(), score })
            .collect();
        members.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(members)
    }

    async fn zrevrange(&self, key: &str, limit: usize) -> StoreResult<Vec<ScoredMember>> {
        let state = self.state.lock();
        let mut members: Vec<ScoredMember> = state
            .sorted_sets
            .get(key)
            .into_iter()
            .flatten()
            .map(|(member, &score)| ScoredMember { member: member.clone(), score })
            .collect();
        members.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.member.cmp(&b.member))
        });
        members.truncate(limit);
        Ok(members)
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<usize>> {
        let ranked = self.zrevrange(key, usize::MAX).await?;
        Ok(ranked.iter().position(|m| m.member == member))
    }

    async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> StoreResult<String> {
        let mut state = self.state.lock();
        let seq = state.stream_seq.entry(stream.to_string()).or_insert(0);
        *seq += 1;
        let entry_id = format!("{seq}-0");
        let map: HashMap<String, String> = fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        state.streams.entry(stream.to_string()).or_default().push((*seq, map));
        let channel = format!("__keyspace@0__:{stream}");
        Self::notify_psubscribers(&state, &channel, "xadd");
        Ok(entry_id)
    }

    async fn xrevrange(&self, stream: &str, count: usize) -> StoreResult<Vec<StreamEntry>> {
        let state = self.state.lock();
        let mut entries: Vec<StreamEntry> = state
            .streams
            .get(stream)
            .into_iter()
            .flatten()
            .map(|(seq, fields)| StreamEntry { entry_id: format!("{seq}-0"), fields: fields.clone() })
            .collect();
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        if let Some(subs) = state.subscribers.get_mut(channel) {
            subs.retain(|tx| tx.try_send(message.to_string()).is_ok());
        }
        Self::notify_psubscribers(&state, channel, message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>> {
        let (tx, rx) = mpsc::channel(256);
        self.state.lock().subscribers.entry(channel.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn psubscribe(&self, pattern: &str) -> StoreResult<mpsc::Receiver<(String, String)>> {
        let (tx, rx) = mpsc::channel(256);
        self.state.lock().psubscribers.push((pattern.to_string(), tx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_roundtrip() {
        let sss = MemorySss::new();
        sss.hset("job:1", "status", "queued").await.unwrap();
        assert_eq!(sss.hget("job:1", "status").await.unwrap(), Some("queued".to_string()));
    }

    #[tokio::test]
    async fn zrevrange_orders_by_descending_score() {
        let sss = MemorySss::new();
        sss.zadd("queue", "a", 10.0).await.unwrap();
        sss.zadd("queue", "b", 30.0).await.unwrap();
        sss.zadd("queue", "c", 20.0).await.unwrap();
        let top = sss.zrevrange("queue", 2).await.unwrap();
        assert_eq!(top.iter().map(|m| m.member.clone()).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn psubscribe_matches_glob_pattern() {
        let sss = MemorySss::new();
        let mut rx = sss.psubscribe("__keyspace@*__:progress:*").await.unwrap();
        sss.publish("__keyspace@0__:progress:job-1", "xadd").await.unwrap();
        let (channel, _) = rx.recv().await.unwrap();
        assert_eq!(channel, "__keyspace@0__:progress:job-1");
    }

    #[test]
    fn glob_match_handles_prefix_and_suffix_wildcards() {
        assert!(glob_match("__keyspace@*__:progress:*", "__keyspace@0__:progress:job-1"));
        assert!(!glob_match("__keyspace@*__:progress:*", "__keyspace@0__:workers:job-1"));
    }
}
