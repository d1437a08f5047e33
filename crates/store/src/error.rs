// SPDX-License-Identifier: MIT

//! Errors surfaced by the Shared State Store abstraction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend connection error: {0}")]
    Connection(String),

    #[error("backend command failed: {0}")]
    Command(String),

    #[error("value at key {key:?} field {field:?} was not valid JSON: {source}")]
    Decode { key: String, field: String, #[source] source: serde_json::Error },

    #[error("matcher script exhausted its retry budget ({attempts} attempts)")]
    MatcherContention { attempts: u32 },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        StoreError::Connection(e.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Command(e.to_string())
    }
}
