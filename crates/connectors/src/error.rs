// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors a connector can report back to the worker runtime.
///
/// The split between `Retryable` and `Terminal` matters: the connector is
/// the only party that knows whether a backend failure (timeout, 5xx,
/// disconnect) is worth another attempt, so it classifies its own errors
/// rather than leaving that call to the runtime.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("transport error talking to backend: {0}")]
    Transport(String),

    #[error("backend rejected the job: {0}")]
    Rejected(String),

    #[error("job cancelled before completion")]
    Cancelled,

    #[error("connector not initialized")]
    NotInitialized,
}

impl ConnectorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Transport(_))
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
