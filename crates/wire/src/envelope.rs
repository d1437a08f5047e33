// SPDX-License-Identifier: MIT

//! Wire message envelope.
//!
//! Every message on the wire is a self-describing object carrying at
//! minimum `id`, `type`, and `timestamp`. We model that as an envelope
//! struct wrapping a tagged payload enum, rather than inferring the
//! variant from shape — unknown `type` tags deserialize to
//! [`Payload::Unknown`] and are dropped by the dispatcher, never
//! guessed at.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::ChunkInfo;
use crate::payload::Payload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: Payload,
    /// Present only on chunked transport fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
}

impl Envelope {
    pub fn new(payload: Payload, timestamp: i64) -> Self {
        Self { id: Uuid::new_v4(), timestamp, payload, chunk_info: None }
    }

    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    #[test]
    fn unknown_type_tag_round_trips_without_data_loss() {
        let json = serde_json::json!({
            "id": "11111111-1111-1111-1111-111111111111",
            "timestamp": 123,
            "type": "some_future_message_type",
            "extra_field": "ignored gracefully"
        });
        let envelope: Envelope = serde_json::from_value(json).expect("deserialize");
        assert!(matches!(envelope.payload, Payload::Unknown));
    }

    #[test]
    fn envelope_serializes_with_flattened_type_tag() {
        let envelope = Envelope::new(Payload::Ack { ok: true }, 42);
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value["type"], "ack");
        assert_eq!(value["ok"], true);
    }
}
