//! Message types flowing through the forwarding pipeline.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::UploadError;

/// A single record read from the source topic. Created by the source,
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    /// Monotonic per-partition position.
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
    pub key: Bytes,
    /// Empty value marks a tombstone.
    pub value: Bytes,
    pub headers: Vec<(String, Bytes)>,
}

impl Record {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }
}

/// A record after decoding. Carries the record identity on its own so
/// reporting does not need the original [`Record`].
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
    pub key: Bytes,
    pub tombstone: bool,
    /// Decoded body; empty for tombstones and failed decodes.
    pub body: Bytes,
    pub decode_error: Option<String>,
}

/// One unit of work for the upload pool. Consumed exactly once.
#[derive(Debug)]
pub struct UploadTask {
    pub message: DecodedMessage,
    pub object_key: String,
}

/// Result of a completed upload attempt sequence (success or exhausted
/// retries). Replenishes flow capacity and feeds the report.
#[derive(Debug)]
pub struct UploadOutcome {
    pub message: DecodedMessage,
    pub object_key: String,
    pub error: Option<UploadError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_value(value: &[u8]) -> Record {
        Record {
            topic: "orders".to_string(),
            partition: 0,
            offset: 7,
            timestamp: Utc::now(),
            key: Bytes::from_static(b"k"),
            value: Bytes::copy_from_slice(value),
            headers: Vec::new(),
        }
    }

    #[test]
    fn empty_value_is_tombstone() {
        assert!(record_with_value(b"").is_tombstone());
        assert!(!record_with_value(b"x").is_tombstone());
    }
}
