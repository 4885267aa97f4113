//! Payload decoding seam.
//!
//! The pipeline treats decoding as an opaque per-message function: it hands
//! the raw value bytes to a [`Decoder`] and records the body or the error.
//! A decode failure never aborts the pipeline; the message still counts as
//! processed and the error lands in the report row.

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::DecodeError;
use crate::record::{DecodedMessage, Record};

/// Pure per-message payload decoder.
pub trait Decoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<Bytes, DecodeError>;
}

/// Passes the payload through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl Decoder for RawDecoder {
    fn decode(&self, raw: &[u8]) -> Result<Bytes, DecodeError> {
        Ok(Bytes::copy_from_slice(raw))
    }
}

/// Validates the payload as JSON and pretty-prints it.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, raw: &[u8]) -> Result<Bytes, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        let pretty = serde_json::to_vec_pretty(&value)?;
        Ok(Bytes::from(pretty))
    }
}

/// Payload encoding selected in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Raw,
    Json,
}

impl Encoding {
    pub fn decoder(self) -> Arc<dyn Decoder> {
        match self {
            Self::Raw => Arc::new(RawDecoder),
            Self::Json => Arc::new(JsonDecoder),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown encoding `{other}` (expected raw or json)")),
        }
    }
}

/// Decode a record once, capturing identity, tombstone status and any
/// decode error. Tombstones bypass the decoder.
pub fn decode_record(decoder: &dyn Decoder, record: &Record) -> DecodedMessage {
    let (body, decode_error) = if record.is_tombstone() {
        (Bytes::new(), None)
    } else {
        match decoder.decode(&record.value) {
            Ok(body) => (body, None),
            Err(err) => (Bytes::new(), Some(err.to_string())),
        }
    };

    DecodedMessage {
        topic: record.topic.clone(),
        partition: record.partition,
        offset: record.offset,
        timestamp: record.timestamp,
        key: record.key.clone(),
        tombstone: record.is_tombstone(),
        body,
        decode_error,
    }
}
