//! Kafka-backed message source.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use tokio::time::Instant;
use tracing::debug;

use super::MessageSource;
use crate::config::ForwarderConfig;
use crate::error::SourceError;
use crate::record::Record;

/// Consumer-group member reading one topic.
///
/// Offsets are auto-committed, which gives the pipeline at-least-once
/// delivery toward the destination.
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
    poll_timeout: Duration,
}

impl KafkaMessageSource {
    pub fn connect(config: &ForwarderConfig) -> Result<Self, SourceError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[config.topic.as_str()])?;

        Ok(Self {
            consumer,
            poll_timeout: config.fetch_poll_timeout,
        })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn fetch_batch(&self, max: usize) -> Result<Vec<Record>, SourceError> {
        let mut records = Vec::with_capacity(max);
        let deadline = Instant::now() + self.poll_timeout;

        while records.len() < max {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, self.consumer.recv()).await {
                Ok(Ok(message)) => records.push(to_record(&message)),
                Ok(Err(err)) => {
                    if records.is_empty() {
                        return Err(err.into());
                    }
                    // Keep the partial batch; a persistent error surfaces on
                    // the next fetch.
                    debug!(error = %err, fetched = records.len(), "fetch error after partial batch");
                    break;
                }
                // Poll timeout elapsed: short batch, not an error.
                Err(_) => break,
            }
        }

        Ok(records)
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> Record {
    let timestamp = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| {
                    (
                        header.key.to_string(),
                        header.value.map(Bytes::copy_from_slice).unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    Record {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        timestamp,
        key: message.key().map(Bytes::copy_from_slice).unwrap_or_default(),
        value: message
            .payload()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default(),
        headers,
    }
}
