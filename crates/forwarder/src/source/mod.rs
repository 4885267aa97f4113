//! Message source abstraction.
//!
//! The pipeline pulls batches through [`MessageSource`] and stays unaware of
//! the underlying consumer client; [`KafkaMessageSource`] is the production
//! implementation.

mod kafka;

pub use kafka::KafkaMessageSource;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::record::Record;

/// Pull-based batch source backed by a durable consumer group.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch at most `max` records. A short (possibly empty) batch after
    /// the source's poll timeout is normal, not an error.
    async fn fetch_batch(&self, max: usize) -> Result<Vec<Record>, SourceError>;
}
