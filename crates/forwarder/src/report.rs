//! Periodic CSV outcome reports.
//!
//! Every upload outcome becomes one report row, kept in insertion order.
//! Once `report_batch_size` rows accumulate the batch is serialized as CSV
//! and uploaded through the shared destination under a time-derived key,
//! then the accumulator resets. With report uploading disabled, rows are
//! still counted (the pipeline logs progress from the counters) but never
//! serialized.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::destination::Destination;
use crate::error::UploadError;
use crate::record::UploadOutcome;

pub const REPORT_CSV_HEADER: &str =
    "topic,partition,offset,timestamp,key,tombstone,decode_error,upload_error";

const REPORT_KEY_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// One line of the outcome report.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub tombstone: bool,
    pub decode_error: Option<String>,
    pub upload_error: Option<String>,
}

impl ReportRow {
    fn from_outcome(outcome: &UploadOutcome) -> Self {
        let message = &outcome.message;
        Self {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            timestamp: message.timestamp,
            key: String::from_utf8_lossy(&message.key).into_owned(),
            tombstone: message.tombstone,
            decode_error: message.decode_error.clone(),
            upload_error: outcome.error.as_ref().map(|e| e.to_string()),
        }
    }
}

pub struct ReportAccumulator {
    destination: Arc<dyn Destination>,
    batch_size: usize,
    upload_enabled: bool,
    rows: Vec<ReportRow>,
    /// Rows in the current window; counted even when uploads are disabled.
    row_count: usize,
    window_start: DateTime<Utc>,
    total_recorded: u64,
}

impl ReportAccumulator {
    pub fn new(destination: Arc<dyn Destination>, batch_size: usize, upload_enabled: bool) -> Self {
        Self {
            destination,
            batch_size,
            upload_enabled,
            rows: Vec::new(),
            row_count: 0,
            window_start: Utc::now(),
            total_recorded: 0,
        }
    }

    /// Append one row for a completed outcome.
    pub fn record(&mut self, outcome: &UploadOutcome) {
        if self.upload_enabled {
            self.rows.push(ReportRow::from_outcome(outcome));
        }
        self.row_count += 1;
        self.total_recorded += 1;
    }

    pub fn should_flush(&self) -> bool {
        self.row_count >= self.batch_size
    }

    pub fn pending_rows(&self) -> usize {
        self.row_count
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Serialize and upload the current window, then reset it.
    ///
    /// On upload failure the rows are retained so the next flush retries
    /// them. With uploads disabled this only resets the window counters.
    pub async fn flush(&mut self) -> Result<(), UploadError> {
        if !self.upload_enabled {
            self.reset_window();
            return Ok(());
        }
        if self.rows.is_empty() {
            return Ok(());
        }

        let window_end = Utc::now();
        let name = format!(
            "reports/report_{}_{}.csv",
            self.window_start.format(REPORT_KEY_TIME_FORMAT),
            window_end.format(REPORT_KEY_TIME_FORMAT),
        );
        let body = self.to_csv();

        self.destination
            .upload(&name, bytes::Bytes::from(body.into_bytes()))
            .await?;
        self.rows.clear();
        self.reset_window();
        Ok(())
    }

    fn reset_window(&mut self) {
        self.row_count = 0;
        self.window_start = Utc::now();
    }

    fn to_csv(&self) -> String {
        let mut out = String::with_capacity(64 * (self.rows.len() + 1));
        out.push_str(REPORT_CSV_HEADER);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                csv_field(&row.topic),
                row.partition,
                row.offset,
                row.timestamp.to_rfc3339(),
                csv_field(&row.key),
                row.tombstone,
                csv_field(row.decode_error.as_deref().unwrap_or("")),
                csv_field(row.upload_error.as_deref().unwrap_or("")),
            ));
        }
        out
    }
}

/// Minimal RFC 4180 quoting: only fields with embedded separators or quotes
/// get wrapped.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains(['"', ',', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::ObjectStoreDestination;
    use crate::record::DecodedMessage;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use object_store::memory::InMemory;
    use object_store::ObjectStore;

    fn outcome(offset: i64, key: &str) -> UploadOutcome {
        UploadOutcome {
            message: DecodedMessage {
                topic: "orders".to_string(),
                partition: 1,
                offset,
                timestamp: Utc::now(),
                key: Bytes::copy_from_slice(key.as_bytes()),
                tombstone: false,
                body: Bytes::from_static(b"body"),
                decode_error: None,
            },
            object_key: format!("orders/1/{offset}"),
            error: None,
        }
    }

    fn in_memory_destination() -> (Arc<InMemory>, Arc<ObjectStoreDestination>) {
        let store = Arc::new(InMemory::new());
        let destination =
            Arc::new(ObjectStoreDestination::with_store(store.clone(), "bucket").unwrap());
        (store, destination)
    }

    async fn list_keys(store: &InMemory) -> Vec<String> {
        store
            .list(None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect()
    }

    #[tokio::test]
    async fn rotation_happens_at_batch_size_and_resets() {
        let (store, destination) = in_memory_destination();
        let mut report = ReportAccumulator::new(destination, 3, true);

        for i in 0..2 {
            report.record(&outcome(i, "k"));
            assert!(!report.should_flush());
        }
        report.record(&outcome(2, "k"));
        assert!(report.should_flush());

        report.flush().await.unwrap();
        assert_eq!(report.pending_rows(), 0);
        assert_eq!(report.total_recorded(), 3);

        let keys = list_keys(&store).await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("reports/report_"));
        assert!(keys[0].ends_with(".csv"));
    }

    #[tokio::test]
    async fn every_flushed_report_starts_with_the_header() {
        let (store, destination) = in_memory_destination();
        let mut report = ReportAccumulator::new(destination, 1, true);

        report.record(&outcome(0, "k"));
        report.flush().await.unwrap();

        let keys = list_keys(&store).await;
        let body = store
            .get(&keys[0].as_str().into())
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with(REPORT_CSV_HEADER));
        assert!(text.contains("orders,1,0,"));
    }

    #[tokio::test]
    async fn disabled_reports_count_rows_but_upload_nothing() {
        let (store, destination) = in_memory_destination();
        let mut report = ReportAccumulator::new(destination, 2, false);

        report.record(&outcome(0, "k"));
        report.record(&outcome(1, "k"));
        assert!(report.should_flush());

        report.flush().await.unwrap();
        assert_eq!(report.pending_rows(), 0);
        assert_eq!(report.total_recorded(), 2);
        assert!(list_keys(&store).await.is_empty());
    }

    #[tokio::test]
    async fn rows_survive_a_failed_flush() {
        struct FailingDestination;

        #[async_trait]
        impl Destination for FailingDestination {
            async fn upload(&self, _key: &str, _body: Bytes) -> Result<(), UploadError> {
                Err(UploadError::Cancelled)
            }

            fn display(&self) -> String {
                "failing".to_string()
            }
        }

        let mut report = ReportAccumulator::new(Arc::new(FailingDestination), 1, true);
        report.record(&outcome(0, "k"));

        assert!(report.flush().await.is_err());
        assert_eq!(report.pending_rows(), 1);
        assert!(report.should_flush());
    }

    #[test]
    fn csv_fields_with_separators_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[tokio::test]
    async fn error_columns_carry_decode_and_upload_errors() {
        let (store, destination) = in_memory_destination();
        let mut report = ReportAccumulator::new(destination, 1, true);

        let mut failed = outcome(9, "k9");
        failed.message.decode_error = Some("invalid payload: truncated".to_string());
        failed.error = Some(UploadError::Cancelled);
        report.record(&failed);
        report.flush().await.unwrap();

        let keys = list_keys(&store).await;
        let body = store
            .get(&keys[0].as_str().into())
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("\"invalid payload: truncated\"") || text.contains("invalid payload: truncated"));
        assert!(text.contains("upload cancelled"));
    }
}
