//! The forwarding pipeline loop.
//!
//! Each iteration reserves flow tokens, fetches at most that many records,
//! decodes them and hands them to the upload pool. Completed outcomes come
//! back on a single channel owned by this loop; each one releases a token
//! and feeds the report. Fetch problems are transient: they are logged and
//! the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ForwarderConfig;
use crate::decode::{decode_record, Decoder};
use crate::destination::Destination;
use crate::error::ForwardError;
use crate::flow::FlowController;
use crate::record::{DecodedMessage, UploadOutcome, UploadTask};
use crate::report::ReportAccumulator;
use crate::source::MessageSource;
use crate::workers::UploadWorkerPool;

pub struct Forwarder {
    source: Arc<dyn MessageSource>,
    decoder: Arc<dyn Decoder>,
    destination: Arc<dyn Destination>,
    fetch_batch_size: usize,
    upload_workers: usize,
    upload_timeout: Duration,
    poll_sleep: Duration,
    fixed_object_key: Option<String>,
    flow: FlowController,
    report: ReportAccumulator,
}

impl Forwarder {
    pub fn new(
        config: &ForwarderConfig,
        source: Arc<dyn MessageSource>,
        decoder: Arc<dyn Decoder>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        let report = ReportAccumulator::new(
            destination.clone(),
            config.report_batch_size,
            config.upload_reports,
        );
        Self {
            source,
            decoder,
            destination,
            fetch_batch_size: config.fetch_batch_size,
            upload_workers: config.upload_workers,
            upload_timeout: config.upload_timeout,
            poll_sleep: config.poll_sleep,
            fixed_object_key: config.fixed_object_key.clone(),
            flow: FlowController::new(config.flow_capacity),
            report,
        }
    }

    /// Run until cancelled. After cancellation, no new fetches are started;
    /// the loop waits for every dispatched task's outcome, flushes the
    /// report window and returns.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ForwardError> {
        let (outcome_tx, mut outcome_rx) = mpsc::channel(self.flow.capacity());
        let pool = UploadWorkerPool::new(
            self.upload_workers,
            self.upload_timeout,
            self.destination.clone(),
            outcome_tx,
            cancel.clone(),
        );

        info!(
            destination = %self.destination.display(),
            capacity = self.flow.capacity(),
            workers = self.upload_workers,
            "forwarder pipeline started"
        );

        while !cancel.is_cancelled() {
            while let Ok(outcome) = outcome_rx.try_recv() {
                self.handle_outcome(outcome).await;
            }

            let granted = self.flow.try_reserve(self.fetch_batch_size);
            if granted == 0 {
                // All capacity is in flight: park until an outcome returns
                // tokens or the poll-sleep interval elapses. Never spin on
                // the token count.
                let outcome = if self.poll_sleep.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        outcome = outcome_rx.recv() => outcome,
                    }
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        outcome = outcome_rx.recv() => outcome,
                        _ = tokio::time::sleep(self.poll_sleep) => continue,
                    }
                };
                match outcome {
                    Some(outcome) => self.handle_outcome(outcome).await,
                    None => break,
                }
                continue;
            }

            let mut records = tokio::select! {
                // Cancellation during a fetch is not an error: no records
                // this iteration.
                _ = cancel.cancelled() => {
                    self.flow.release(granted);
                    break;
                }
                fetched = self.source.fetch_batch(granted) => match fetched {
                    Ok(records) => records,
                    Err(err) => {
                        warn!(error = %err, "fetch failed, retrying");
                        self.flow.release(granted);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.poll_sleep) => {}
                        }
                        continue;
                    }
                }
            };

            // The source contract is "at most granted"; enforce it so token
            // accounting cannot go negative.
            records.truncate(granted);
            if records.len() < granted {
                self.flow.release(granted - records.len());
            }
            if !records.is_empty() {
                debug!(count = records.len(), "fetched batch");
            }

            for record in records {
                let message = decode_record(self.decoder.as_ref(), &record);
                let object_key = self.object_key_for(&message);
                pool.submit(UploadTask {
                    message,
                    object_key,
                })
                .await;
            }
        }

        self.drain(&mut outcome_rx).await;
        if let Err(err) = self.report.flush().await {
            warn!(error = %err, "final report flush failed");
        }

        info!(
            forwarded = self.report.total_recorded(),
            "forwarder pipeline stopped"
        );
        Ok(())
    }

    async fn handle_outcome(&mut self, outcome: UploadOutcome) {
        self.flow.release(1);
        if let Some(error) = &outcome.error {
            warn!(key = %outcome.object_key, error = %error, "upload failed after retries");
        }
        self.report.record(&outcome);
        if self.report.should_flush() {
            let rows = self.report.pending_rows();
            match self.report.flush().await {
                Ok(()) => info!(
                    rows,
                    total = self.report.total_recorded(),
                    "report window closed"
                ),
                Err(error) => warn!(error = %error, "report flush failed, rows retained"),
            }
        }
    }

    /// Wait for every dispatched task to produce its outcome.
    async fn drain(&mut self, outcome_rx: &mut mpsc::Receiver<UploadOutcome>) {
        let outstanding = self.flow.outstanding();
        if outstanding > 0 {
            debug!(outstanding, "draining in-flight uploads");
        }
        while self.flow.outstanding() > 0 {
            match outcome_rx.recv().await {
                Some(outcome) => self.handle_outcome(outcome).await,
                None => break,
            }
        }
    }

    fn object_key_for(&self, message: &DecodedMessage) -> String {
        match &self.fixed_object_key {
            Some(key) => key.clone(),
            None => format!(
                "{}/{}/{}",
                message.topic, message.partition, message.offset
            ),
        }
    }
}
