//! Upload worker pool.
//!
//! A fixed-size pool of concurrent upload attempts, bounded by a semaphore.
//! Each submitted task runs its retry sequence in a spawned task holding an
//! owned permit, so the slot is released on every exit path. Outcomes are
//! published to a single results channel consumed by the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::destination::Destination;
use crate::error::UploadError;
use crate::record::{UploadOutcome, UploadTask};

/// Total attempts per task, including the first one.
pub const UPLOAD_RETRY_ATTEMPTS: u32 = 5;

pub struct UploadWorkerPool {
    slots: Arc<Semaphore>,
    destination: Arc<dyn Destination>,
    outcomes: mpsc::Sender<UploadOutcome>,
    attempt_timeout: Duration,
    cancel: CancellationToken,
}

impl UploadWorkerPool {
    pub fn new(
        workers: usize,
        attempt_timeout: Duration,
        destination: Arc<dyn Destination>,
        outcomes: mpsc::Sender<UploadOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(workers)),
            destination,
            outcomes,
            attempt_timeout,
            cancel,
        }
    }

    /// Wait for a free worker slot, then run the task's attempt sequence in
    /// the background. Exactly one outcome is published per task.
    pub async fn submit(&self, task: UploadTask) {
        // The pool owns the semaphore and never closes it.
        let Ok(permit) = self.slots.clone().acquire_owned().await else {
            return;
        };

        let destination = self.destination.clone();
        let outcomes = self.outcomes.clone();
        let attempt_timeout = self.attempt_timeout;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            // Permit travels with the task so the slot frees on every exit
            // path, panics included.
            let _permit = permit;

            let result =
                attempt_upload(destination.as_ref(), &task, attempt_timeout, &cancel).await;
            let outcome = UploadOutcome {
                message: task.message,
                object_key: task.object_key,
                error: result.err(),
            };

            if outcomes.send(outcome).await.is_err() {
                debug!("outcome receiver dropped during shutdown");
            }
        });
    }
}

/// Run up to [`UPLOAD_RETRY_ATTEMPTS`] attempts, each bounded by
/// `attempt_timeout`. Stops early once `cancel` is done; only the final
/// attempt's error is surfaced.
async fn attempt_upload(
    destination: &dyn Destination,
    task: &UploadTask,
    attempt_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), UploadError> {
    let mut last_error: Option<UploadError> = None;

    for attempt in 1..=UPLOAD_RETRY_ATTEMPTS {
        if cancel.is_cancelled() {
            return Err(last_error.unwrap_or(UploadError::Cancelled));
        }

        let upload = destination.upload(&task.object_key, task.message.body.clone());
        match tokio::time::timeout(attempt_timeout, upload).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                last_error = Some(err);
            }
            Err(_) => {
                last_error = Some(UploadError::Timeout {
                    timeout: attempt_timeout,
                })
            }
        }

        if attempt < UPLOAD_RETRY_ATTEMPTS {
            debug!(
                attempt,
                max = UPLOAD_RETRY_ATTEMPTS,
                key = %task.object_key,
                "upload attempt failed, retrying"
            );
        }
    }

    Err(last_error.unwrap_or(UploadError::Cancelled))
}
