//! # kfwd engine
//!
//! Forwarding engine for kfwd: consumes a partitioned, offset-addressed
//! topic as part of a durable consumer group, decodes each message and
//! uploads the decoded bodies to an object store.
//!
//! The moving parts:
//!
//! - [`Forwarder`] — the fetch → decode → dispatch loop
//! - [`FlowController`] — bounded in-flight token pool (backpressure)
//! - [`UploadWorkerPool`] — fixed-size upload concurrency with retry
//! - [`ReportAccumulator`] — periodic CSV outcome reports
//! - [`ShutdownCoordinator`] — signal handling and dual-component drain
//! - [`HealthServer`] — optional liveness endpoint

pub mod config;
pub mod decode;
pub mod destination;
pub mod error;
pub mod flow;
pub mod health;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod shutdown;
pub mod source;
pub mod workers;

pub use config::ForwarderConfig;
pub use decode::{decode_record, Decoder, Encoding, JsonDecoder, RawDecoder};
pub use destination::{parse_destination, Destination, ObjectStoreDestination};
pub use error::{DecodeError, ForwardError, SourceError, UploadError};
pub use flow::FlowController;
pub use health::{run_health_server, HealthServer};
pub use pipeline::Forwarder;
pub use record::{DecodedMessage, Record, UploadOutcome, UploadTask};
pub use report::{ReportAccumulator, ReportRow, REPORT_CSV_HEADER};
pub use shutdown::{Component, ShutdownCoordinator, ShutdownState};
pub use source::{KafkaMessageSource, MessageSource};
pub use workers::{UploadWorkerPool, UPLOAD_RETRY_ATTEMPTS};
