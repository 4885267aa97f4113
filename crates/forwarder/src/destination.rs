//! Upload destination abstraction.
//!
//! The pipeline and the report accumulator share one [`Destination`]; the
//! object-store variant wraps an [`ObjectStore`] client scoped to a bucket,
//! with an optional key prefix parsed from a `bucket[/prefix...]` spec.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

use crate::error::{ForwardError, UploadError};

/// Where decoded bodies and reports end up.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError>;

    /// Human-readable destination identity for logs.
    fn display(&self) -> String;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DestinationParseError {
    #[error("destination is empty")]
    Empty,

    #[error("bucket name is empty")]
    EmptyBucket,
}

/// Parse a `bucket[/prefix...]` destination spec.
///
/// Whitespace is trimmed; the first `/` separates bucket from prefix; a
/// present-but-empty trailing segment yields no prefix.
pub fn parse_destination(input: &str) -> Result<(String, Option<String>), DestinationParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DestinationParseError::Empty);
    }

    let (bucket, prefix) = match trimmed.split_once('/') {
        None => (trimmed, None),
        Some((bucket, rest)) => (bucket, (!rest.is_empty()).then(|| rest.to_string())),
    };

    if bucket.is_empty() {
        return Err(DestinationParseError::EmptyBucket);
    }

    Ok((bucket.to_string(), prefix))
}

/// Object-store destination scoped to one bucket with an optional prefix.
pub struct ObjectStoreDestination {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: Option<String>,
}

impl ObjectStoreDestination {
    /// Build an S3 destination from a `bucket[/prefix]` spec, with client
    /// credentials and region taken from the standard AWS environment.
    pub fn from_spec(spec: &str) -> Result<Self, ForwardError> {
        let (bucket, prefix) = parse_destination(spec)
            .map_err(|err| ForwardError::configuration(format!("KFWD_DESTINATION: {err}")))?;
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .build()
            .map_err(|err| {
                ForwardError::configuration(format!(
                    "failed to initialize object store for bucket `{bucket}`: {err}"
                ))
            })?;
        Ok(Self {
            store: Arc::new(store),
            bucket,
            prefix,
        })
    }

    /// Wrap an existing store client; used with in-memory stores in tests.
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        spec: &str,
    ) -> Result<Self, DestinationParseError> {
        let (bucket, prefix) = parse_destination(spec)?;
        Ok(Self {
            store,
            bucket,
            prefix,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Final object key for `name`: `prefix/name` when a prefix is set.
    pub fn object_key(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        }
    }
}

#[async_trait]
impl Destination for ObjectStoreDestination {
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError> {
        let path = ObjectPath::from(self.object_key(key));
        self.store.put(&path, PutPayload::from_bytes(body)).await?;
        Ok(())
    }

    fn display(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", self.bucket, prefix),
            None => self.bucket.clone(),
        }
    }
}
