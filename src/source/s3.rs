//! S3-backed file source.
//!
//! The request path is used as the object key, optionally below a prefix.

use async_trait::async_trait;
use aws_sdk_s3::Client;

use crate::error::IoError;
use crate::io::S3RangeReader;

use super::FileSource;

/// S3-backed implementation of `FileSource`.
///
/// # Example
///
/// ```ignore
/// use fits_streamer::source::{FileSource, S3FileSource};
/// use fits_streamer::io::create_s3_client;
///
/// let client = create_s3_client(None, "us-east-1").await;
/// let source = S3FileSource::new(client, "survey-data".to_string());
///
/// // The path "epoch1/field7.fits" becomes the S3 key
/// let reader = source.open("epoch1/field7.fits").await?;
/// ```
#[derive(Clone)]
pub struct S3FileSource {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3FileSource {
    pub fn new(client: Client, bucket: String) -> Self {
        Self {
            client,
            bucket,
            prefix: None,
        }
    }

    /// Resolve every path below `prefix` inside the bucket.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key for a request path.
    pub fn key_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, path),
            None => path.to_string(),
        }
    }
}

#[async_trait]
impl FileSource for S3FileSource {
    type Reader = S3RangeReader;

    async fn open(&self, path: &str) -> Result<Self::Reader, IoError> {
        if path.trim_matches('/').is_empty() {
            return Err(IoError::NotFound(path.to_string()));
        }
        S3RangeReader::new(self.client.clone(), self.bucket.clone(), self.key_for(path)).await
    }
}
