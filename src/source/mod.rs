//! Where files come from.
//!
//! A [`FileSource`] turns the `path` parameter of a request into a
//! [`RangeReader`]. Two backends are provided:
//!
//! - [`LocalFileSource`]: files under a root directory on local disk
//! - [`S3FileSource`]: objects in an S3 or S3-compatible bucket
//!
//! Sources hold no per-file state; every call to `open` produces a fresh
//! reader.

mod local;
mod s3;

use async_trait::async_trait;

use crate::error::IoError;
use crate::io::RangeReader;

pub use local::LocalFileSource;
pub use s3::S3FileSource;

/// Trait for opening range readers from request paths.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// The type of range reader this source creates.
    type Reader: RangeReader + 'static;

    /// Open the file at `path`.
    ///
    /// Returns `IoError::NotFound` when the path does not name a readable
    /// file in this source.
    async fn open(&self, path: &str) -> Result<Self::Reader, IoError>;
}
