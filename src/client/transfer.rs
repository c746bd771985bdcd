//! Streaming slice transfers.
//!
//! A [`SliceTransfer`] is created once the response headers are known and
//! then pulled one body chunk at a time:
//!
//! ```text
//! open ──► next_chunk ──► next_chunk ──► ... ──► None ──► finish
//!              │               │
//!          Progress        Progress          (bytes_read, total_bytes)
//! ```
//!
//! Cancellation is observed while waiting for the next chunk. A chunk is
//! either delivered whole or not at all, and a cancelled transfer ends with
//! [`TransferError::Aborted`], never with a partial slice.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;

use crate::codec::{expected_byte_len, ElementType};
use crate::error::TransferError;

use super::decoded::DecodedSlice;

/// Largest buffer reserved before any body bytes arrive.
pub const MAX_PREALLOC_BYTES: u64 = 8 * 1024 * 1024;

// =============================================================================
// Chunk sources
// =============================================================================

/// A body that yields bytes in arrival order.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `None` at the end of the body.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError>;
}

#[async_trait]
impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        Ok(self.chunk().await?)
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Bytes received so far out of the total implied by the response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub bytes_read: u64,
    pub total_bytes: u64,
}

impl Progress {
    /// Completed fraction in `[0, 1]`; an empty body counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_read as f64 / self.total_bytes as f64
        }
    }
}

// =============================================================================
// SliceTransfer
// =============================================================================

/// An in-progress slice download.
pub struct SliceTransfer<C = reqwest::Response> {
    shape: Vec<u64>,
    element_type: ElementType,
    total_bytes: u64,
    source: C,
    buf: BytesMut,
    cancel: CancellationToken,
    done: bool,
}

impl<C: ChunkSource> SliceTransfer<C> {
    /// Start a transfer for a body of `shape` elements of `element_type`.
    ///
    /// `declared_len` is the transport's own length, when it has one; it must
    /// agree with the length implied by shape and type.
    pub fn new(
        shape: Vec<u64>,
        element_type: ElementType,
        declared_len: Option<u64>,
        source: C,
        cancel: CancellationToken,
    ) -> Result<Self, TransferError> {
        let total_bytes = expected_byte_len(&shape, element_type).ok_or_else(|| {
            TransferError::Protocol(format!("shape {:?} overflows", shape))
        })?;

        if let Some(declared) = declared_len {
            if declared != total_bytes {
                return Err(TransferError::Integrity {
                    expected: total_bytes,
                    actual: declared,
                });
            }
        }

        if usize::try_from(total_bytes).is_err() {
            return Err(TransferError::Protocol(format!(
                "{} byte slice exceeds address space",
                total_bytes
            )));
        }
        // The headers are not trusted for a large up-front reservation
        let capacity = total_bytes.min(MAX_PREALLOC_BYTES) as usize;

        Ok(Self {
            shape,
            element_type,
            total_bytes,
            source,
            buf: BytesMut::with_capacity(capacity),
            cancel,
            done: false,
        })
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn progress(&self) -> Progress {
        Progress {
            bytes_read: self.buf.len() as u64,
            total_bytes: self.total_bytes,
        }
    }

    /// Token that aborts this transfer at the next chunk boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Pull the next chunk.
    ///
    /// Returns the progress after the chunk, or `None` once the body ends.
    pub async fn next_chunk(&mut self) -> Result<Option<Progress>, TransferError> {
        if self.done {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            return Err(TransferError::Aborted);
        }

        let chunk = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TransferError::Aborted),
            chunk = self.source.next_chunk() => chunk?,
        };

        let Some(chunk) = chunk else {
            self.done = true;
            return Ok(None);
        };

        let received = self.buf.len() as u64 + chunk.len() as u64;
        if received > self.total_bytes {
            return Err(TransferError::Integrity {
                expected: self.total_bytes,
                actual: received,
            });
        }

        self.buf.extend_from_slice(&chunk);
        Ok(Some(self.progress()))
    }

    /// Read the rest of the body, reporting progress after every chunk.
    pub async fn finish_with_progress<F>(mut self, mut on_progress: F) -> Result<DecodedSlice, TransferError>
    where
        F: FnMut(Progress) + Send,
    {
        while let Some(progress) = self.next_chunk().await? {
            on_progress(progress);
        }

        DecodedSlice::new(self.shape, self.element_type, self.buf.freeze())
    }

    /// Read the rest of the body.
    pub async fn finish(self) -> Result<DecodedSlice, TransferError> {
        self.finish_with_progress(|_| {}).await
    }
}

// =============================================================================
// Tests
// =============================================================================
