//! # FITS Streamer
//!
//! A slice server for large N-dimensional arrays stored in FITS files.
//!
//! A client names a file, a unit (HDU) and a per-axis `start:stop` range; the
//! server reads only the byte ranges that cover the selection and answers
//! with raw little-endian element bytes, the result shape and the element
//! type. Files live in a local directory or an S3-compatible bucket.
//!
//! ## Features
//!
//! - **Range-based extraction**: contiguous runs are coalesced and read
//!   concurrently; the file is never read whole
//! - **All FITS image types**: 8/16/32/64-bit integers, both float widths,
//!   and the BZERO unsigned-integer convention
//! - **Streaming client**: chunked downloads with progress and cancellation
//! - **Plane navigation**: a state machine that pages through leading axes
//! - **Authentication**: optional HMAC-SHA256 signed URLs
//!
//! ## Architecture
//!
//! - [`io`] - range readers over local files, S3 and memory
//! - [`fits`] - header parsing and the unit table
//! - [`codec`] - element types and byte-order conversion
//! - [`source`] - path to reader resolution
//! - [`slice`] - slice descriptors, read planning and extraction
//! - [`server`] - Axum HTTP server and routes
//! - [`client`] - HTTP client, transfers and navigation
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use fits_streamer::{create_router, LocalFileSource, RouterConfig, SliceService};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let service = SliceService::new(LocalFileSource::new("/data/fits"));
//!     let router = create_router(service, RouterConfig::without_auth());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod fits;
pub mod io;
pub mod server;
pub mod slice;
pub mod source;

// Re-export commonly used types
pub use client::{
    DecodedSlice, FetchTrigger, NavigationState, Progress, Renderer, SliceClient, SliceFetcher,
    SliceNavigator, SliceTransfer, SliceViewer, ViewOutcome, ViewPhase,
};
pub use codec::{ElementType, TypedArray};
pub use config::{Cli, Command, FetchConfig, InspectConfig, ServeConfig, SignConfig, SignOutputFormat};
pub use error::{FormatError, IoError, NavigationError, SliceError, TransferError, ValidationError};
pub use fits::{FitsFile, Header, UnitDescriptor, UnitKind};
pub use io::{create_s3_client, LocalFileReader, MemoryRangeReader, RangeReader, S3RangeReader};
pub use server::{
    create_router, AppState, AuthError, CorsOrigins, ErrorResponse, MetadataResponse,
    RouterConfig, UrlSigner,
};
pub use slice::{Range, SliceDescriptor, SliceRequest, SliceResult, SliceService};
pub use source::{FileSource, LocalFileSource, S3FileSource};
