//! Slice Service for orchestrating metadata and slice requests.
//!
//! Every request is self-contained: the file is opened, its headers are
//! walked, and the requested bytes are read, with nothing retained
//! afterwards.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        SliceService                           │
//! │   get_slice()                                                 │
//! │     1. Open file       3. Parse descriptor   5. Encode LE     │
//! │     2. Select unit     4. Plan + read runs                    │
//! └──────────┬──────────────────────┬─────────────────────────────┘
//!            ▼                      ▼
//!     ┌─────────────┐       ┌────────────────┐
//!     │ FileSource  │       │ FitsFile       │
//!     │ (local, S3) │       │ (unit storage) │
//!     └─────────────┘       └────────────────┘
//! ```

use tracing::debug;

use crate::error::SliceError;
use crate::fits::{FitsFile, UnitDescriptor};
use crate::source::FileSource;

use super::descriptor::SliceDescriptor;
use super::extract::{extract, SliceResult, DEFAULT_MAX_CONCURRENT_READS};

// =============================================================================
// Requests and responses
// =============================================================================

/// A request for one slice of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRequest {
    /// File path, interpreted by the service's [`FileSource`]
    pub path: String,

    /// Zero-based unit index
    pub unit: usize,

    /// `start:stop,...` specification, one segment per axis
    pub slices: String,
}

impl SliceRequest {
    pub fn new(path: impl Into<String>, unit: usize, slices: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            unit,
            slices: slices.into(),
        }
    }
}

/// Result of a metadata request.
#[derive(Debug, Clone)]
pub struct FileDescription {
    pub path: String,

    /// Number of units in the file, even when `units` is filtered
    pub unit_count: usize,

    pub units: Vec<UnitDescriptor>,
}

// =============================================================================
// SliceService
// =============================================================================

/// Stateless service answering metadata and slice requests.
///
/// # Example
///
/// ```ignore
/// use fits_streamer::slice::{SliceRequest, SliceService};
/// use fits_streamer::source::LocalFileSource;
///
/// let service = SliceService::new(LocalFileSource::new("/data"));
///
/// let request = SliceRequest::new("cube.fits", 0, "0:1,0:50,0:50");
/// let slice = service.get_slice(&request).await?;
/// println!("{:?} {} ({} bytes)", slice.shape, slice.element_type, slice.bytes.len());
/// ```
pub struct SliceService<S: FileSource> {
    source: S,
    max_concurrent_reads: usize,
}

impl<S: FileSource> SliceService<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
        }
    }

    /// Limit the number of storage reads in flight for one request.
    pub fn with_max_concurrent_reads(mut self, max_concurrent_reads: usize) -> Self {
        self.max_concurrent_reads = max_concurrent_reads.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn max_concurrent_reads(&self) -> usize {
        self.max_concurrent_reads
    }

    async fn open(&self, path: &str) -> Result<FitsFile<S::Reader>, SliceError> {
        let reader = self.source.open(path).await?;
        Ok(FitsFile::open(reader).await?)
    }

    /// Describe the units of a file.
    ///
    /// With `unit` given, only that unit is returned.
    ///
    /// # Errors
    /// - `FileNotFound` if the path does not exist in the source
    /// - `Format` if the file is not readable as FITS
    /// - `UnitNotFound` if `unit` is out of range
    pub async fn describe(
        &self,
        path: &str,
        unit: Option<usize>,
    ) -> Result<FileDescription, SliceError> {
        let file = self.open(path).await?;
        let unit_count = file.units().len();

        let units = match unit {
            Some(index) => vec![file.unit(index)?.clone()],
            None => file.into_units(),
        };

        debug!(path, unit_count, "Described file");

        Ok(FileDescription {
            path: path.to_string(),
            unit_count,
            units,
        })
    }

    /// Extract one slice.
    ///
    /// # Errors
    /// - `FileNotFound`, `Format`, `UnitNotFound` as for [`describe`](Self::describe)
    /// - `NoData` if the unit carries no array
    /// - `Validation` / `OutOfBounds` for a bad specification
    /// - `ExtentExceeded` if the file holds fewer bytes than its header declares
    pub async fn get_slice(&self, request: &SliceRequest) -> Result<SliceResult, SliceError> {
        let file = self.open(&request.path).await?;
        let unit = file.unit(request.unit)?;

        let shape = match (&unit.shape, unit.element_type) {
            (Some(shape), Some(_)) => shape,
            _ => return Err(SliceError::NoData { unit: request.unit }),
        };

        let descriptor = SliceDescriptor::parse(&request.slices, shape)?;
        let result = extract(&file, unit, &descriptor, self.max_concurrent_reads).await?;

        debug!(
            path = %request.path,
            unit = request.unit,
            shape = ?result.shape,
            element_type = %result.element_type,
            bytes = result.bytes.len(),
            "Extracted slice"
        );

        Ok(result)
    }
}
