//! Array extraction.
//!
//! FITS stores arrays row-major with `NAXIS1` varying fastest, which in our
//! outermost-first shape is the last axis. A selection is read as a set of
//! contiguous byte runs:
//!
//! ```text
//! shape [4, 6, 8], selection [1:3, 2:4, 0:8]
//!
//! axis 2 is full, axis 1 is not  ->  runs are along axis 1
//! run length = (4 - 2) * 8 elements
//! one run per index of the outer axes: (1), (2)  ->  2 reads
//! ```
//!
//! The run axis `k` is the outermost axis such that every axis after it is
//! selected in full. The outer axes `0..k` are walked with an odometer.
//! Only the selected bytes are read; nothing is cached.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::codec::{encode_in_place, ElementType};
use crate::error::{SliceError, ValidationError};
use crate::fits::{FitsFile, UnitDescriptor};
use crate::io::RangeReader;

use super::descriptor::SliceDescriptor;

/// Runs larger than this are split so that big reads can proceed in parallel.
pub const MAX_RUN_BYTES: u64 = 8 * 1024 * 1024;

/// Default number of outstanding reads per extraction.
pub const DEFAULT_MAX_CONCURRENT_READS: usize = 8;

// =============================================================================
// Storage accessor
// =============================================================================

/// Byte-range access to the data segment of a unit.
#[async_trait]
pub trait UnitStorage: Send + Sync {
    /// Read `len` bytes at `offset` relative to the unit's first data byte.
    async fn read_range(&self, unit: usize, offset: u64, len: u64) -> Result<Bytes, SliceError>;
}

#[async_trait]
impl<R: RangeReader> UnitStorage for FitsFile<R> {
    async fn read_range(&self, unit: usize, offset: u64, len: u64) -> Result<Bytes, SliceError> {
        FitsFile::read_range(self, unit, offset, len).await
    }
}

// =============================================================================
// Read planning
// =============================================================================

/// One contiguous read, in bytes relative to the unit's data start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRun {
    pub offset: u64,
    pub len: u64,
}

/// The reads needed for one selection, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    pub runs: Vec<ReadRun>,
    pub total_bytes: u64,
}

impl ReadPlan {
    /// One past the last byte touched by the plan.
    pub fn extent(&self) -> u64 {
        self.runs
            .iter()
            .map(|run| run.offset + run.len)
            .max()
            .unwrap_or(0)
    }
}

/// Compute the contiguous runs covering `descriptor` in an array of `shape`.
///
/// The descriptor must already be validated against `shape`. Returns `None`
/// when a byte offset in the plan does not fit in a `u64`.
pub fn plan_reads(shape: &[u64], descriptor: &SliceDescriptor, width: usize) -> Option<ReadPlan> {
    let ranges = descriptor.ranges();
    let width = width as u64;

    if ranges.is_empty() || descriptor.is_empty() {
        return Some(ReadPlan {
            runs: Vec::new(),
            total_bytes: 0,
        });
    }

    let rank = ranges.len();

    // Byte strides, last axis fastest
    let mut strides = vec![width; rank];
    for axis in (0..rank - 1).rev() {
        strides[axis] = strides[axis + 1].checked_mul(shape[axis + 1])?;
    }

    let mut run_axis = rank - 1;
    while run_axis > 0 && ranges[run_axis].is_full(shape[run_axis]) {
        run_axis -= 1;
    }

    let run_bytes = ranges[run_axis].len().checked_mul(strides[run_axis])?;
    let run_start = ranges[run_axis].start.checked_mul(strides[run_axis])?;

    let mut runs = Vec::new();
    let mut index: Vec<u64> = ranges[..run_axis].iter().map(|r| r.start).collect();

    loop {
        let base = index
            .iter()
            .zip(&strides)
            .try_fold(run_start, |acc, (i, stride)| acc.checked_add(i.checked_mul(*stride)?))?;
        // The run's end must be addressable too
        base.checked_add(run_bytes)?;
        push_split(&mut runs, base, run_bytes);

        // Advance the odometer over the outer axes
        let mut axis = run_axis;
        loop {
            if axis == 0 {
                let total_bytes = runs
                    .iter()
                    .try_fold(0u64, |acc, r: &ReadRun| acc.checked_add(r.len))?;
                return Some(ReadPlan { runs, total_bytes });
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < ranges[axis].stop {
                break;
            }
            index[axis] = ranges[axis].start;
        }
    }
}

fn push_split(runs: &mut Vec<ReadRun>, mut offset: u64, mut len: u64) {
    while len > MAX_RUN_BYTES {
        runs.push(ReadRun {
            offset,
            len: MAX_RUN_BYTES,
        });
        offset += MAX_RUN_BYTES;
        len -= MAX_RUN_BYTES;
    }
    runs.push(ReadRun { offset, len });
}

// =============================================================================
// Extraction
// =============================================================================

/// An extracted sub-array in canonical little-endian form.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceResult {
    /// `stop - start` per axis
    pub shape: Vec<u64>,
    pub element_type: ElementType,
    /// `product(shape) * width` bytes, row-major, little-endian
    pub bytes: Bytes,
}

/// Read and encode the selection `descriptor` from `unit`.
///
/// At most `max_concurrent_reads` reads are outstanding; results are
/// assembled in plan order.
///
/// # Errors
/// - `NoData` if the unit has no array payload
/// - `Validation` / `OutOfBounds` if the descriptor does not fit the shape
/// - `ExtentExceeded` if the plan reaches past the unit's stored data, or
///   past the end of a 64-bit address space
pub async fn extract<S>(
    storage: &S,
    unit: &UnitDescriptor,
    descriptor: &SliceDescriptor,
    max_concurrent_reads: usize,
) -> Result<SliceResult, SliceError>
where
    S: UnitStorage + ?Sized,
{
    let (shape, element_type) = match (&unit.shape, unit.element_type) {
        (Some(shape), Some(element_type)) => (shape.as_slice(), element_type),
        _ => return Err(SliceError::NoData { unit: unit.index }),
    };

    // Descriptors normally come from the parser; re-check against the unit
    if descriptor.rank() != shape.len() {
        return Err(ValidationError::AxisCountMismatch {
            expected: shape.len(),
            actual: descriptor.rank(),
            shape: shape.to_vec(),
        }
        .into());
    }
    for (axis, (range, &size)) in descriptor.ranges().iter().zip(shape).enumerate() {
        if range.stop > size || range.start > range.stop {
            return Err(SliceError::OutOfBounds {
                axis,
                start: range.start,
                stop: range.stop,
                size,
                shape: shape.to_vec(),
            });
        }
    }

    let plan = plan_reads(shape, descriptor, element_type.width()).ok_or_else(|| {
        SliceError::ExtentExceeded {
            unit: unit.index,
            offset: 0,
            requested: u64::MAX,
            available: unit.data_len,
        }
    })?;
    if plan.extent() > unit.data_len {
        return Err(SliceError::ExtentExceeded {
            unit: unit.index,
            offset: 0,
            requested: plan.extent(),
            available: unit.data_len,
        });
    }

    debug!(
        unit = unit.index,
        slices = %descriptor,
        runs = plan.runs.len(),
        bytes = plan.total_bytes,
        "Planned slice read"
    );

    let capacity = usize::try_from(plan.total_bytes)
        .map_err(|_| SliceError::Internal("slice too large for this platform".to_string()))?;
    let mut buf = BytesMut::with_capacity(capacity);

    let unit_index = unit.index;
    let mut chunks = stream::iter(plan.runs.iter().copied())
        .map(|run| async move {
            let bytes = storage.read_range(unit_index, run.offset, run.len).await?;
            if bytes.len() as u64 != run.len {
                return Err(SliceError::Internal(format!(
                    "short read at offset {}: {} of {} bytes",
                    run.offset,
                    bytes.len(),
                    run.len
                )));
            }
            Ok(bytes)
        })
        .buffered(max_concurrent_reads.max(1));

    while let Some(chunk) = chunks.try_next().await? {
        buf.extend_from_slice(&chunk);
    }

    encode_in_place(&mut buf, element_type, unit.encoding);

    Ok(SliceResult {
        shape: descriptor.result_shape(),
        element_type,
        bytes: buf.freeze(),
    })
}

// =============================================================================
// Tests
// =============================================================================
