//! Slice descriptors.
//!
//! A slice specification is a comma-separated list of half-open ranges, one
//! per axis, outermost axis first:
//!
//! ```text
//! 0:1,0:50,0:50      plane 0 of a [2, 50, 50] cube
//! 0:2,10:20,0:50    rows 10..20 of both planes
//! ```
//!
//! Validation order is fixed: the segment count is checked against the rank
//! before any segment is parsed, so an axis-count mismatch is always reported
//! as such.

use crate::error::{Bound, SliceError, ValidationError};

// =============================================================================
// Range
// =============================================================================

/// Half-open `[start, stop)` range along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub stop: u64,
}

impl Range {
    pub fn new(start: u64, stop: u64) -> Self {
        Self { start, stop }
    }

    /// The whole extent of an axis of length `size`.
    pub fn full(size: u64) -> Self {
        Self { start: 0, stop: size }
    }

    /// A single index, `[index, index + 1)`.
    pub fn single(index: u64) -> Self {
        Self {
            start: index,
            stop: index + 1,
        }
    }

    pub fn len(&self) -> u64 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Whether this range covers an axis of length `size` completely.
    pub fn is_full(&self, size: u64) -> bool {
        self.start == 0 && self.stop == size
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.stop)
    }
}

// =============================================================================
// SliceDescriptor
// =============================================================================

/// Validated per-axis ranges, one per axis of the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceDescriptor {
    ranges: Vec<Range>,
}

impl SliceDescriptor {
    /// Parse a `start:stop,start:stop,...` specification against `shape`.
    ///
    /// # Errors
    /// - `Validation(AxisCountMismatch)` if the segment count differs from
    ///   the rank, regardless of the segments' content
    /// - `Validation(MalformedSegment | InvalidBound | StartAfterStop)` for
    ///   a segment that is not a well-formed non-negative range
    /// - `OutOfBounds` if `stop` exceeds the axis length
    pub fn parse(spec: &str, shape: &[u64]) -> Result<Self, SliceError> {
        let segments: Vec<&str> = spec.split(',').collect();
        if segments.len() != shape.len() {
            return Err(ValidationError::AxisCountMismatch {
                expected: shape.len(),
                actual: segments.len(),
                shape: shape.to_vec(),
            }
            .into());
        }

        let ranges = segments
            .iter()
            .enumerate()
            .map(|(axis, segment)| parse_segment(axis, segment))
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_ranges(ranges, shape)
    }

    /// Validate already-typed ranges against `shape`.
    pub fn from_ranges(ranges: Vec<Range>, shape: &[u64]) -> Result<Self, SliceError> {
        if ranges.len() != shape.len() {
            return Err(ValidationError::AxisCountMismatch {
                expected: shape.len(),
                actual: ranges.len(),
                shape: shape.to_vec(),
            }
            .into());
        }

        for (axis, (range, &size)) in ranges.iter().zip(shape).enumerate() {
            if range.start > range.stop {
                return Err(ValidationError::StartAfterStop {
                    axis,
                    start: range.start,
                    stop: range.stop,
                }
                .into());
            }
            if range.stop > size {
                return Err(SliceError::OutOfBounds {
                    axis,
                    start: range.start,
                    stop: range.stop,
                    size,
                    shape: shape.to_vec(),
                });
            }
        }

        Ok(Self { ranges })
    }

    /// Select the whole of every axis.
    pub fn full(shape: &[u64]) -> Self {
        Self {
            ranges: shape.iter().map(|&size| Range::full(size)).collect(),
        }
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn rank(&self) -> usize {
        self.ranges.len()
    }

    /// Shape of the selected sub-array.
    pub fn result_shape(&self) -> Vec<u64> {
        self.ranges.iter().map(Range::len).collect()
    }

    /// Number of selected elements; `None` on overflow.
    pub fn element_count(&self) -> Option<u64> {
        self.ranges
            .iter()
            .try_fold(1u64, |acc, range| acc.checked_mul(range.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().any(Range::is_empty)
    }
}

impl std::fmt::Display for SliceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

fn parse_segment(axis: usize, segment: &str) -> Result<Range, ValidationError> {
    let malformed = || ValidationError::MalformedSegment {
        axis,
        segment: segment.to_string(),
    };

    let (start, stop) = segment.split_once(':').ok_or_else(malformed)?;
    if stop.contains(':') {
        return Err(malformed());
    }

    let start = parse_bound(axis, Bound::Start, start)?;
    let stop = parse_bound(axis, Bound::Stop, stop)?;

    if start > stop {
        return Err(ValidationError::StartAfterStop { axis, start, stop });
    }

    Ok(Range { start, stop })
}

fn parse_bound(axis: usize, bound: Bound, text: &str) -> Result<u64, ValidationError> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| ValidationError::InvalidBound {
            axis,
            bound,
            value: text.to_string(),
        })
}

// =============================================================================
// Tests
// =============================================================================
