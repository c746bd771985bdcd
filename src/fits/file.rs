//! Walking the HDU chain of a FITS file.
//!
//! Only header blocks are read while walking; data segments are skipped by
//! offset arithmetic, so opening a multi-gigabyte file costs one small read
//! per header block.

use bytes::Bytes;
use tracing::debug;

use crate::error::{FormatError, IoError, SliceError};
use crate::io::RangeReader;

use super::hdu::UnitDescriptor;
use super::header::{padded_len, Card, Header, BLOCK_SIZE, CARD_SIZE};

/// An opened FITS file: the unit table plus the reader it came from.
pub struct FitsFile<R> {
    reader: R,
    units: Vec<UnitDescriptor>,
}

impl<R: RangeReader> FitsFile<R> {
    /// Walk every header in the file and build the unit table.
    ///
    /// Bytes after the last complete unit that do not start an `XTENSION`
    /// header are ignored. A final unit whose data is cut short is kept;
    /// reads past the stored bytes fail later with an out-of-bounds error.
    ///
    /// # Errors
    /// - `NotFits` if the file does not begin with a `SIMPLE` card
    /// - `TruncatedHeader` if a header has no `END` card before end of file
    /// - keyword errors from [`UnitDescriptor::from_header`]
    pub async fn open(reader: R) -> Result<Self, FormatError> {
        let size = reader.size();
        if size < BLOCK_SIZE as u64 {
            return Err(FormatError::NotFits {
                reason: format!("file is {} bytes, smaller than one header block", size),
            });
        }

        let mut units = Vec::new();
        let mut offset = 0u64;

        while offset.saturating_add(BLOCK_SIZE as u64) <= size {
            let index = units.len();

            let first = reader.read_exact_at(offset, CARD_SIZE).await?;
            let keyword = Card::parse(&first).keyword;
            let expected = if index == 0 { "SIMPLE" } else { "XTENSION" };
            if keyword != expected {
                if index == 0 {
                    return Err(FormatError::NotFits {
                        reason: format!("first keyword is '{}', expected SIMPLE", keyword),
                    });
                }
                debug!(
                    file = reader.identifier(),
                    offset, "Ignoring trailing bytes after last HDU"
                );
                break;
            }

            let (header, header_len) = read_header(&reader, index, offset).await?;
            let data_offset = offset + header_len;
            let unit = UnitDescriptor::from_header(index, header, data_offset)?;

            offset = data_offset.saturating_add(padded_len(unit.data_len));
            units.push(unit);
        }

        debug!(
            file = reader.identifier(),
            units = units.len(),
            "Walked FITS headers"
        );

        Ok(Self { reader, units })
    }

    pub fn units(&self) -> &[UnitDescriptor] {
        &self.units
    }

    /// Look up a unit by index.
    pub fn unit(&self, index: usize) -> Result<&UnitDescriptor, SliceError> {
        self.units.get(index).ok_or(SliceError::UnitNotFound {
            unit: index,
            count: self.units.len(),
        })
    }

    /// Drop the reader and keep the unit table.
    pub fn into_units(self) -> Vec<UnitDescriptor> {
        self.units
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Read `len` bytes at `offset` relative to the start of a unit's data.
    ///
    /// The range is checked against the declared data length first, then
    /// against the bytes actually present in storage.
    pub async fn read_range(&self, unit: usize, offset: u64, len: u64) -> Result<Bytes, SliceError> {
        let descriptor = self.unit(unit)?;
        if !descriptor.has_array() {
            return Err(SliceError::NoData { unit });
        }

        let extent_error = |available: u64| SliceError::ExtentExceeded {
            unit,
            offset,
            requested: len,
            available,
        };

        match offset.checked_add(len) {
            Some(end) if end <= descriptor.data_len => {}
            _ => return Err(extent_error(descriptor.data_len)),
        }

        let len = usize::try_from(len).map_err(|_| extent_error(descriptor.data_len))?;
        let absolute = descriptor.data_offset + offset;

        self.reader
            .read_exact_at(absolute, len)
            .await
            .map_err(|err| match err {
                IoError::RangeOutOfBounds { size, .. } => {
                    extent_error(size.saturating_sub(descriptor.data_offset))
                }
                other => other.into(),
            })
    }
}

/// Read header blocks from `offset` until the `END` card.
///
/// Returns the header and the number of bytes it occupies (a multiple of
/// the block size).
async fn read_header<R: RangeReader>(
    reader: &R,
    hdu: usize,
    offset: u64,
) -> Result<(Header, u64), FormatError> {
    let size = reader.size();
    let mut cards = Vec::new();
    let mut pos = offset;

    loop {
        if pos + BLOCK_SIZE as u64 > size {
            return Err(FormatError::TruncatedHeader { hdu, offset: pos });
        }

        let block = reader.read_exact_at(pos, BLOCK_SIZE).await?;
        pos += BLOCK_SIZE as u64;

        for chunk in block.chunks_exact(CARD_SIZE) {
            let card = Card::parse(chunk);
            let is_end = card.is_end();
            cards.push(card);
            if is_end {
                return Ok((Header::new(cards), pos - offset));
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
