//! FITS container support.
//!
//! This module reads just enough of a FITS file to serve slices:
//!
//! - [`header`]: 80-column card parsing
//! - [`hdu`]: unit descriptors (kind, shape, element type, data extent)
//! - [`file`]: the HDU walker and the per-unit range accessor

pub mod file;
pub mod hdu;
pub mod header;

pub use file::FitsFile;
pub use hdu::{UnitDescriptor, UnitKind};
pub use header::{Card, Header, Value, BLOCK_SIZE, CARD_SIZE};
