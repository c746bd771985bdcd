//! Header data units.
//!
//! Turns a parsed header into a [`UnitDescriptor`]: what kind of unit it is,
//! whether it carries an array payload, and where its data lives.

use crate::codec::{ByteOrder, ElementType, SourceEncoding};
use crate::error::FormatError;

use super::header::Header;

/// Largest NAXIS value allowed by the standard.
const MAX_NAXIS: i64 = 999;

// =============================================================================
// UnitKind
// =============================================================================

/// Structural kind of a unit, derived from `SIMPLE` / `XTENSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Primary,
    Image,
    BinTable,
    Table,
    /// Primary unit in the random-groups layout
    RandomGroups,
    /// An extension type this reader does not interpret
    Unknown(String),
}

impl UnitKind {
    fn from_xtension(value: &str) -> Self {
        match value.trim() {
            "IMAGE" => UnitKind::Image,
            "BINTABLE" | "A3DTABLE" => UnitKind::BinTable,
            "TABLE" => UnitKind::Table,
            other => UnitKind::Unknown(other.to_string()),
        }
    }

    /// Display name used in metadata responses.
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::Primary => "PrimaryHDU",
            UnitKind::Image => "ImageHDU",
            UnitKind::BinTable => "BinTableHDU",
            UnitKind::Table => "TableHDU",
            UnitKind::RandomGroups => "GroupsHDU",
            UnitKind::Unknown(_) => "UnknownHDU",
        }
    }

    /// Whether units of this kind can carry an N-dimensional array payload.
    pub fn is_image(&self) -> bool {
        matches!(self, UnitKind::Primary | UnitKind::Image)
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// UnitDescriptor
// =============================================================================

/// Everything known about one unit after reading its header.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    /// Zero-based position in the file
    pub index: usize,

    /// `EXTNAME`, `PRIMARY` for the first unit, or empty
    pub name: String,

    pub kind: UnitKind,

    /// Element type of the array payload; `None` when there is none
    pub element_type: Option<ElementType>,

    /// Array shape, outermost axis first; `None` when there is no payload
    pub shape: Option<Vec<u64>>,

    /// The parsed header
    pub header: Header,

    /// Absolute offset of the first data byte
    pub data_offset: u64,

    /// Declared data length in bytes, without block padding
    pub data_len: u64,

    /// How stored elements map to canonical wire elements
    pub encoding: SourceEncoding,
}

impl UnitDescriptor {
    /// Build a descriptor from the header of unit `index`.
    ///
    /// # Errors
    /// - `MissingKeyword` / `InvalidKeyword` for absent or unusable
    ///   structural keywords
    /// - `UnsupportedBitpix` for BITPIX values outside the standard set
    pub fn from_header(
        index: usize,
        header: Header,
        data_offset: u64,
    ) -> Result<Self, FormatError> {
        let kind = if index == 0 {
            UnitKind::Primary
        } else {
            let xtension = header.string("XTENSION").ok_or_else(|| FormatError::MissingKeyword {
                hdu: index,
                keyword: "XTENSION".to_string(),
            })?;
            UnitKind::from_xtension(xtension)
        };

        let bitpix = header.require_int(index, "BITPIX")?;
        let element_bytes = match bitpix {
            8 | 16 | 32 | 64 | -32 | -64 => bitpix.unsigned_abs() / 8,
            other => {
                return Err(FormatError::UnsupportedBitpix {
                    hdu: index,
                    bitpix: other,
                })
            }
        };

        let naxis = header.require_int(index, "NAXIS")?;
        if !(0..=MAX_NAXIS).contains(&naxis) {
            return Err(FormatError::InvalidKeyword {
                hdu: index,
                keyword: "NAXIS".to_string(),
                message: format!("{} is outside 0..={}", naxis, MAX_NAXIS),
            });
        }

        // NAXIS1 first, as declared in the header
        let mut axes = Vec::with_capacity(naxis as usize);
        for i in 1..=naxis {
            let keyword = format!("NAXIS{}", i);
            let value = header.require_int(index, &keyword)?;
            if value < 0 {
                return Err(FormatError::InvalidKeyword {
                    hdu: index,
                    keyword,
                    message: format!("negative axis length {}", value),
                });
            }
            axes.push(value as u64);
        }

        let is_groups = kind == UnitKind::Primary
            && axes.first() == Some(&0)
            && header.get("GROUPS").and_then(|v| v.as_bool()) == Some(true);
        let kind = if is_groups {
            UnitKind::RandomGroups
        } else {
            kind
        };

        let pcount = non_negative(&header, index, "PCOUNT", 0)?;
        let gcount = non_negative(&header, index, "GCOUNT", 1)?;

        let overflow = || FormatError::InvalidKeyword {
            hdu: index,
            keyword: "NAXIS".to_string(),
            message: "data size overflows".to_string(),
        };

        let data_len = if axes.is_empty() {
            0
        } else {
            let counted = if is_groups { &axes[1..] } else { &axes[..] };
            let elements = counted
                .iter()
                .try_fold(1u64, |acc, &n| acc.checked_mul(n))
                .ok_or_else(overflow)?;

            // One group must be addressable even when GCOUNT is 0
            elements.checked_mul(element_bytes).ok_or_else(overflow)?;

            elements
                .checked_add(pcount)
                .and_then(|n| n.checked_mul(gcount))
                .and_then(|n| n.checked_mul(element_bytes))
                .ok_or_else(overflow)?
        };

        let has_array = kind.is_image() && !axes.is_empty();
        let (element_type, encoding) = if has_array {
            let (element_type, encoding) = array_type(bitpix, &header);
            (Some(element_type), encoding)
        } else {
            (None, SourceEncoding::BIG_ENDIAN)
        };
        let shape = has_array.then(|| axes.iter().rev().copied().collect());

        let name = match header.string("EXTNAME") {
            Some(name) => name.trim().to_string(),
            None if index == 0 => "PRIMARY".to_string(),
            None => String::new(),
        };

        Ok(Self {
            index,
            name,
            kind,
            element_type,
            shape,
            header,
            data_offset,
            data_len,
            encoding,
        })
    }

    /// Whether the unit can be sliced.
    pub fn has_array(&self) -> bool {
        self.shape.is_some() && self.element_type.is_some()
    }

    /// The header blob as 80-column cards separated by newlines.
    pub fn header_text(&self) -> String {
        self.header.text()
    }
}

fn non_negative(
    header: &Header,
    hdu: usize,
    keyword: &str,
    default: i64,
) -> Result<u64, FormatError> {
    let value = header.int_or(hdu, keyword, default)?;
    u64::try_from(value).map_err(|_| FormatError::InvalidKeyword {
        hdu,
        keyword: keyword.to_string(),
        message: format!("negative value {}", value),
    })
}

/// Map BITPIX plus the integer offset convention to a wire element type.
///
/// Only `BSCALE = 1` combined with the exact sign-bit offset changes the
/// type; every other scaling is ignored and raw stored values are served.
fn array_type(bitpix: i64, header: &Header) -> (ElementType, SourceEncoding) {
    let bscale = header.float("BSCALE").unwrap_or(1.0);
    let bzero = header.float("BZERO").unwrap_or(0.0);
    let unit_scale = bscale == 1.0;

    let (element_type, offset_binary) = match bitpix {
        8 if unit_scale && bzero == -128.0 => (ElementType::I8, true),
        8 => (ElementType::U8, false),
        16 if unit_scale && bzero == 32768.0 => (ElementType::U16, true),
        16 => (ElementType::I16, false),
        32 if unit_scale && bzero == 2147483648.0 => (ElementType::U32, true),
        32 => (ElementType::I32, false),
        64 if unit_scale && bzero == 9223372036854775808.0 => (ElementType::U64, true),
        64 => (ElementType::I64, false),
        -32 => (ElementType::F32, false),
        _ => (ElementType::F64, false),
    };

    (
        element_type,
        SourceEncoding {
            byte_order: ByteOrder::BigEndian,
            offset_binary,
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
