//! Element types and byte-order conversion.
//!
//! Every element type the system can serve is listed once in [`ELEMENT_TYPES`].
//! The wire tag, the byte width and the decoding strategy are all derived from
//! that table, so the server's encoder and the client's decoder cannot drift
//! apart.
//!
//! ```text
//! tag   width  kind
//! i8    1      signed
//! u8    1      unsigned
//! i16   2      signed
//! u16   2      unsigned
//! i32   4      signed
//! u32   4      unsigned
//! i64   8      signed
//! u64   8      unsigned
//! f32   4      float
//! f64   8      float
//! ```

use bytes::Bytes;

// =============================================================================
// Element Types
// =============================================================================

/// Numeric family of an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Signed,
    Unsigned,
    Float,
}

/// The closed set of element types carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

/// One row of the element type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec {
    pub element_type: ElementType,
    pub tag: &'static str,
    pub width: usize,
    pub kind: NumericKind,
}

/// The single source of truth for tags and widths.
///
/// Rows are ordered by `ElementType` discriminant.
pub static ELEMENT_TYPES: [TypeSpec; 10] = [
    TypeSpec { element_type: ElementType::I8, tag: "i8", width: 1, kind: NumericKind::Signed },
    TypeSpec { element_type: ElementType::U8, tag: "u8", width: 1, kind: NumericKind::Unsigned },
    TypeSpec { element_type: ElementType::I16, tag: "i16", width: 2, kind: NumericKind::Signed },
    TypeSpec { element_type: ElementType::U16, tag: "u16", width: 2, kind: NumericKind::Unsigned },
    TypeSpec { element_type: ElementType::I32, tag: "i32", width: 4, kind: NumericKind::Signed },
    TypeSpec { element_type: ElementType::U32, tag: "u32", width: 4, kind: NumericKind::Unsigned },
    TypeSpec { element_type: ElementType::I64, tag: "i64", width: 8, kind: NumericKind::Signed },
    TypeSpec { element_type: ElementType::U64, tag: "u64", width: 8, kind: NumericKind::Unsigned },
    TypeSpec { element_type: ElementType::F32, tag: "f32", width: 4, kind: NumericKind::Float },
    TypeSpec { element_type: ElementType::F64, tag: "f64", width: 8, kind: NumericKind::Float },
];

impl ElementType {
    /// The table row describing this type.
    pub fn spec(self) -> &'static TypeSpec {
        &ELEMENT_TYPES[self as usize]
    }

    /// Short symbolic wire tag, e.g. `"f32"`.
    pub fn tag(self) -> &'static str {
        self.spec().tag
    }

    /// Number of bytes encoding one element.
    pub fn width(self) -> usize {
        self.spec().width
    }

    pub fn kind(self) -> NumericKind {
        self.spec().kind
    }

    /// Look up a type by its wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        ELEMENT_TYPES
            .iter()
            .find(|spec| spec.tag == tag)
            .map(|spec| spec.element_type)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::from_tag(s).ok_or_else(|| format!("unknown element type tag '{}'", s))
    }
}

// =============================================================================
// Byte Order
// =============================================================================

/// Byte order of elements as stored at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// How stored elements must be transformed to become canonical wire elements.
///
/// `offset_binary` marks the FITS unsigned convention: values are stored as
/// signed integers biased by `2^(bits-1)`. Flipping the sign bit recovers the
/// unsigned (or, for 8-bit data, signed) value exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEncoding {
    pub byte_order: ByteOrder,
    pub offset_binary: bool,
}

impl SourceEncoding {
    /// Plain big-endian storage, the FITS default.
    pub const BIG_ENDIAN: SourceEncoding = SourceEncoding {
        byte_order: ByteOrder::BigEndian,
        offset_binary: false,
    };

    /// Already canonical; encoding is a no-op.
    pub const LITTLE_ENDIAN: SourceEncoding = SourceEncoding {
        byte_order: ByteOrder::LittleEndian,
        offset_binary: false,
    };
}

/// Convert a buffer of stored elements to canonical little-endian, in place.
///
/// Values are never scaled or clipped. The buffer length must be a multiple
/// of the element width; a trailing partial element is left untouched.
pub fn encode_in_place(buf: &mut [u8], element_type: ElementType, source: SourceEncoding) {
    let width = element_type.width();

    if source.byte_order == ByteOrder::BigEndian && width > 1 {
        for element in buf.chunks_exact_mut(width) {
            element.reverse();
        }
    }

    if source.offset_binary {
        // After the swap the most significant byte is last.
        for element in buf.chunks_exact_mut(width) {
            element[width - 1] ^= 0x80;
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decoded element values, one variant per wire tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! decode_le {
    ($bytes:expr, $ty:ty, $width:expr) => {
        $bytes
            .chunks_exact($width)
            .map(|chunk| {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(chunk);
                <$ty>::from_le_bytes(raw)
            })
            .collect()
    };
}

impl TypedArray {
    /// Interpret little-endian bytes as elements of `element_type`.
    ///
    /// Returns `None` when the byte count is not a whole number of elements.
    pub fn decode(element_type: ElementType, bytes: &[u8]) -> Option<Self> {
        if bytes.len() % element_type.width() != 0 {
            return None;
        }

        let array = match element_type {
            ElementType::I8 => TypedArray::I8(bytes.iter().map(|b| *b as i8).collect()),
            ElementType::U8 => TypedArray::U8(bytes.to_vec()),
            ElementType::I16 => TypedArray::I16(decode_le!(bytes, i16, 2)),
            ElementType::U16 => TypedArray::U16(decode_le!(bytes, u16, 2)),
            ElementType::I32 => TypedArray::I32(decode_le!(bytes, i32, 4)),
            ElementType::U32 => TypedArray::U32(decode_le!(bytes, u32, 4)),
            ElementType::I64 => TypedArray::I64(decode_le!(bytes, i64, 8)),
            ElementType::U64 => TypedArray::U64(decode_le!(bytes, u64, 8)),
            ElementType::F32 => TypedArray::F32(decode_le!(bytes, f32, 4)),
            ElementType::F64 => TypedArray::F64(decode_le!(bytes, f64, 8)),
        };
        Some(array)
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TypedArray::I8(_) => ElementType::I8,
            TypedArray::U8(_) => ElementType::U8,
            TypedArray::I16(_) => ElementType::I16,
            TypedArray::U16(_) => ElementType::U16,
            TypedArray::I32(_) => ElementType::I32,
            TypedArray::U32(_) => ElementType::U32,
            TypedArray::I64(_) => ElementType::I64,
            TypedArray::U64(_) => ElementType::U64,
            TypedArray::F32(_) => ElementType::F32,
            TypedArray::F64(_) => ElementType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedArray::I8(v) => v.len(),
            TypedArray::U8(v) => v.len(),
            TypedArray::I16(v) => v.len(),
            TypedArray::U16(v) => v.len(),
            TypedArray::I32(v) => v.len(),
            TypedArray::U32(v) => v.len(),
            TypedArray::I64(v) => v.len(),
            TypedArray::U64(v) => v.len(),
            TypedArray::F32(v) => v.len(),
            TypedArray::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-encode as little-endian bytes.
    pub fn to_le_bytes(&self) -> Bytes {
        fn collect<T: Copy, const N: usize>(values: &[T], f: impl Fn(T) -> [u8; N]) -> Bytes {
            let mut out = Vec::with_capacity(values.len() * N);
            for v in values {
                out.extend_from_slice(&f(*v));
            }
            Bytes::from(out)
        }

        match self {
            TypedArray::I8(v) => collect(v, i8::to_le_bytes),
            TypedArray::U8(v) => Bytes::from(v.clone()),
            TypedArray::I16(v) => collect(v, i16::to_le_bytes),
            TypedArray::U16(v) => collect(v, u16::to_le_bytes),
            TypedArray::I32(v) => collect(v, i32::to_le_bytes),
            TypedArray::U32(v) => collect(v, u32::to_le_bytes),
            TypedArray::I64(v) => collect(v, i64::to_le_bytes),
            TypedArray::U64(v) => collect(v, u64::to_le_bytes),
            TypedArray::F32(v) => collect(v, f32::to_le_bytes),
            TypedArray::F64(v) => collect(v, f64::to_le_bytes),
        }
    }
}

/// Expected body length for a result of `shape` elements of `element_type`.
///
/// Returns `None` on overflow.
pub fn expected_byte_len(shape: &[u64], element_type: ElementType) -> Option<u64> {
    shape
        .iter()
        .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))?
        .checked_mul(element_type.width() as u64)
}

// =============================================================================
// Tests
// =============================================================================
