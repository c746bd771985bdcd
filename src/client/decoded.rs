//! Received slices and their typed views.

use bytes::Bytes;

use crate::codec::{expected_byte_len, ElementType, TypedArray};
use crate::error::TransferError;

/// Width and height of the trailing two axes of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneDims {
    pub width: u64,
    pub height: u64,
}

/// A received slice: shape, type tag and little-endian element bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSlice {
    pub shape: Vec<u64>,
    pub element_type: ElementType,
    pub bytes: Bytes,
}

impl DecodedSlice {
    /// Check that `bytes` holds exactly `product(shape)` elements.
    pub fn new(
        shape: Vec<u64>,
        element_type: ElementType,
        bytes: Bytes,
    ) -> Result<Self, TransferError> {
        let expected = expected_byte_len(&shape, element_type).ok_or_else(|| {
            TransferError::Protocol(format!("shape {:?} overflows", shape))
        })?;
        let actual = bytes.len() as u64;
        if actual != expected {
            return Err(TransferError::Integrity { expected, actual });
        }

        Ok(Self {
            shape,
            element_type,
            bytes,
        })
    }

    /// Element values; `None` only if the fields were assembled by hand with
    /// a partial trailing element.
    pub fn values(&self) -> Option<TypedArray> {
        TypedArray::decode(self.element_type, &self.bytes)
    }

    /// Last shape entry is the width, the one before it the height.
    pub fn plane_dims(&self) -> Option<PlaneDims> {
        match self.shape.as_slice() {
            [.., height, width] => Some(PlaneDims {
                width: *width,
                height: *height,
            }),
            _ => None,
        }
    }

    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }
}
