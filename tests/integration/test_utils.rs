//! Test utilities for integration tests.
//!
//! FITS fixtures are assembled in memory by [`FitsBuilder`] and served by
//! [`MockFileSource`], which counts how often each file is opened and which
//! byte ranges are read.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fits_streamer::error::IoError;
use fits_streamer::io::{MemoryRangeReader, RangeReader};
use fits_streamer::source::FileSource;

const BLOCK: usize = 2880;
const CARD: usize = 80;

// =============================================================================
// FITS Builder
// =============================================================================

/// Header card value.
pub enum CardValue {
    Int(i64),
    Str(&'static str),
    Bool(bool),
}

fn card(keyword: &str, value: &CardValue) -> String {
    let value = match value {
        CardValue::Int(v) => format!("{:>20}", v),
        CardValue::Str(s) => format!("'{:<8}'", s.replace('\'', "''")),
        CardValue::Bool(b) => format!("{:>20}", if *b { "T" } else { "F" }),
    };
    format!("{:<8}= {}", keyword, value)
}

fn push_card(out: &mut Vec<u8>, text: &str) {
    let mut line = text.as_bytes().to_vec();
    line.resize(CARD, b' ');
    out.extend_from_slice(&line);
}

fn pad(out: &mut Vec<u8>, fill: u8) {
    let rem = out.len() % BLOCK;
    if rem != 0 {
        out.resize(out.len() + BLOCK - rem, fill);
    }
}

/// Assembles a FITS file one unit at a time.
///
/// Shapes are given outermost axis first, as the server reports them; the
/// builder writes them as `NAXIS1` = last entry. Data must already be in
/// file order (big-endian).
#[derive(Default)]
pub struct FitsBuilder {
    bytes: Vec<u8>,
    units: usize,
}

impl FitsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary unit with no data.
    pub fn empty_primary(self) -> Self {
        self.unit(None, 8, &[], &[], &[])
    }

    pub fn primary(self, bitpix: i64, shape: &[u64], data: &[u8]) -> Self {
        self.unit(None, bitpix, shape, data, &[])
    }

    pub fn image(self, name: &'static str, bitpix: i64, shape: &[u64], data: &[u8]) -> Self {
        self.unit(Some(name), bitpix, shape, data, &[])
    }

    /// Image extension with extra header cards (e.g. BZERO).
    pub fn image_with_cards(
        self,
        name: &'static str,
        bitpix: i64,
        shape: &[u64],
        data: &[u8],
        extra: &[(&str, CardValue)],
    ) -> Self {
        self.unit(Some(name), bitpix, shape, data, extra)
    }

    fn unit(
        mut self,
        name: Option<&'static str>,
        bitpix: i64,
        shape: &[u64],
        data: &[u8],
        extra: &[(&str, CardValue)],
    ) -> Self {
        let out = &mut self.bytes;
        if self.units == 0 {
            push_card(out, &card("SIMPLE", &CardValue::Bool(true)));
        } else {
            push_card(out, &card("XTENSION", &CardValue::Str("IMAGE")));
        }
        push_card(out, &card("BITPIX", &CardValue::Int(bitpix)));
        push_card(out, &card("NAXIS", &CardValue::Int(shape.len() as i64)));
        for (i, size) in shape.iter().rev().enumerate() {
            push_card(out, &card(&format!("NAXIS{}", i + 1), &CardValue::Int(*size as i64)));
        }
        if self.units > 0 {
            push_card(out, &card("PCOUNT", &CardValue::Int(0)));
            push_card(out, &card("GCOUNT", &CardValue::Int(1)));
        }
        if let Some(name) = name {
            push_card(out, &card("EXTNAME", &CardValue::Str(name)));
        }
        for (keyword, value) in extra {
            push_card(out, &card(keyword, value));
        }
        push_card(out, "END");
        pad(out, b' ');

        out.extend_from_slice(data);
        pad(out, 0);

        self.units += 1;
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Big-endian f32 data.
pub fn f32_be(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
    values.into_iter().flat_map(f32::to_be_bytes).collect()
}

pub fn i16_be(values: impl IntoIterator<Item = i16>) -> Vec<u8> {
    values.into_iter().flat_map(i16::to_be_bytes).collect()
}

pub fn f64_be(values: impl IntoIterator<Item = f64>) -> Vec<u8> {
    values.into_iter().flat_map(f64::to_be_bytes).collect()
}

/// Decode little-endian f32 response bytes.
pub fn f32_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// A `[2, 50, 50]` f32 cube in an image extension named `SCI`, after an
/// empty primary. Element `(p, y, x)` holds `p * 10000 + y * 100 + x`.
pub fn cube_fits() -> Vec<u8> {
    let values = (0..2u32).flat_map(|p| {
        (0..50u32).flat_map(move |y| (0..50u32).map(move |x| (p * 10000 + y * 100 + x) as f32))
    });
    FitsBuilder::new()
        .empty_primary()
        .image("SCI", -32, &[2, 50, 50], &f32_be(values))
        .build()
}

/// Value stored at `(p, y, x)` of [`cube_fits`].
pub fn cube_value(p: u32, y: u32, x: u32) -> f32 {
    (p * 10000 + y * 100 + x) as f32
}

// =============================================================================
// Mock File Source
// =============================================================================

/// Range reader that records every read.
#[derive(Clone)]
pub struct TrackingReader {
    inner: MemoryRangeReader,
    reads: Arc<Mutex<Vec<(u64, usize)>>>,
}

#[async_trait]
impl RangeReader for TrackingReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.reads.lock().unwrap().push((offset, len));
        self.inner.read_exact_at(offset, len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

/// A file source backed by in-memory files.
#[derive(Clone, Default)]
pub struct MockFileSource {
    files: HashMap<String, Bytes>,
    opens: Arc<AtomicUsize>,
    reads: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl MockFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.files.insert(path.into(), Bytes::from(data));
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Every `(offset, len)` read across all opened readers.
    pub fn reads(&self) -> Vec<(u64, usize)> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSource for MockFileSource {
    type Reader = TrackingReader;

    async fn open(&self, path: &str) -> Result<Self::Reader, IoError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.files.get(path) {
            Some(data) => Ok(TrackingReader {
                inner: MemoryRangeReader::new(data.clone(), format!("mock://{}", path)),
                reads: Arc::clone(&self.reads),
            }),
            None => Err(IoError::NotFound(path.to_string())),
        }
    }
}
