//! FITS header card parsing.
//!
//! # Header Structure
//!
//! ```text
//! ┌──────────────────────────────── 2880-byte block ───────────────────────────────┐
//! │ card 0   SIMPLE  =                    T / conforms to FITS standard            │
//! │ card 1   BITPIX  =                  -32                                        │
//! │ ...      (36 cards of 80 ASCII characters per block)                           │
//! │ card n   END                                                                   │
//! │          (blank padding to the end of the block)                               │
//! └────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A card is `KEYWORD` (columns 1-8), an optional value indicator `= `
//! (columns 9-10), and a value field optionally followed by `/ comment`.

use crate::error::FormatError;

// =============================================================================
// Constants
// =============================================================================

/// Size of a FITS logical record in bytes.
pub const BLOCK_SIZE: usize = 2880;

/// Size of a header card in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards in one header block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Round `len` up to the next multiple of the block size.
pub fn padded_len(len: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    len.div_ceil(block) * block
}

// =============================================================================
// Values
// =============================================================================

/// A parsed card value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Logical(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Value indicator present but the field is blank or unparsable
    Undefined,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

/// One 80-column header card.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<Value>,
    /// The raw card text, right-trimmed
    pub raw: String,
}

impl Card {
    /// Parse a single card. Non-ASCII bytes are replaced, never rejected.
    pub fn parse(bytes: &[u8]) -> Card {
        let text = String::from_utf8_lossy(bytes);
        let text = text.as_ref();

        let keyword = text.get(..8).unwrap_or(text).trim_end().to_string();
        let has_value = text.get(8..10) == Some("= ");

        let value = if has_value {
            Some(parse_value(text.get(10..).unwrap_or("")))
        } else {
            None
        };

        Card {
            keyword,
            value,
            raw: text.trim_end().to_string(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.keyword == "END"
    }
}

fn parse_value(field: &str) -> Value {
    let field = field.trim_start();

    if let Some(rest) = field.strip_prefix('\'') {
        return Value::String(parse_string(rest));
    }

    let token = field.split('/').next().unwrap_or("").trim();
    if token.is_empty() {
        return Value::Undefined;
    }

    match token {
        "T" => return Value::Logical(true),
        "F" => return Value::Logical(false),
        _ => {}
    }

    if let Ok(v) = token.parse::<i64>() {
        return Value::Integer(v);
    }

    // Fortran-style exponents use D
    let normalized = token.replace(['D', 'd'], "E");
    match normalized.parse::<f64>() {
        Ok(v) => Value::Float(v),
        Err(_) => Value::Undefined,
    }
}

/// Parse a quoted string body; `''` is an escaped quote. Trailing blanks are
/// not significant.
fn parse_string(body: &str) -> String {
    let mut out = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                out.push('\'');
                chars.next();
            } else {
                break;
            }
        } else {
            out.push(c);
        }
    }

    out.trim_end().to_string()
}

// =============================================================================
// Header
// =============================================================================

/// An ordered collection of header cards up to (and including) `END`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    /// Parse cards from whole header blocks.
    ///
    /// Returns the header and whether an `END` card was seen.
    pub fn parse_blocks(bytes: &[u8]) -> (Header, bool) {
        let mut cards = Vec::new();
        for chunk in bytes.chunks_exact(CARD_SIZE) {
            let card = Card::parse(chunk);
            let is_end = card.is_end();
            cards.push(card);
            if is_end {
                return (Header { cards }, true);
            }
        }
        (Header { cards }, false)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// First value for `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.cards
            .iter()
            .find(|card| card.keyword == keyword)
            .and_then(|card| card.value.as_ref())
    }

    pub fn first_keyword(&self) -> Option<&str> {
        self.cards.first().map(|card| card.keyword.as_str())
    }

    /// Required integer keyword.
    pub fn require_int(&self, hdu: usize, keyword: &str) -> Result<i64, FormatError> {
        match self.get(keyword) {
            None => Err(FormatError::MissingKeyword {
                hdu,
                keyword: keyword.to_string(),
            }),
            Some(value) => value.as_i64().ok_or_else(|| FormatError::InvalidKeyword {
                hdu,
                keyword: keyword.to_string(),
                message: format!("expected an integer, got {:?}", value),
            }),
        }
    }

    /// Optional integer keyword with a default.
    pub fn int_or(&self, hdu: usize, keyword: &str, default: i64) -> Result<i64, FormatError> {
        match self.get(keyword) {
            None => Ok(default),
            Some(_) => self.require_int(hdu, keyword),
        }
    }

    pub fn float(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(Value::as_f64)
    }

    pub fn string(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(Value::as_str)
    }

    /// The header as raw 80-column cards joined by newlines.
    pub fn text(&self) -> String {
        self.cards
            .iter()
            .map(|card| card.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Tests
// =============================================================================
