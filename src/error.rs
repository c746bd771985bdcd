use thiserror::Error;

/// I/O errors that can occur when reading from local or remote storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Error from the local filesystem
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Errors raised while walking the header/data structure of a FITS file
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The file does not start with a `SIMPLE` card
    #[error("Not a FITS file: {reason}")]
    NotFits { reason: String },

    /// The header of an HDU runs past the end of the file without an `END` card
    #[error("Truncated header in HDU {hdu} (no END card before offset {offset})")]
    TruncatedHeader { hdu: usize, offset: u64 },

    /// A mandatory keyword is absent
    #[error("HDU {hdu} is missing required keyword {keyword}")]
    MissingKeyword { hdu: usize, keyword: String },

    /// A keyword is present but its value is unusable
    #[error("HDU {hdu} has invalid {keyword}: {message}")]
    InvalidKeyword {
        hdu: usize,
        keyword: String,
        message: String,
    },

    /// BITPIX value outside the values defined by the standard
    #[error("HDU {hdu} has unsupported BITPIX {bitpix}")]
    UnsupportedBitpix { hdu: usize, bitpix: i64 },
}

/// Which end of a `start:stop` range a validation message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    Stop,
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Start => write!(f, "start"),
            Bound::Stop => write!(f, "stop"),
        }
    }
}

/// Malformed request parameters. Always a client error, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required request parameter was not supplied
    #[error("Missing required parameter '{0}'")]
    MissingParameter(&'static str),

    /// A segment is not of the form `start:stop`
    #[error("Invalid slice format on axis {axis}: '{segment}'. Expected 'start:stop'")]
    MalformedSegment { axis: usize, segment: String },

    /// A bound is not a non-negative integer
    #[error("Invalid {bound} on axis {axis}: '{value}' is not a non-negative integer")]
    InvalidBound {
        axis: usize,
        bound: Bound,
        value: String,
    },

    /// `start` is greater than `stop`
    #[error("Invalid range on axis {axis}: start {start} is greater than stop {stop}")]
    StartAfterStop { axis: usize, start: u64, stop: u64 },

    /// The descriptor does not have one segment per axis
    #[error(
        "Number of slice dimensions ({actual}) does not match data dimensions ({expected}). Data shape: {shape:?}"
    )]
    AxisCountMismatch {
        expected: usize,
        actual: usize,
        shape: Vec<u64>,
    },

    /// The unit index parameter is not a non-negative integer
    #[error("Invalid HDU index: '{0}'")]
    InvalidUnitIndex(String),
}

/// Errors produced while serving a slice or metadata request.
#[derive(Debug, Clone, Error)]
pub enum SliceError {
    /// Malformed slice specification or request parameters
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The requested range exceeds the declared extent of an axis
    #[error(
        "Slice [{start}:{stop}] on axis {axis} out of bounds for dimension size {size}. Data shape: {shape:?}"
    )]
    OutOfBounds {
        axis: usize,
        start: u64,
        stop: u64,
        size: u64,
        shape: Vec<u64>,
    },

    /// The read plan exceeds the bytes actually stored for the unit
    #[error(
        "Read of {requested} bytes at offset {offset} is out of bounds for HDU {unit} ({available} bytes stored)"
    )]
    ExtentExceeded {
        unit: usize,
        offset: u64,
        requested: u64,
        available: u64,
    },

    /// The file does not exist
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// The unit index does not exist in the file
    #[error("HDU index {unit} out of range (file has {count} HDUs)")]
    UnitNotFound { unit: usize, count: usize },

    /// The unit exists but carries no array payload
    #[error("HDU {unit} has no data")]
    NoData { unit: usize },

    /// The file could not be interpreted as FITS
    #[error("{0}")]
    Format(FormatError),

    /// Anything unexpected
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SliceError {
    /// Machine-readable error kind used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SliceError::Validation(_) => "invalid_slice",
            SliceError::OutOfBounds { .. } | SliceError::ExtentExceeded { .. } => "out_of_bounds",
            SliceError::FileNotFound { .. } => "not_found",
            SliceError::UnitNotFound { .. } => "unit_not_found",
            SliceError::NoData { .. } => "no_data",
            SliceError::Format(_) => "unsupported_format",
            SliceError::Internal(_) => "internal_error",
        }
    }

    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SliceError::Internal(_))
    }
}

impl From<FormatError> for SliceError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::Io(io_err) => io_err.into(),
            other => SliceError::Format(other),
        }
    }
}

impl From<IoError> for SliceError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotFound(path) => SliceError::FileNotFound { path },
            other => SliceError::Internal(other.to_string()),
        }
    }
}

/// Client-side transfer outcomes other than a completed slice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The transfer was cancelled by the caller. Not a failure.
    #[error("Transfer aborted")]
    Aborted,

    /// Body length disagrees with the length implied by shape and type
    #[error("Integrity error: expected {expected} bytes, received {actual}")]
    Integrity { expected: u64, actual: u64 },

    /// The server answered with a structured error
    #[error("Server returned {status} ({kind}): {message}")]
    Server {
        status: u16,
        kind: String,
        message: String,
    },

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response metadata is missing or unreadable
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransferError {
    /// True for the cancellation outcome, which callers treat as a return to
    /// the pre-fetch state rather than a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransferError::Aborted)
    }

    /// True when the server blamed the request (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, TransferError::Server { status, .. } if (400..500).contains(status))
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::Http(err.to_string())
    }
}

/// Misuse of the slice navigation state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// An action that needs a selected unit was issued with none selected
    #[error("No unit is selected")]
    NoUnitSelected,

    /// The unit index is not part of the document
    #[error("Unknown unit {0}")]
    UnknownUnit(usize),

    /// The unit cannot be shown as a plane
    #[error("Unit {unit} cannot be displayed: {reason}")]
    NotViewable { unit: usize, reason: String },

    /// The axis is not a leading (navigable) axis of the unit
    #[error("Axis {axis} is not a navigable axis (unit has {leading} leading axes)")]
    InvalidAxis { axis: usize, leading: usize },
}
