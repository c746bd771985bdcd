//! HTTP request handlers for the slice API.
//!
//! # Endpoints
//!
//! - `GET /fitsview/metadata?path=&hdu=` - Describe the units of a file
//! - `GET /fitsview/slice?path=&hdu=&slices=` - Raw little-endian slice bytes
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{SliceError, ValidationError};
use crate::fits::UnitDescriptor;
use crate::slice::{FileDescription, SliceRequest, SliceService};
use crate::source::FileSource;

/// Response header carrying the result shape as a JSON array.
pub const SHAPE_HEADER: &str = "x-fits-shape";

/// Response header carrying the element type tag.
pub const TYPE_HEADER: &str = "x-fits-type";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers.
pub struct AppState<S: FileSource> {
    pub slice_service: Arc<SliceService<S>>,
}

impl<S: FileSource> AppState<S> {
    pub fn new(slice_service: SliceService<S>) -> Self {
        Self {
            slice_service: Arc::new(slice_service),
        }
    }
}

impl<S: FileSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            slice_service: Arc::clone(&self.slice_service),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for metadata requests.
///
/// Everything is taken as text so that a bad value produces this API's own
/// error body rather than the framework's rejection.
#[derive(Debug, Default, Deserialize)]
pub struct MetadataQueryParams {
    #[serde(default)]
    pub path: Option<String>,

    /// Unit index; all units when absent
    #[serde(default)]
    pub hdu: Option<String>,

    /// Signature for authentication (handled by auth middleware)
    #[serde(default)]
    pub sig: Option<String>,

    /// Expiry timestamp for authentication (handled by auth middleware)
    #[serde(default)]
    pub exp: Option<String>,
}

/// Query parameters for slice requests.
#[derive(Debug, Default, Deserialize)]
pub struct SliceQueryParams {
    #[serde(default)]
    pub path: Option<String>,

    /// Unit index, default 0
    #[serde(default)]
    pub hdu: Option<String>,

    /// `start:stop,...`, one segment per axis
    #[serde(default)]
    pub slices: Option<String>,

    #[serde(default)]
    pub sig: Option<String>,

    #[serde(default)]
    pub exp: Option<String>,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, SliceError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::MissingParameter(name).into()),
    }
}

fn parse_unit_index(value: Option<&str>) -> Result<Option<usize>, SliceError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ValidationError::InvalidUnitIndex(text.to_string()).into()),
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable kind (e.g. "invalid_slice", "not_found")
    pub error: String,

    /// Human-readable message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One unit in a metadata response.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnitMetadataResponse {
    pub index: usize,

    pub name: String,

    /// Unit kind, e.g. "ImageHDU"
    #[serde(rename = "type")]
    pub kind: String,

    /// Raw header cards, one per line
    pub header: String,

    /// Outermost axis first; null when the unit has no array
    pub shape: Option<Vec<u64>>,

    /// Element type tag; null when the unit has no array
    #[serde(rename = "arrayType")]
    pub array_type: Option<String>,
}

impl From<&UnitDescriptor> for UnitMetadataResponse {
    fn from(unit: &UnitDescriptor) -> Self {
        Self {
            index: unit.index,
            name: unit.name.clone(),
            kind: unit.kind.name().to_string(),
            header: unit.header_text(),
            shape: unit.shape.clone(),
            array_type: unit.element_type.map(|t| t.tag().to_string()),
        }
    }
}

/// Response from the metadata endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub path: String,

    /// Total number of units in the file
    pub n_extensions: usize,

    pub hdus: Vec<UnitMetadataResponse>,
}

impl From<FileDescription> for MetadataResponse {
    fn from(description: FileDescription) -> Self {
        Self {
            hdus: description.units.iter().map(Into::into).collect(),
            path: description.path,
            n_extensions: description.unit_count,
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// HTTP status for a slice error.
pub fn status_for(err: &SliceError) -> StatusCode {
    match err {
        SliceError::Validation(_)
        | SliceError::OutOfBounds { .. }
        | SliceError::ExtentExceeded { .. }
        | SliceError::UnitNotFound { .. }
        | SliceError::NoData { .. } => StatusCode::BAD_REQUEST,
        SliceError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        SliceError::Format(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        SliceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert SliceError to HTTP response.
///
/// Client errors are logged at WARN (404 at DEBUG); server errors at ERROR
/// with their detail, which is withheld from the response body.
impl IntoResponse for SliceError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let error_type = self.kind();

        let message = if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                self
            );
            "Internal server error".to_string()
        } else {
            let message = self.to_string();
            if status == StatusCode::NOT_FOUND {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Resource not found: {}",
                    message
                );
            } else {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Client error: {}",
                    message
                );
            }
            message
        };

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

/// Wrapper for handler errors to implement IntoResponse.
pub struct HandlerError(pub SliceError);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

impl From<SliceError> for HandlerError {
    fn from(err: SliceError) -> Self {
        HandlerError(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle metadata requests.
///
/// # Endpoint
///
/// `GET /fitsview/metadata?path={path}&hdu={index}`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "path": "obs/cube.fits",
///   "n_extensions": 2,
///   "hdus": [
///     {"index": 0, "name": "PRIMARY", "type": "PrimaryHDU", "header": "SIMPLE  = ...",
///      "shape": [2, 50, 50], "arrayType": "f32"}
///   ]
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: missing `path`, non-integer or out-of-range `hdu`
/// - `404 Not Found`: file does not exist
/// - `415 Unsupported Media Type`: not a FITS file
pub async fn metadata_handler<S: FileSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<MetadataQueryParams>,
) -> Result<Json<MetadataResponse>, HandlerError> {
    let path = required(query.path, "path")?;
    let unit = parse_unit_index(query.hdu.as_deref())?;

    let description = state.slice_service.describe(&path, unit).await?;

    Ok(Json(description.into()))
}

/// Handle slice requests.
///
/// # Endpoint
///
/// `GET /fitsview/slice?path={path}&hdu={index}&slices={spec}`
///
/// # Response
///
/// `200 OK` with the raw little-endian element bytes and headers:
///
/// - `Content-Type: application/octet-stream`
/// - `Content-Length: product(shape) * width`
/// - `X-FITS-Shape: [1,50,50]`
/// - `X-FITS-Type: f32`
///
/// # Errors
///
/// - `400 Bad Request`: malformed or missing `slices`, axis-count mismatch,
///   out-of-range bounds, unknown unit, unit without data
/// - `404 Not Found`: file does not exist
/// - `415 Unsupported Media Type`: not a FITS file
/// - `500 Internal Server Error`: storage failure
pub async fn slice_handler<S: FileSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<SliceQueryParams>,
) -> Result<Response, HandlerError> {
    let path = required(query.path, "path")?;
    let unit = parse_unit_index(query.hdu.as_deref())?.unwrap_or(0);
    let slices = required(query.slices, "slices")?;

    let request = SliceRequest::new(path, unit, slices);
    let result = state.slice_service.get_slice(&request).await?;

    let shape = serde_json::to_string(&result.shape)
        .map_err(|e| SliceError::Internal(format!("failed to encode shape: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::HeaderName::from_static(SHAPE_HEADER), shape),
            (
                header::HeaderName::from_static(TYPE_HEADER),
                result.element_type.tag().to_string(),
            ),
        ],
        Body::from(result.bytes),
    )
        .into_response())
}

/// Handle health check requests.
///
/// `GET /health` returns `{"status": "healthy", "version": "x.y.z"}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
