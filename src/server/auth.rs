//! Signed URL authentication.
//!
//! Requests to the data endpoints may be required to carry an HMAC-SHA256
//! signature over their path and query:
//!
//! ```text
//! message   = "{path}?{k1=v1&k2=v2&...}"   all parameters except sig, sorted, exp included
//! signature = hex(HMAC-SHA256(secret, message))
//!
//! /fitsview/slice?path=cube.fits&hdu=0&slices=0:1,0:50,0:50&exp=1767225600&sig=9f2c...
//! ```
//!
//! Parameters are compared in decoded form, so a client may percent-encode
//! however it likes. Signatures are compared in constant time.
//!
//! # Example
//!
//! ```rust
//! use fits_streamer::server::auth::UrlSigner;
//! use std::time::Duration;
//!
//! let signer = UrlSigner::new("my-secret-key");
//! let query = signer.signed_query(
//!     "/fitsview/metadata",
//!     &[("path", "cube.fits")],
//!     Duration::from_secs(3600),
//! );
//! assert!(signer.verify("/fitsview/metadata", &query).is_ok());
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::handlers::ErrorResponse;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the signature.
pub const SIGNATURE_PARAM: &str = "sig";

/// Query parameter carrying the expiry (Unix seconds).
pub const EXPIRY_PARAM: &str = "exp";

// =============================================================================
// Errors
// =============================================================================

/// Reasons a request fails signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing signature parameter")]
    MissingSignature,

    #[error("Missing expiry parameter")]
    MissingExpiry,

    #[error("Signature expired at {expired_at} (current time: {now})")]
    Expired { expired_at: u64, now: u64 },

    #[error("Invalid signature")]
    InvalidSignature,

    /// Not hex, or given more than once
    #[error("Malformed signature parameter")]
    MalformedSignature,

    /// Not an integer, or given more than once
    #[error("Malformed expiry parameter")]
    MalformedExpiry,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::MalformedSignature | AuthError::MalformedExpiry => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingSignature => "missing_signature",
            AuthError::MissingExpiry => "missing_expiry",
            AuthError::Expired { .. } => "signature_expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::MalformedSignature => "invalid_signature_format",
            AuthError::MalformedExpiry => "invalid_expiry_format",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.to_string();

        // A wrong signature may be probing; the rest is routine
        if self == AuthError::InvalidSignature {
            warn!(error_type = kind, status = status.as_u16(), "Authentication failed: {}", message);
        } else {
            debug!(error_type = kind, status = status.as_u16(), "Authentication failed: {}", message);
        }

        (status, Json(ErrorResponse::with_status(kind, message, status))).into_response()
    }
}

// =============================================================================
// UrlSigner
// =============================================================================

/// Signs and verifies request URLs with a shared secret.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mac =
            HmacSha256::new_from_slice(secret.as_ref()).expect("HMAC can take key of any size");
        Self { mac }
    }

    /// Hex signature of `path` with `params` (excluding `sig` and `exp`)
    /// and `expiry`.
    pub fn signature(&self, path: &str, params: &[(&str, &str)], expiry: u64) -> String {
        let expiry = expiry.to_string();
        let mut pairs: Vec<(&str, &str)> = params
            .iter()
            .copied()
            .filter(|(key, _)| *key != SIGNATURE_PARAM && *key != EXPIRY_PARAM)
            .collect();
        pairs.push((EXPIRY_PARAM, &expiry));

        let mut mac = self.mac.clone();
        mac.update(message(path, &mut pairs).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Complete query string (`params`, `exp`, `sig`) valid for `ttl`.
    pub fn signed_query(&self, path: &str, params: &[(&str, &str)], ttl: Duration) -> String {
        let expiry = unix_now() + ttl.as_secs();
        self.signed_query_with_expiry(path, params, expiry)
    }

    /// Complete query string with an explicit expiry.
    pub fn signed_query_with_expiry(
        &self,
        path: &str,
        params: &[(&str, &str)],
        expiry: u64,
    ) -> String {
        let signature = self.signature(path, params, expiry);

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, value);
        }
        serializer.append_pair(EXPIRY_PARAM, &expiry.to_string());
        serializer.append_pair(SIGNATURE_PARAM, &signature);
        serializer.finish()
    }

    /// Full signed URL: `{base_url}{path}?{query}`.
    pub fn signed_url(
        &self,
        base_url: &str,
        path: &str,
        params: &[(&str, &str)],
        ttl: Duration,
    ) -> String {
        format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            path,
            self.signed_query(path, params, ttl)
        )
    }

    /// Verify the raw query string of a request to `path`.
    pub fn verify(&self, path: &str, query: &str) -> Result<(), AuthError> {
        self.verify_at(path, query, unix_now())
    }

    /// Verify as of `now` (Unix seconds).
    pub fn verify_at(&self, path: &str, query: &str, now: u64) -> Result<(), AuthError> {
        let mut signature: Option<String> = None;
        let mut expiry: Option<u64> = None;
        let mut params: Vec<(String, String)> = Vec::new();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                SIGNATURE_PARAM => {
                    if signature.replace(value.into_owned()).is_some() {
                        return Err(AuthError::MalformedSignature);
                    }
                }
                EXPIRY_PARAM => {
                    let parsed = value.parse::<u64>().map_err(|_| AuthError::MalformedExpiry)?;
                    if expiry.replace(parsed).is_some() {
                        return Err(AuthError::MalformedExpiry);
                    }
                }
                _ => params.push((key.into_owned(), value.into_owned())),
            }
        }

        let signature = signature.ok_or(AuthError::MissingSignature)?;
        let expiry = expiry.ok_or(AuthError::MissingExpiry)?;

        if now > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                now,
            });
        }

        let provided = hex::decode(&signature).map_err(|_| AuthError::MalformedSignature)?;

        let borrowed: Vec<(&str, &str)> = params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        let expected = hex::decode(self.signature(path, &borrowed, expiry))
            .map_err(|_| AuthError::MalformedSignature)?;

        if provided.ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }
}

fn message(path: &str, pairs: &mut [(&str, &str)]) -> String {
    pairs.sort();
    let query = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, query)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Middleware
// =============================================================================

/// Reject requests whose URL is not signed with the server's secret.
///
/// ```ignore
/// let protected = Router::new()
///     .route("/fitsview/slice", get(slice_handler))
///     .layer(middleware::from_fn_with_state(signer, require_signature));
/// ```
pub async fn require_signature(
    State(signer): State<UrlSigner>,
    OriginalUri(uri): OriginalUri,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    signer.verify(uri.path(), uri.query().unwrap_or(""))?;
    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
