//! Authentication integration tests.
//!
//! Tests verify:
//! - Valid signed URLs work on both data endpoints
//! - Expired signatures are rejected
//! - Invalid signatures are rejected
//! - Missing auth parameters are handled
//! - Signatures bind to path and every query parameter

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use fits_streamer::slice::SliceService;
use fits_streamer::{create_router, RouterConfig, UrlSigner};

use super::test_utils::{cube_fits, MockFileSource};

const TEST_SECRET: &str = "test-secret-key-for-hmac-signing";
const SLICE: &str = "/fitsview/slice";
const METADATA: &str = "/fitsview/metadata";

fn slice_params() -> Vec<(&'static str, &'static str)> {
    vec![("path", "cube.fits"), ("hdu", "1"), ("slices", "0:1,0:10,0:10")]
}

fn protected_router() -> Router {
    let source = MockFileSource::new().with_file("cube.fits", cube_fits());
    create_router(SliceService::new(source), RouterConfig::new(TEST_SECRET))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

async fn send(router: Router, uri: String) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// =============================================================================
// Valid Signatures
// =============================================================================

#[tokio::test]
async fn test_valid_signature_succeeds() {
    let signer = UrlSigner::new(TEST_SECRET);
    let query = signer.signed_query(SLICE, &slice_params(), Duration::from_secs(3600));

    let request = Request::builder()
        .uri(format!("{}?{}", SLICE, query))
        .body(Body::empty())
        .unwrap();
    let response = protected_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-fits-shape").unwrap(), "[1,10,10]");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), 400);
}

#[tokio::test]
async fn test_valid_signature_on_metadata() {
    let signer = UrlSigner::new(TEST_SECRET);
    let query = signer.signed_query(METADATA, &[("path", "cube.fits")], Duration::from_secs(60));

    let (status, json) = send(protected_router(), format!("{}?{}", METADATA, query)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["n_extensions"], 2);
}

#[tokio::test]
async fn test_unencoded_query_verifies() {
    // Browsers may leave ':' and ',' unescaped; verification uses decoded values
    let signer = UrlSigner::new(TEST_SECRET);
    let expiry = now() + 60;
    let signature = signer.signature(SLICE, &slice_params(), expiry);

    let uri = format!(
        "{}?path=cube.fits&hdu=1&slices=0:1,0:10,0:10&exp={}&sig={}",
        SLICE, expiry, signature
    );
    let (status, _) = send(protected_router(), uri).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Expired Signatures
// =============================================================================

#[tokio::test]
async fn test_expired_signature_rejected() {
    let signer = UrlSigner::new(TEST_SECRET);
    let expired = now() - 100;
    let query = signer.signed_query_with_expiry(SLICE, &slice_params(), expired);

    let (status, json) = send(protected_router(), format!("{}?{}", SLICE, query)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "signature_expired");
}

// =============================================================================
// Invalid Signatures
// =============================================================================

#[tokio::test]
async fn test_signature_from_different_key_rejected() {
    let signer = UrlSigner::new("some-other-secret");
    let query = signer.signed_query(SLICE, &slice_params(), Duration::from_secs(3600));

    let (status, json) = send(protected_router(), format!("{}?{}", SLICE, query)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_signature");
}

#[tokio::test]
async fn test_invalid_hex_signature_rejected() {
    let uri = format!(
        "{}?path=cube.fits&hdu=1&slices=0:1,0:10,0:10&exp={}&sig=not-hex",
        SLICE,
        now() + 60
    );
    let (status, json) = send(protected_router(), uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_signature_format");
}

#[tokio::test]
async fn test_non_numeric_expiry_rejected() {
    let uri = format!("{}?path=cube.fits&exp=tomorrow&sig=00", SLICE);
    let (status, json) = send(protected_router(), uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_expiry_format");
}

// =============================================================================
// Missing Auth Parameters
// =============================================================================

#[tokio::test]
async fn test_missing_signature_rejected() {
    let uri = format!("{}?path=cube.fits&exp={}", METADATA, now() + 60);
    let (status, json) = send(protected_router(), uri).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "missing_signature");
}

#[tokio::test]
async fn test_missing_expiry_rejected() {
    let uri = format!("{}?path=cube.fits&sig=abcd", METADATA);
    let (status, json) = send(protected_router(), uri).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "missing_expiry");
}

#[tokio::test]
async fn test_no_auth_params_rejected() {
    let (status, _) = send(
        protected_router(),
        format!("{}?path=cube.fits&hdu=1&slices=0:1,0:1,0:1", SLICE),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Public Endpoints and Auth Disabled Mode
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_public() {
    let (status, json) = send(protected_router(), "/health".to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_auth_disabled_allows_unauthenticated() {
    let source = MockFileSource::new().with_file("cube.fits", cube_fits());
    let router = create_router(SliceService::new(source), RouterConfig::without_auth());

    let (status, _) = send(router, format!("{}?path=cube.fits", METADATA)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_checked_before_file_access() {
    let source = MockFileSource::new().with_file("cube.fits", cube_fits());
    let router = create_router(SliceService::new(source.clone()), RouterConfig::new(TEST_SECRET));

    let (status, _) = send(router, format!("{}?path=cube.fits", METADATA)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(source.open_count(), 0);
}

// =============================================================================
// Signature Binding
// =============================================================================

#[tokio::test]
async fn test_signature_binds_to_slice_spec() {
    let signer = UrlSigner::new(TEST_SECRET);
    let expiry = now() + 60;
    let signature = signer.signature(SLICE, &slice_params(), expiry);

    // Same signature, wider slice
    let uri = format!(
        "{}?path=cube.fits&hdu=1&slices=0:2,0:50,0:50&exp={}&sig={}",
        SLICE, expiry, signature
    );
    let (status, json) = send(protected_router(), uri).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_signature");
}

#[tokio::test]
async fn test_signature_binds_to_endpoint() {
    let signer = UrlSigner::new(TEST_SECRET);
    let query = signer.signed_query(METADATA, &[("path", "cube.fits")], Duration::from_secs(60));

    // A metadata signature does not open the slice endpoint
    let (status, _) = send(protected_router(), format!("{}?{}", SLICE, query)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_extending_expiry_invalidates_signature() {
    let signer = UrlSigner::new(TEST_SECRET);
    let expiry = now() + 60;
    let signature = signer.signature(METADATA, &[("path", "cube.fits")], expiry);

    let uri = format!(
        "{}?path=cube.fits&exp={}&sig={}",
        METADATA,
        expiry + 3600,
        signature
    );
    let (status, _) = send(protected_router(), uri).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
