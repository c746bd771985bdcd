//! Client tests against a live server on a loopback port.
//!
//! Tests verify:
//! - Metadata and slices round-trip through the HTTP client
//! - Progress is reported per chunk and ends at the full length
//! - Server errors keep their status and kind
//! - Signed requests pass an authenticating server
//! - Cancellation aborts without an error

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use fits_streamer::client::{Progress, SliceClient};
use fits_streamer::codec::{ElementType, TypedArray};
use fits_streamer::error::TransferError;
use fits_streamer::slice::{SliceRequest, SliceService};
use fits_streamer::{create_router, RouterConfig};

use super::test_utils::{cube_fits, cube_value, MockFileSource};

const TEST_SECRET: &str = "client-test-secret";

async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn open_server() -> SliceClient {
    let source = MockFileSource::new().with_file("cube.fits", cube_fits());
    let router = create_router(SliceService::new(source), RouterConfig::without_auth());
    let addr = spawn_server(router).await;
    SliceClient::new(&format!("http://{}", addr)).unwrap()
}

// =============================================================================
// Round Trips
// =============================================================================

#[tokio::test]
async fn test_client_metadata() {
    let client = open_server().await;

    let metadata = client.metadata("cube.fits", None).await.unwrap();
    assert_eq!(metadata.path, "cube.fits");
    assert_eq!(metadata.n_extensions, 2);
    assert_eq!(metadata.hdus[1].name, "SCI");
    assert_eq!(metadata.hdus[1].shape, Some(vec![2, 50, 50]));
    assert_eq!(metadata.hdus[1].array_type.as_deref(), Some("f32"));
    assert_eq!(metadata.hdus[0].shape, None);

    let single = client.metadata("cube.fits", Some(1)).await.unwrap();
    assert_eq!(single.n_extensions, 2);
    assert_eq!(single.hdus.len(), 1);
    assert_eq!(single.hdus[0].index, 1);
}

#[tokio::test]
async fn test_client_fetch_slice() {
    let client = open_server().await;

    let request = SliceRequest::new("cube.fits", 1, "1:2,20:22,30:33");
    let slice = client
        .fetch_slice(&request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(slice.shape, vec![1, 2, 3]);
    assert_eq!(slice.element_type, ElementType::F32);
    assert_eq!(slice.bytes.len(), 24);

    let expected: Vec<f32> = [(20, 30), (20, 31), (20, 32), (21, 30), (21, 31), (21, 32)]
        .iter()
        .map(|&(y, x)| cube_value(1, y, x))
        .collect();
    assert_eq!(slice.values(), Some(TypedArray::F32(expected)));

    let plane = slice.plane_dims().unwrap();
    assert_eq!((plane.width, plane.height), (3, 2));
}

#[tokio::test]
async fn test_client_empty_slice() {
    let client = open_server().await;

    let request = SliceRequest::new("cube.fits", 1, "0:1,5:5,0:50");
    let slice = client
        .fetch_slice(&request, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(slice.shape, vec![1, 0, 50]);
    assert!(slice.bytes.is_empty());
}

#[tokio::test]
async fn test_client_reports_progress() {
    let client = open_server().await;

    let request = SliceRequest::new("cube.fits", 1, "0:2,0:50,0:50");
    let transfer = client
        .open_slice(&request, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(transfer.shape(), &[2, 50, 50]);
    assert_eq!(transfer.progress().bytes_read, 0);
    assert_eq!(transfer.progress().total_bytes, 20_000);

    let seen: Arc<Mutex<Vec<Progress>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let slice = transfer
        .finish_with_progress(move |p| sink.lock().unwrap().push(p))
        .await
        .unwrap();
    assert_eq!(slice.bytes.len(), 20_000);

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0].bytes_read < w[1].bytes_read));
    let last = seen.last().unwrap();
    assert_eq!(last.bytes_read, 20_000);
    assert_eq!(last.fraction(), 1.0);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_server_errors_keep_kind() {
    let client = open_server().await;

    let cases = [
        (SliceRequest::new("cube.fits", 1, "0:10,0:10"), 400, "invalid_slice"),
        (SliceRequest::new("cube.fits", 1, "0:3,0:10,0:10"), 400, "out_of_bounds"),
        (SliceRequest::new("cube.fits", 7, "0:1"), 400, "unit_not_found"),
        (SliceRequest::new("cube.fits", 0, "0:1"), 400, "no_data"),
        (SliceRequest::new("nope.fits", 1, "0:1"), 404, "not_found"),
    ];

    for (request, expected_status, expected_kind) in cases {
        let err = client
            .fetch_slice(&request, CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            TransferError::Server { status, kind, .. } => {
                assert_eq!(status, expected_status, "{:?}", request);
                assert_eq!(kind, expected_kind, "{:?}", request);
            }
            other => panic!("expected server error for {:?}, got {:?}", request, other),
        }
    }
}

#[tokio::test]
async fn test_metadata_error_is_client_error() {
    let client = open_server().await;
    let err = client.metadata("missing.fits", None).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(!err.is_aborted());
}

#[tokio::test]
async fn test_unreachable_server_is_http_error() {
    // Bind then drop to get a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = SliceClient::new(&format!("http://{}", addr)).unwrap();
    let err = client.metadata("cube.fits", None).await.unwrap_err();
    assert!(matches!(err, TransferError::Http(_)));
}

// =============================================================================
// Signing
// =============================================================================

#[tokio::test]
async fn test_signed_client_passes_auth() {
    let source = MockFileSource::new().with_file("cube.fits", cube_fits());
    let router = create_router(SliceService::new(source), RouterConfig::new(TEST_SECRET));
    let addr = spawn_server(router).await;
    let base = format!("http://{}/", addr);

    let unsigned = SliceClient::new(&base).unwrap();
    let err = unsigned.metadata("cube.fits", None).await.unwrap_err();
    assert!(matches!(err, TransferError::Server { status: 401, .. }));

    let signed = SliceClient::new(&base)
        .unwrap()
        .with_http_client(reqwest::Client::new())
        .with_secret(TEST_SECRET)
        .with_signature_ttl(Duration::from_secs(30));
    let metadata = signed.metadata("cube.fits", Some(1)).await.unwrap();
    assert_eq!(metadata.hdus.len(), 1);

    let slice = signed
        .fetch_slice(
            &SliceRequest::new("cube.fits", 1, "0:1,0:50,0:50"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(slice.shape, vec![1, 50, 50]);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_before_request_aborts() {
    let client = open_server().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .fetch_slice(&SliceRequest::new("cube.fits", 1, "0:2,0:50,0:50"), cancel)
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::Aborted);
}

#[tokio::test]
async fn test_cancel_mid_transfer_aborts() {
    let client = open_server().await;
    let cancel = CancellationToken::new();

    let mut transfer = client
        .open_slice(&SliceRequest::new("cube.fits", 1, "0:2,0:50,0:50"), cancel.clone())
        .await
        .unwrap();
    cancel.cancel();

    let err = transfer.next_chunk().await.unwrap_err();
    assert!(err.is_aborted());
}
