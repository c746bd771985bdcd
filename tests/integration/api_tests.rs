//! API integration tests for metadata and slice retrieval.
//!
//! Tests verify:
//! - Metadata for every unit and for a single unit
//! - Slice bytes, shape and type headers
//! - Error statuses and error bodies
//! - Range reads touch only the selected bytes

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use fits_streamer::slice::SliceService;
use fits_streamer::{create_router, RouterConfig};

use super::test_utils::{cube_fits, cube_value, f32_le, i16_be, CardValue, FitsBuilder, MockFileSource};

fn router(source: MockFileSource) -> Router {
    create_router(SliceService::new(source), RouterConfig::without_auth())
}

fn cube_router() -> Router {
    router(MockFileSource::new().with_file("obs/cube.fits", cube_fits()))
}

async fn get(router: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.oneshot(request).await.unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let response = get(cube_router(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
}

// =============================================================================
// Metadata
// =============================================================================

#[tokio::test]
async fn test_metadata_all_units() {
    let response = get(cube_router(), "/fitsview/metadata?path=obs/cube.fits").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["path"], "obs/cube.fits");
    assert_eq!(json["n_extensions"], 2);

    let hdus = json["hdus"].as_array().unwrap();
    assert_eq!(hdus.len(), 2);

    assert_eq!(hdus[0]["index"], 0);
    assert_eq!(hdus[0]["name"], "PRIMARY");
    assert_eq!(hdus[0]["type"], "PrimaryHDU");
    assert!(hdus[0]["shape"].is_null());
    assert!(hdus[0]["arrayType"].is_null());

    assert_eq!(hdus[1]["index"], 1);
    assert_eq!(hdus[1]["name"], "SCI");
    assert_eq!(hdus[1]["type"], "ImageHDU");
    assert_eq!(hdus[1]["shape"], serde_json::json!([2, 50, 50]));
    assert_eq!(hdus[1]["arrayType"], "f32");

    let header = hdus[1]["header"].as_str().unwrap();
    assert!(header.starts_with("XTENSION= 'IMAGE   '"));
    assert!(header.contains("NAXIS3  ="));
}

#[tokio::test]
async fn test_metadata_single_unit() {
    let response = get(cube_router(), "/fitsview/metadata?path=obs/cube.fits&hdu=1").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["n_extensions"], 2);
    let hdus = json["hdus"].as_array().unwrap();
    assert_eq!(hdus.len(), 1);
    assert_eq!(hdus[0]["name"], "SCI");
}

#[tokio::test]
async fn test_metadata_unknown_unit() {
    let response = get(cube_router(), "/fitsview/metadata?path=obs/cube.fits&hdu=7").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["error"], "unit_not_found");
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_metadata_bad_unit_index() {
    let response = get(cube_router(), "/fitsview/metadata?path=obs/cube.fits&hdu=one").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_slice");
}

#[tokio::test]
async fn test_metadata_missing_file() {
    let response = get(cube_router(), "/fitsview/metadata?path=nope.fits").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_metadata_missing_path() {
    let response = get(cube_router(), "/fitsview/metadata").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metadata_not_fits() {
    let source = MockFileSource::new().with_file("notes.txt", vec![b'x'; 4000]);
    let response = get(router(source), "/fitsview/metadata?path=notes.txt").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json_body(response).await["error"], "unsupported_format");
}

// =============================================================================
// Slices
// =============================================================================

#[tokio::test]
async fn test_slice_success() {
    let response = get(
        cube_router(),
        "/fitsview/slice?path=obs/cube.fits&hdu=1&slices=0:1,0:10,0:10",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/octet-stream");
    assert_eq!(header(&response, "x-fits-shape"), "[1,10,10]");
    assert_eq!(header(&response, "x-fits-type"), "f32");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), 400);

    let values = f32_le(&body);
    assert_eq!(values[0], cube_value(0, 0, 0));
    assert_eq!(values[11], cube_value(0, 1, 1));
    assert_eq!(values[99], cube_value(0, 9, 9));
}

#[tokio::test]
async fn test_slice_inner_window_of_second_plane() {
    let response = get(
        cube_router(),
        "/fitsview/slice?path=obs/cube.fits&hdu=1&slices=1:2,20:23,40:45",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-fits-shape"), "[1,3,5]");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let values = f32_le(&body);
    let expected: Vec<f32> = (20..23)
        .flat_map(|y| (40..45).map(move |x| cube_value(1, y, x)))
        .collect();
    assert_eq!(values, expected);
}

#[tokio::test]
async fn test_slice_reads_only_selected_rows() {
    let source = MockFileSource::new().with_file("obs/cube.fits", cube_fits());
    let response = get(
        router(source.clone()),
        "/fitsview/slice?path=obs/cube.fits&hdu=1&slices=1:2,10:12,0:50",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Header walk reads whole blocks; the data read is exactly two rows
    let data_reads: Vec<(u64, usize)> = source
        .reads()
        .into_iter()
        .filter(|&(_, len)| len != 80 && len % 2880 != 0)
        .collect();
    let data_start = 2880 * 2u64;
    assert_eq!(
        data_reads,
        vec![(data_start + (50 * 50 + 10 * 50) * 4, 2 * 50 * 4)]
    );
}

#[tokio::test]
async fn test_slice_defaults_to_first_unit() {
    let data = i16_be([1, -2, 3, -4, 5, -6]);
    let source =
        MockFileSource::new().with_file("flat.fits", FitsBuilder::new().primary(16, &[2, 3], &data).build());

    let response = get(router(source), "/fitsview/slice?path=flat.fits&slices=1:2,0:3").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-fits-type"), "i16");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let values: Vec<i16> = body
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(values, vec![-4, 5, -6]);
}

#[tokio::test]
async fn test_slice_unsigned_convention() {
    // Stored value v - 32768 as i16 represents unsigned v
    let stored = i16_be([0u16, 1, 65535, 40000].map(|v| (v ^ 0x8000) as i16));
    let fits = FitsBuilder::new()
        .empty_primary()
        .image_with_cards(
            "RAW",
            16,
            &[2, 2],
            &stored,
            &[("BZERO", CardValue::Int(32768)), ("BSCALE", CardValue::Int(1))],
        )
        .build();
    let source = MockFileSource::new().with_file("raw.fits", fits);

    let response = get(router(source), "/fitsview/slice?path=raw.fits&hdu=1&slices=0:2,0:2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-fits-type"), "u16");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let values: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(values, vec![0, 1, 65535, 40000]);
}

#[tokio::test]
async fn test_slice_empty_range() {
    let response = get(
        cube_router(),
        "/fitsview/slice?path=obs/cube.fits&hdu=1&slices=0:1,5:5,0:50",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-fits-shape"), "[1,0,50]");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

// =============================================================================
// Slice Errors
// =============================================================================

#[tokio::test]
async fn test_slice_wrong_axis_count() {
    let response = get(
        cube_router(),
        "/fitsview/slice?path=obs/cube.fits&hdu=1&slices=0:10,0:10",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_slice");
}

#[tokio::test]
async fn test_slice_out_of_bounds() {
    let response = get(
        cube_router(),
        "/fitsview/slice?path=obs/cube.fits&hdu=1&slices=0:3,0:10,0:10",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["error"], "out_of_bounds");
    assert!(json["message"].as_str().unwrap().contains("axis 0"));
}

#[tokio::test]
async fn test_slice_malformed_spec() {
    for spec in ["0-1,0:10,0:10", "0:1,a:10,0:10", "0:1,5:2,0:10", ""] {
        let uri = format!("/fitsview/slice?path=obs/cube.fits&hdu=1&slices={}", spec);
        let response = get(cube_router(), &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "spec {:?}", spec);
        assert_eq!(json_body(response).await["error"], "invalid_slice");
    }
}

#[tokio::test]
async fn test_slice_unit_without_data() {
    let response = get(cube_router(), "/fitsview/slice?path=obs/cube.fits&hdu=0&slices=0:1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "no_data");
}

#[tokio::test]
async fn test_slice_missing_file() {
    let response = get(cube_router(), "/fitsview/slice?path=gone.fits&slices=0:1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_slice_truncated_data() {
    let mut fits = cube_fits();
    fits.truncate(2880 * 2 + 50 * 50 * 4);
    let source = MockFileSource::new().with_file("short.fits", fits);

    let ok = get(
        router(source.clone()),
        "/fitsview/slice?path=short.fits&hdu=1&slices=0:1,0:50,0:50",
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);

    let past_end = get(
        router(source),
        "/fitsview/slice?path=short.fits&hdu=1&slices=1:2,0:50,0:50",
    )
    .await;
    assert_eq!(past_end.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(past_end).await["error"], "out_of_bounds");
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_exposes_slice_headers() {
    let request = Request::builder()
        .uri("/fitsview/slice?path=obs/cube.fits&hdu=1&slices=0:1,0:1,0:1")
        .header("origin", "https://viewer.example")
        .body(Body::empty())
        .unwrap();
    let response = cube_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let exposed = header(&response, "access-control-expose-headers").to_lowercase();
    assert!(exposed.contains("x-fits-shape"));
    assert!(exposed.contains("x-fits-type"));
}
