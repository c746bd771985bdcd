//! Router assembly.
//!
//! ```text
//! /health               - Health check (always public)
//! /fitsview/metadata    - Unit table of a file  ┐ signed URLs required
//! /fitsview/slice       - Slice bytes           ┘ when auth is enabled
//! ```
//!
//! ```ignore
//! use fits_streamer::server::{create_router, CorsOrigins, RouterConfig};
//! use fits_streamer::slice::SliceService;
//! use fits_streamer::source::LocalFileSource;
//!
//! let service = SliceService::new(LocalFileSource::new("/data"));
//! let config = RouterConfig::new("my-secret-key")
//!     .with_cors(CorsOrigins::List(vec!["https://example.com".to_string()]));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, create_router(service, config)).await?;
//! ```

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use http::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{require_signature, UrlSigner};
use super::handlers::{
    health_handler, metadata_handler, slice_handler, AppState, SHAPE_HEADER, TYPE_HEADER,
};
use crate::slice::SliceService;
use crate::source::FileSource;

pub const METADATA_PATH: &str = "/fitsview/metadata";

pub const SLICE_PATH: &str = "/fitsview/slice";

/// How long browsers may cache a preflight answer.
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Router Configuration
// =============================================================================

/// Origins allowed to make cross-origin requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsOrigins {
    #[default]
    Any,
    /// Only these origins; an empty list refuses every cross-origin request
    List(Vec<String>),
}

/// Settings for [`create_router`].
#[derive(Clone)]
pub struct RouterConfig {
    /// Shared secret for signed URLs; `None` leaves the data endpoints open
    pub auth_secret: Option<String>,

    pub cors: CorsOrigins,

    /// Wrap requests in `TraceLayer` spans
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Signed URLs required, any origin, tracing on.
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: Some(auth_secret.into()),
            cors: CorsOrigins::Any,
            enable_tracing: true,
        }
    }

    pub fn without_auth() -> Self {
        Self {
            auth_secret: None,
            cors: CorsOrigins::Any,
            enable_tracing: true,
        }
    }

    pub fn with_cors(mut self, cors: CorsOrigins) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_secret.is_some()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Build the application router around `service`.
pub fn create_router<S>(service: SliceService<S>, config: RouterConfig) -> Router
where
    S: FileSource + 'static,
{
    let mut data = Router::new()
        .route(METADATA_PATH, get(metadata_handler::<S>))
        .route(SLICE_PATH, get(slice_handler::<S>))
        .with_state(AppState::new(service));

    if let Some(secret) = &config.auth_secret {
        let signer = UrlSigner::new(secret);
        data = data.layer(middleware::from_fn_with_state(signer, require_signature));
    }

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(data)
        .layer(cors_layer(&config.cors));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Read-only CORS policy. Browsers need the shape and type headers exposed
/// to decode a slice body.
fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static(SHAPE_HEADER),
            HeaderName::from_static(TYPE_HEADER),
            CONTENT_LENGTH,
        ])
        .max_age(PREFLIGHT_MAX_AGE);

    match origins {
        CorsOrigins::Any => layer.allow_origin(AllowOrigin::any()),
        CorsOrigins::List(list) if list.is_empty() => layer,
        CorsOrigins::List(list) => {
            let allowed: Vec<HeaderValue> = list.iter().filter_map(|o| o.parse().ok()).collect();
            layer.allow_origin(allowed)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
