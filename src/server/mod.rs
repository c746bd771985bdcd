//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /fitsview/metadata          GET /fitsview/slice         │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │ (signed URL)│  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//!                         SliceService
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{require_signature, AuthError, UrlSigner};
pub use handlers::{
    health_handler, metadata_handler, slice_handler, status_for, AppState, ErrorResponse,
    HealthResponse, MetadataResponse, UnitMetadataResponse, SHAPE_HEADER, TYPE_HEADER,
};
pub use routes::{create_router, CorsOrigins, RouterConfig, METADATA_PATH, SLICE_PATH};
