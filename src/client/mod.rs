//! Client side: streaming slice downloads and plane navigation.
//!
//! ```text
//! SliceViewer ──► SliceNavigator      (which plane, when to fetch)
//!      │
//!      ├────────► SliceFetcher ──► SliceClient ──► SliceTransfer ──► DecodedSlice
//!      │                                             (chunks, progress, cancel)
//!      └────────► Renderer                          (one surface per unit)
//! ```

mod decoded;
mod http;
mod navigation;
mod render;
mod transfer;

pub use decoded::{DecodedSlice, PlaneDims};
pub use http::{slice_headers, SliceClient, DEFAULT_SIGNATURE_TTL, METADATA_ENDPOINT, SLICE_ENDPOINT};
pub use navigation::{
    Closed, Completion, FetchCommand, FetchTrigger, InFlight, NavigationState, SliceFetcher,
    SliceNavigator, SliceViewer, Transition, UnitInfo, UnitView, ViewOutcome, ViewPhase,
    DEFAULT_AUTO_FETCH_THRESHOLD,
};
pub use render::{surface_id, RecordedImage, RecordingRenderer, Renderer};
pub use transfer::{ChunkSource, Progress, SliceTransfer};
