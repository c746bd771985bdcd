//! Slice extraction.
//!
//! ```text
//! "0:1,0:50,0:50" ──► SliceDescriptor ──► ReadPlan ──► SliceResult
//!    (descriptor)        (validated)      (extract)    (LE bytes)
//! ```
//!
//! [`SliceService`] ties the pieces to a [`FileSource`](crate::source::FileSource).

mod descriptor;
mod extract;
mod service;

pub use descriptor::{Range, SliceDescriptor};
pub use extract::{
    extract, plan_reads, ReadPlan, ReadRun, SliceResult, UnitStorage,
    DEFAULT_MAX_CONCURRENT_READS, MAX_RUN_BYTES,
};
pub use service::{FileDescription, SliceRequest, SliceService};
