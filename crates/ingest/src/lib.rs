//! Drives one upload end to end: streaming parse, tier fan-out, and
//! at-most-once finalization per item id (spec.md §4.A/§4.C).

pub mod chunked;
pub mod coordinator;
pub mod error;

pub use chunked::ChunkedUploadAssembly;
pub use coordinator::{IngestCoordinator, IngestOutcome};
pub use error::IngestError;
