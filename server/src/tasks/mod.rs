//! Background tasks
//!
//! - `ingest` - resolve, dispatch, and buffered-retry pipeline for segments
//! - `flush` - persistence timer draining shard accumulators into storage
//! - `ttl` - retention reaper, active on the elected node only
//! - `watermark` - process memory sampling and ingest backpressure

pub mod flush;
pub mod ingest;
pub mod ttl;
pub mod watermark;

pub use flush::PersistenceTimer;
pub use ingest::{IngestOutcome, SegmentIntake};
pub use ttl::TtlReaper;
pub use watermark::WatermarkService;
