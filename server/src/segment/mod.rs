//! Trace segment wire format, decoding, and resolved model

pub mod decode;
pub mod model;
pub mod wire;

pub use decode::{DecodeError, decode_segment};
pub use model::{RawSegment, SegmentRef, Span, SpanKind};
