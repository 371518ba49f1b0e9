//! Resolved segment model handed to analysis listeners
//!
//! Produced by `resolve::resolve_segment` from a wire `SegmentObject` once
//! every identifier in it has a registered id. Lives for exactly one
//! dispatch pass.

pub use super::wire::SpanKind;

#[derive(Debug, Clone)]
pub struct RawSegment {
    pub segment_id: String,
    pub service_id: i32,
    pub service_name: String,
    pub instance_id: i32,
    pub trace_ids: Vec<String>,
    pub spans: Vec<Span>,
}

impl RawSegment {
    /// The segment's root span (span id 0), when present.
    pub fn first_span(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.span_id == 0)
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub span_id: i32,
    pub parent_span_id: i32,
    pub kind: SpanKind,
    pub operation_id: i32,
    pub operation_name: String,
    pub start_time: i64,
    pub end_time: i64,
    pub peer_id: i32,
    pub peer: String,
    pub is_error: bool,
    pub refs: Vec<SegmentRef>,
}

impl Span {
    pub fn cost_ms(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Cross-segment reference with all identifiers resolved to ids and names.
#[derive(Debug, Clone)]
pub struct SegmentRef {
    pub parent_segment_id: String,
    pub parent_instance_id: i32,
    pub parent_span_id: i32,
    pub parent_operation_id: i32,
    pub parent_operation_name: String,
    pub entry_instance_id: i32,
    pub entry_operation_id: i32,
    pub entry_operation_name: String,
    pub network_address_id: i32,
}
