//! Agent wire format
//!
//! Hand-written prost messages; the schema is small and stable enough that
//! a build-time protoc step buys nothing.

/// Identifier made of numeric parts. The canonical string form joins the
/// parts with `.`.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct UniqueId {
    #[prost(int64, repeated, tag = "1")]
    pub id_parts: Vec<i64>,
}

impl UniqueId {
    pub fn joined(&self) -> String {
        self.id_parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
#[repr(i32)]
pub enum SpanKind {
    Entry = 0,
    Exit = 1,
    Local = 2,
}

/// Cross-segment reference carried on a span. Identifier fields come in
/// either id form (non-zero id) or literal form (name/address string with a
/// zero id) and are exchanged for ids before analysis.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentReference {
    #[prost(message, optional, tag = "1")]
    pub parent_segment_id: Option<UniqueId>,
    #[prost(int32, tag = "2")]
    pub parent_instance_id: i32,
    #[prost(int32, tag = "3")]
    pub parent_span_id: i32,
    #[prost(int32, tag = "4")]
    pub parent_operation_id: i32,
    #[prost(string, tag = "5")]
    pub parent_operation_name: String,
    #[prost(int32, tag = "6")]
    pub entry_instance_id: i32,
    #[prost(int32, tag = "7")]
    pub entry_operation_id: i32,
    #[prost(string, tag = "8")]
    pub entry_operation_name: String,
    #[prost(int32, tag = "9")]
    pub network_address_id: i32,
    #[prost(string, tag = "10")]
    pub network_address: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpanObject {
    #[prost(int32, tag = "1")]
    pub span_id: i32,
    /// -1 for the root span of a segment
    #[prost(int32, tag = "2")]
    pub parent_span_id: i32,
    #[prost(int64, tag = "3")]
    pub start_time: i64,
    #[prost(int64, tag = "4")]
    pub end_time: i64,
    #[prost(enumeration = "SpanKind", tag = "5")]
    pub span_kind: i32,
    #[prost(int32, tag = "6")]
    pub operation_id: i32,
    #[prost(string, tag = "7")]
    pub operation_name: String,
    #[prost(int32, tag = "8")]
    pub peer_id: i32,
    #[prost(string, tag = "9")]
    pub peer: String,
    #[prost(bool, tag = "10")]
    pub is_error: bool,
    #[prost(message, repeated, tag = "11")]
    pub refs: Vec<SegmentReference>,
}

impl SpanObject {
    pub fn kind(&self) -> SpanKind {
        SpanKind::try_from(self.span_kind).unwrap_or(SpanKind::Local)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentObject {
    #[prost(message, optional, tag = "1")]
    pub segment_id: Option<UniqueId>,
    #[prost(int32, tag = "2")]
    pub service_id: i32,
    #[prost(int32, tag = "3")]
    pub instance_id: i32,
    #[prost(message, repeated, tag = "4")]
    pub spans: Vec<SpanObject>,
}

/// One segment as shipped by an agent: the global trace ids it belongs to
/// plus the encoded `SegmentObject` payload. The payload stays opaque bytes
/// at the transport layer so undecodable segments fail individually.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpstreamSegment {
    #[prost(message, repeated, tag = "1")]
    pub global_trace_ids: Vec<UniqueId>,
    #[prost(bytes = "vec", tag = "2")]
    pub segment: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentBatch {
    #[prost(message, repeated, tag = "1")]
    pub segments: Vec<UpstreamSegment>,
}
