//! Metric model: time buckets, typed records, merge operators

pub mod bucket;
pub mod record;

pub use bucket::{Granularity, minute_bucket};
pub use record::{
    EndpointRecord, InstancePerfRecord, LatencyBands, MergeError, MetricRecord,
    NodeReferenceRecord, ServiceReferenceRecord, TraceAssociationRecord,
};
