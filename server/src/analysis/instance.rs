//! Per-instance throughput from first spans

use super::{FirstSpanListener, SpanListener};
use crate::metrics::{minute_bucket, InstancePerfRecord, MetricRecord};
use crate::segment::{RawSegment, Span};

/// One record per segment: the first span stands for the whole request the
/// instance handled.
#[derive(Default)]
pub struct InstancePerfListener {
    record: Option<InstancePerfRecord>,
}

impl SpanListener for InstancePerfListener {
    fn as_first(&mut self) -> Option<&mut dyn FirstSpanListener> {
        Some(self)
    }

    fn build(&mut self) -> Vec<MetricRecord> {
        self.record
            .take()
            .map(MetricRecord::InstancePerf)
            .into_iter()
            .collect()
    }
}

impl FirstSpanListener for InstancePerfListener {
    fn first_span(&mut self, segment: &RawSegment, span: &Span) {
        self.record = Some(InstancePerfRecord {
            time_bucket: minute_bucket(span.start_time),
            instance_id: segment.instance_id,
            calls: 1,
            cost_sum: span.cost_ms(),
            first_seen: span.start_time,
            last_heartbeat: span.end_time,
        });
    }
}
