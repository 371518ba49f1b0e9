//! Global trace id associations

use super::{GlobalTraceIdListener, SpanListener};
use crate::metrics::{minute_bucket, MetricRecord, TraceAssociationRecord};
use crate::segment::RawSegment;

/// One association record per declared trace id. No deduplication: the same
/// id declared by five segments counts five, which is the point.
#[derive(Default)]
pub struct TraceIdListener {
    records: Vec<TraceAssociationRecord>,
}

impl SpanListener for TraceIdListener {
    fn as_global_trace_id(&mut self) -> Option<&mut dyn GlobalTraceIdListener> {
        Some(self)
    }

    fn build(&mut self) -> Vec<MetricRecord> {
        std::mem::take(&mut self.records)
            .into_iter()
            .map(MetricRecord::TraceAssociation)
            .collect()
    }
}

impl GlobalTraceIdListener for TraceIdListener {
    fn global_trace_id(&mut self, segment: &RawSegment, trace_id: &str) {
        let start = segment
            .first_span()
            .or_else(|| segment.spans.first())
            .map(|s| s.start_time)
            .unwrap_or_default();
        self.records.push(TraceAssociationRecord {
            time_bucket: minute_bucket(start),
            trace_id: trace_id.to_string(),
            segments: 1,
            service_id: segment.service_id as i64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Span, SpanKind};

    #[test]
    fn test_each_declared_id_counts() {
        let t = 1_704_112_440_000;
        let segment = RawSegment {
            segment_id: "1.1.1".to_string(),
            service_id: 2,
            service_name: "orders".to_string(),
            instance_id: 7,
            trace_ids: vec!["a.1".to_string(), "a.1".to_string(), "b.2".to_string()],
            spans: vec![Span {
                span_id: 0,
                parent_span_id: -1,
                kind: SpanKind::Entry,
                operation_id: 10,
                operation_name: "/orders".to_string(),
                start_time: t,
                end_time: t + 100,
                peer_id: 0,
                peer: String::new(),
                is_error: false,
                refs: vec![],
            }],
        };
        let mut listener = TraceIdListener::default();
        for id in &segment.trace_ids {
            listener.global_trace_id(&segment, id);
        }
        let records = listener.build();
        assert_eq!(records.len(), 3);
        // Merging the duplicate pair yields a frequency of two.
        let mut acc = records[0].clone();
        acc.merge(&records[1]).unwrap();
        match acc {
            MetricRecord::TraceAssociation(r) => assert_eq!(r.segments, 2),
            _ => unreachable!(),
        }
    }
}
