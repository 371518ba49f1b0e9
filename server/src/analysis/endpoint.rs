//! Per-endpoint call statistics from entry spans

use rustc_hash::FxHashMap;

use super::{EntrySpanListener, SpanListener};
use crate::metrics::{minute_bucket, EndpointRecord, MetricRecord};
use crate::segment::{RawSegment, Span};

#[derive(Default)]
pub struct EndpointListener {
    endpoints: FxHashMap<(i64, i32, String), EndpointStats>,
}

#[derive(Default)]
struct EndpointStats {
    calls: i64,
    errors: i64,
    duration_sum: i64,
    duration_max: i64,
    duration_min: i64,
}

impl SpanListener for EndpointListener {
    fn as_entry(&mut self) -> Option<&mut dyn EntrySpanListener> {
        Some(self)
    }

    fn build(&mut self) -> Vec<MetricRecord> {
        self.endpoints
            .drain()
            .map(|((time_bucket, service_id, endpoint), stats)| {
                MetricRecord::Endpoint(EndpointRecord {
                    time_bucket,
                    service_id,
                    endpoint,
                    calls: stats.calls,
                    errors: stats.errors,
                    duration_sum: stats.duration_sum,
                    duration_max: stats.duration_max,
                    duration_min: stats.duration_min,
                })
            })
            .collect()
    }
}

impl EntrySpanListener for EndpointListener {
    fn entry_span(&mut self, segment: &RawSegment, span: &Span) {
        let cost = span.cost_ms();
        let stats = self
            .endpoints
            .entry((
                minute_bucket(span.start_time),
                segment.service_id,
                span.operation_name.clone(),
            ))
            .or_default();
        stats.calls += 1;
        if span.is_error {
            stats.errors += 1;
        }
        stats.duration_sum += cost;
        if cost > stats.duration_max {
            stats.duration_max = cost;
        }
        if stats.calls == 1 || cost < stats.duration_min {
            stats.duration_min = cost;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SpanKind;

    const T: i64 = 1_704_112_440_000;

    fn entry(cost_ms: i64, is_error: bool) -> Span {
        Span {
            span_id: 0,
            parent_span_id: -1,
            kind: SpanKind::Entry,
            operation_id: 10,
            operation_name: "/orders".to_string(),
            start_time: T,
            end_time: T + cost_ms,
            peer_id: 0,
            peer: String::new(),
            is_error,
            refs: vec![],
        }
    }

    fn segment() -> RawSegment {
        RawSegment {
            segment_id: "1.1.1".to_string(),
            service_id: 3,
            service_name: "orders".to_string(),
            instance_id: 7,
            trace_ids: vec![],
            spans: vec![],
        }
    }

    #[test]
    fn test_endpoint_stats() {
        let seg = segment();
        let mut listener = EndpointListener::default();
        listener.entry_span(&seg, &entry(300, false));
        listener.entry_span(&seg, &entry(900, true));
        listener.entry_span(&seg, &entry(100, false));

        let records = listener.build();
        assert_eq!(records.len(), 1);
        match &records[0] {
            MetricRecord::Endpoint(r) => {
                assert_eq!(r.service_id, 3);
                assert_eq!(r.endpoint, "/orders");
                assert_eq!(r.calls, 3);
                assert_eq!(r.errors, 1);
                assert_eq!(r.duration_sum, 1300);
                assert_eq!(r.duration_max, 900);
                assert_eq!(r.duration_min, 100);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_instant_span_lowers_minimum() {
        let seg = segment();
        let mut listener = EndpointListener::default();
        listener.entry_span(&seg, &entry(300, false));
        listener.entry_span(&seg, &entry(0, false));

        let records = listener.build();
        match &records[0] {
            MetricRecord::Endpoint(r) => {
                assert_eq!(r.duration_min, 0);
                assert_eq!(r.duration_max, 300);
            }
            _ => unreachable!(),
        }
    }
}
