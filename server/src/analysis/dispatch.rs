//! Dispatch of a resolved segment over a listener set

use super::endpoint::EndpointListener;
use super::instance::InstancePerfListener;
use super::node_reference::NodeReferenceListener;
use super::service_reference::ServiceReferenceListener;
use super::trace_id::TraceIdListener;
use super::SpanListener;
use crate::metrics::MetricRecord;
use crate::segment::{RawSegment, SpanKind};

/// Fresh listener set for one segment, in registration order. `build` runs
/// in this same order.
pub fn listener_set() -> Vec<Box<dyn SpanListener>> {
    vec![
        Box::new(NodeReferenceListener::default()),
        Box::new(ServiceReferenceListener::default()),
        Box::new(InstancePerfListener::default()),
        Box::new(EndpointListener::default()),
        Box::new(TraceIdListener::default()),
    ]
}

/// Walk the segment once, notifying interested listeners, then collect
/// every listener's records.
///
/// Order is fixed: global trace ids first, then spans in their original
/// order. Per span: first-span callbacks for span id 0, then exactly one of
/// entry/exit/local by kind, then each of the span's references.
pub fn dispatch(
    segment: &RawSegment,
    listeners: &mut [Box<dyn SpanListener>],
) -> Vec<MetricRecord> {
    for trace_id in &segment.trace_ids {
        for listener in listeners.iter_mut() {
            if let Some(l) = listener.as_global_trace_id() {
                l.global_trace_id(segment, trace_id);
            }
        }
    }

    for span in &segment.spans {
        if span.span_id == 0 {
            for listener in listeners.iter_mut() {
                if let Some(l) = listener.as_first() {
                    l.first_span(segment, span);
                }
            }
        }
        match span.kind {
            SpanKind::Entry => {
                for listener in listeners.iter_mut() {
                    if let Some(l) = listener.as_entry() {
                        l.entry_span(segment, span);
                    }
                }
            }
            SpanKind::Exit => {
                for listener in listeners.iter_mut() {
                    if let Some(l) = listener.as_exit() {
                        l.exit_span(segment, span);
                    }
                }
            }
            SpanKind::Local => {
                for listener in listeners.iter_mut() {
                    if let Some(l) = listener.as_local() {
                        l.local_span(segment, span);
                    }
                }
            }
        }
        for reference in &span.refs {
            for listener in listeners.iter_mut() {
                if let Some(l) = listener.as_reference() {
                    l.reference(segment, span, reference);
                }
            }
        }
    }

    listeners.iter_mut().flat_map(|l| l.build()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Span, SpanKind};

    fn span(span_id: i32, kind: SpanKind, start: i64, end: i64, is_error: bool) -> Span {
        Span {
            span_id,
            parent_span_id: if span_id == 0 { -1 } else { 0 },
            kind,
            operation_id: 10 + span_id,
            operation_name: format!("/op/{span_id}"),
            start_time: start,
            end_time: end,
            peer_id: 0,
            peer: String::new(),
            is_error,
            refs: vec![],
        }
    }

    fn segment() -> RawSegment {
        // 2024-01-01 12:34 UTC
        let t = 1_704_112_440_000;
        let mut exit = span(1, SpanKind::Exit, t + 10, t + 510, false);
        exit.peer_id = 42;
        exit.peer = "10.0.0.2:9200".to_string();
        RawSegment {
            segment_id: "1.2.3".to_string(),
            service_id: 1,
            service_name: "orders".to_string(),
            instance_id: 7,
            trace_ids: vec!["9.9.9".to_string()],
            spans: vec![span(0, SpanKind::Entry, t, t + 800, false), exit],
        }
    }

    #[test]
    fn test_dispatch_produces_records_from_every_listener() {
        let segment = segment();
        let mut listeners = listener_set();
        let records = dispatch(&segment, &mut listeners);

        let mut types: Vec<&str> = records.iter().map(|r| r.record_type()).collect();
        types.sort_unstable();
        types.dedup();
        assert_eq!(
            types,
            vec![
                "endpoint",
                "instance_perf",
                "node_reference",
                "service_reference",
                "trace_association",
            ]
        );
    }

    #[test]
    fn test_records_share_the_segment_minute_bucket() {
        let segment = segment();
        let mut listeners = listener_set();
        for record in dispatch(&segment, &mut listeners) {
            assert_eq!(record.time_bucket(), 202401011234, "{}", record.record_type());
        }
    }

    #[test]
    fn test_local_only_segment_produces_instance_and_trace_records() {
        let t = 1_704_112_440_000;
        let segment = RawSegment {
            segment_id: "1.2.3".to_string(),
            service_id: 1,
            service_name: "orders".to_string(),
            instance_id: 7,
            trace_ids: vec!["9.9.9".to_string()],
            spans: vec![span(0, SpanKind::Local, t, t + 100, false)],
        };
        let mut listeners = listener_set();
        let records = dispatch(&segment, &mut listeners);
        let types: Vec<&str> = records.iter().map(|r| r.record_type()).collect();
        assert!(types.contains(&"instance_perf"));
        assert!(types.contains(&"trace_association"));
        assert!(!types.contains(&"endpoint"));
        assert!(!types.contains(&"node_reference"));
    }
}
