//! Instance-to-peer call edges from exit spans

use rustc_hash::FxHashMap;

use super::{ExitSpanListener, SpanListener};
use crate::metrics::record::LatencyBands;
use crate::metrics::{minute_bucket, MetricRecord, NodeReferenceRecord};
use crate::segment::{RawSegment, Span};

/// One record per (front instance, behind peer) edge seen in the segment.
#[derive(Default)]
pub struct NodeReferenceListener {
    edges: FxHashMap<(i64, i32, String), LatencyBands>,
}

impl SpanListener for NodeReferenceListener {
    fn as_exit(&mut self) -> Option<&mut dyn ExitSpanListener> {
        Some(self)
    }

    fn build(&mut self) -> Vec<MetricRecord> {
        self.edges
            .drain()
            .map(|((time_bucket, front_instance_id, behind_peer), bands)| {
                MetricRecord::NodeReference(NodeReferenceRecord {
                    time_bucket,
                    front_instance_id,
                    behind_peer,
                    bands,
                })
            })
            .collect()
    }
}

impl ExitSpanListener for NodeReferenceListener {
    fn exit_span(&mut self, segment: &RawSegment, span: &Span) {
        let behind_peer = if span.peer.is_empty() {
            span.peer_id.to_string()
        } else {
            span.peer.clone()
        };
        let key = (
            minute_bucket(span.start_time),
            segment.instance_id,
            behind_peer,
        );
        self.edges
            .entry(key)
            .or_default()
            .observe(span.cost_ms(), span.is_error);
    }
}
