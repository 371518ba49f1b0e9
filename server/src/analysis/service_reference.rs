//! Endpoint-to-endpoint call edges attributed to the entry endpoint

use rustc_hash::FxHashMap;

use super::{EntrySpanListener, ExitSpanListener, ReferenceListener, SpanListener};
use crate::metrics::record::LatencyBands;
use crate::metrics::{minute_bucket, MetricRecord, ServiceReferenceRecord};
use crate::segment::{RawSegment, SegmentRef, Span, SpanKind};

/// Synthetic front endpoint for requests that enter the system directly,
/// with no upstream segment reference.
pub const USER_ENDPOINT: &str = "User";

/// Builds (entry -> front -> behind) edges:
/// - entry span with references: one edge per reference, the reference's
///   entry/parent operations in front of this segment's entry operation;
/// - entry span without references: a `User` edge onto the entry operation;
/// - exit spans: an edge from this segment's entry operation to the peer.
///   A segment without an entry span has no entry identity, so its own
///   service name stands in for both entry and front.
#[derive(Default)]
pub struct ServiceReferenceListener {
    entry: Option<EntryState>,
    fallback_service: Option<String>,
    exits: Vec<ExitState>,
    edges: FxHashMap<(i64, String, String, String), LatencyBands>,
}

struct EntryState {
    operation_name: String,
    time_bucket: i64,
    cost_ms: i64,
    is_error: bool,
    had_refs: bool,
}

struct ExitState {
    behind: String,
    time_bucket: i64,
    cost_ms: i64,
    is_error: bool,
}

impl ServiceReferenceListener {
    fn observe(
        &mut self,
        bucket: i64,
        entry: String,
        front: String,
        behind: String,
        cost_ms: i64,
        is_error: bool,
    ) {
        self.edges
            .entry((bucket, entry, front, behind))
            .or_default()
            .observe(cost_ms, is_error);
    }
}

impl SpanListener for ServiceReferenceListener {
    fn as_entry(&mut self) -> Option<&mut dyn EntrySpanListener> {
        Some(self)
    }
    fn as_exit(&mut self) -> Option<&mut dyn ExitSpanListener> {
        Some(self)
    }
    fn as_reference(&mut self) -> Option<&mut dyn ReferenceListener> {
        Some(self)
    }

    fn build(&mut self) -> Vec<MetricRecord> {
        if let Some(entry) = self.entry.take() {
            if !entry.had_refs {
                self.observe(
                    entry.time_bucket,
                    entry.operation_name.clone(),
                    USER_ENDPOINT.to_string(),
                    entry.operation_name.clone(),
                    entry.cost_ms,
                    entry.is_error,
                );
            }
            self.fallback_service = Some(entry.operation_name);
        }
        let entry_identity = self.fallback_service.take().unwrap_or_default();

        for exit in std::mem::take(&mut self.exits) {
            self.observe(
                exit.time_bucket,
                entry_identity.clone(),
                entry_identity.clone(),
                exit.behind,
                exit.cost_ms,
                exit.is_error,
            );
        }

        self.edges
            .drain()
            .map(
                |((time_bucket, entry_endpoint, front_endpoint, behind_endpoint), bands)| {
                    MetricRecord::ServiceReference(ServiceReferenceRecord {
                        time_bucket,
                        entry_endpoint,
                        front_endpoint,
                        behind_endpoint,
                        bands,
                    })
                },
            )
            .collect()
    }
}

impl EntrySpanListener for ServiceReferenceListener {
    fn entry_span(&mut self, _segment: &RawSegment, span: &Span) {
        self.entry = Some(EntryState {
            operation_name: span.operation_name.clone(),
            time_bucket: minute_bucket(span.start_time),
            cost_ms: span.cost_ms(),
            is_error: span.is_error,
            had_refs: false,
        });
    }
}

impl ReferenceListener for ServiceReferenceListener {
    fn reference(&mut self, _segment: &RawSegment, span: &Span, reference: &SegmentRef) {
        // Only references on the entry span describe how the request
        // entered this segment.
        if span.kind != SpanKind::Entry {
            return;
        }
        if let Some(entry) = self.entry.as_mut() {
            entry.had_refs = true;
        }
        self.observe(
            minute_bucket(span.start_time),
            reference.entry_operation_name.clone(),
            reference.parent_operation_name.clone(),
            span.operation_name.clone(),
            span.cost_ms(),
            span.is_error,
        );
    }
}

impl ExitSpanListener for ServiceReferenceListener {
    fn exit_span(&mut self, segment: &RawSegment, span: &Span) {
        let behind = if span.peer.is_empty() {
            span.operation_name.clone()
        } else {
            span.peer.clone()
        };
        self.exits.push(ExitState {
            behind,
            time_bucket: minute_bucket(span.start_time),
            cost_ms: span.cost_ms(),
            is_error: span.is_error,
        });
        if self.fallback_service.is_none() {
            self.fallback_service = Some(segment.service_name.clone());
        }
    }
}
