//! Segment ingest pipeline
//!
//! The HTTP handler decodes a batch and hands each segment to
//! `SegmentIntake`, which resolves identifiers up front so the caller gets
//! a truthful per-segment status. Resolved segments flow through a bounded
//! channel into the dispatch task; segments missing an identifier sit in
//! the retry buffer until a later resolution attempt succeeds or the
//! buffer's bounds drop them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cluster::MetricRouter;
use crate::resolve::retry::{PendingSegment, RetryBuffer};
use crate::resolve::{resolve_segment, IdentifierResolver};
use crate::segment::model::RawSegment;
use crate::segment::wire::{SegmentObject, UniqueId};

/// Per-segment ingest status reported back to the agent.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    Buffered,
    Rejected(String),
}

pub struct SegmentIntake {
    resolver: Arc<dyn IdentifierResolver>,
    dispatch_tx: mpsc::Sender<RawSegment>,
    retry_tx: mpsc::Sender<PendingSegment>,
    decode_failures: AtomicU64,
}

impl SegmentIntake {
    pub fn new(
        resolver: Arc<dyn IdentifierResolver>,
        dispatch_tx: mpsc::Sender<RawSegment>,
        retry_tx: mpsc::Sender<PendingSegment>,
    ) -> Self {
        Self {
            resolver,
            dispatch_tx,
            retry_tx,
            decode_failures: AtomicU64::new(0),
        }
    }

    /// Malformed batches and segments, counted by the ingest endpoint.
    pub fn note_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Resolve one decoded segment and hand it onward. Unresolved
    /// identifiers buffer the segment for retry; protocol violations
    /// reject it outright.
    pub async fn submit(&self, segment: SegmentObject, trace_ids: Vec<UniqueId>) -> IngestOutcome {
        match resolve_segment(self.resolver.as_ref(), &segment, &trace_ids).await {
            Ok(raw) => {
                if self.dispatch_tx.send(raw).await.is_err() {
                    return IngestOutcome::Rejected("pipeline stopped".to_string());
                }
                IngestOutcome::Accepted
            }
            Err(err) if err.is_retryable() => {
                let pending = PendingSegment::new(segment, trace_ids);
                match self.retry_tx.try_send(pending) {
                    Ok(()) => IngestOutcome::Buffered,
                    Err(_) => IngestOutcome::Rejected("retry queue full".to_string()),
                }
            }
            Err(err) => IngestOutcome::Rejected(err.to_string()),
        }
    }
}

/// Dispatch task: turns each resolved segment into metric records and
/// routes them. Drains the channel on shutdown so accepted segments are
/// not dropped.
pub fn start_dispatch_task(
    router: Arc<MetricRouter>,
    capacity: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) -> (mpsc::Sender<RawSegment>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<RawSegment>(capacity);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Dispatch task shutting down, draining channel");
                        while let Ok(raw) = rx.try_recv() {
                            dispatch_and_route(&router, raw).await;
                        }
                        break;
                    }
                }

                raw = rx.recv() => {
                    match raw {
                        Some(raw) => dispatch_and_route(&router, raw).await,
                        None => break,
                    }
                }
            }
        }
    });
    (tx, handle)
}

async fn dispatch_and_route(router: &MetricRouter, raw: RawSegment) {
    let segment_id = raw.segment_id.clone();
    let mut listeners = crate::analysis::listener_set();
    let records = crate::analysis::dispatch(&raw, &mut listeners);
    for record in records {
        if let Err(err) = router.route(record).await {
            warn!(segment_id, error = %err, "Dropping unroutable record");
        }
    }
}

/// Retry task: periodically re-resolves buffered segments. Success feeds
/// the dispatch channel; still-unresolved entries go back into the buffer
/// until its attempt or age bounds expire them.
pub fn start_retry_task(
    resolver: Arc<dyn IdentifierResolver>,
    dispatch_tx: mpsc::Sender<RawSegment>,
    capacity: usize,
    max_attempts: u32,
    max_age: Duration,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> (mpsc::Sender<PendingSegment>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<PendingSegment>(capacity);
    let handle = tokio::spawn(async move {
        let mut buffer = RetryBuffer::new(capacity, max_attempts, max_age);
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(pending = buffer.len(), dropped = buffer.dropped(), "Retry task shutting down");
                        break;
                    }
                }

                pending = rx.recv() => {
                    match pending {
                        Some(pending) => buffer.push(pending),
                        None => break,
                    }
                }

                _ = interval.tick() => {
                    for pending in buffer.take_due() {
                        match resolve_segment(resolver.as_ref(), &pending.segment, &pending.trace_ids).await {
                            Ok(raw) => {
                                debug!(segment_id = raw.segment_id, attempts = pending.attempts, "Buffered segment resolved");
                                if dispatch_tx.send(raw).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) if err.is_retryable() => buffer.push(pending),
                            Err(err) => {
                                warn!(segment_id = pending.segment_id(), error = %err, "Buffered segment rejected");
                            }
                        }
                    }
                }
            }
        }
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::MemoryRegistry;
    use crate::segment::wire::{SpanKind, SpanObject};

    fn unique_id(parts: &[i64]) -> UniqueId {
        UniqueId {
            id_parts: parts.to_vec(),
        }
    }

    fn entry_span() -> SpanObject {
        SpanObject {
            span_id: 0,
            parent_span_id: -1,
            start_time: 1_704_112_496_000,
            end_time: 1_704_112_496_200,
            span_kind: SpanKind::Entry as i32,
            operation_id: 0,
            operation_name: "/api/orders".to_string(),
            peer_id: 0,
            peer: String::new(),
            is_error: false,
            refs: vec![],
        }
    }

    fn segment(service_id: i32, instance_id: i32) -> SegmentObject {
        SegmentObject {
            segment_id: Some(unique_id(&[1, 2, 3])),
            service_id,
            instance_id,
            spans: vec![entry_span()],
        }
    }

    async fn registry_with_service() -> Arc<MemoryRegistry> {
        let registry = Arc::new(MemoryRegistry::new());
        let service_id = registry.register_service("orders");
        let instance_id = registry.register_instance(service_id);
        registry.register_operation(service_id, "/api/orders");
        assert_eq!((service_id, instance_id), (1, 2));
        registry
    }

    #[tokio::test]
    async fn test_submit_accepts_resolvable_segment() {
        let registry = registry_with_service().await;
        let (dispatch_tx, mut dispatch_rx) = mpsc::channel(4);
        let (retry_tx, _retry_rx) = mpsc::channel(4);
        let intake = SegmentIntake::new(registry, dispatch_tx, retry_tx);

        let outcome = intake
            .submit(segment(1, 2), vec![unique_id(&[9, 9, 9])])
            .await;
        assert_eq!(outcome, IngestOutcome::Accepted);

        let raw = dispatch_rx.recv().await.unwrap();
        assert_eq!(raw.segment_id, "1.2.3");
        assert_eq!(raw.trace_ids, vec!["9.9.9".to_string()]);
    }

    #[tokio::test]
    async fn test_submit_buffers_unknown_operation() {
        let registry = Arc::new(MemoryRegistry::new());
        let service_id = registry.register_service("orders");
        registry.register_instance(service_id);
        // Operation never registered, so resolution misses.

        let (dispatch_tx, _dispatch_rx) = mpsc::channel(4);
        let (retry_tx, mut retry_rx) = mpsc::channel(4);
        let intake = SegmentIntake::new(registry, dispatch_tx, retry_tx);

        let outcome = intake.submit(segment(1, 2), vec![]).await;
        assert_eq!(outcome, IngestOutcome::Buffered);
        assert_eq!(retry_rx.recv().await.unwrap().segment_id(), "1.2.3");
    }

    #[tokio::test]
    async fn test_submit_rejects_multiple_entry_spans() {
        let registry = registry_with_service().await;
        let (dispatch_tx, _dispatch_rx) = mpsc::channel(4);
        let (retry_tx, _retry_rx) = mpsc::channel(4);
        let intake = SegmentIntake::new(registry, dispatch_tx, retry_tx);

        let mut seg = segment(1, 2);
        let mut second = entry_span();
        second.span_id = 1;
        second.parent_span_id = 0;
        seg.spans.push(second);

        match intake.submit(seg, vec![]).await {
            IngestOutcome::Rejected(reason) => assert!(reason.contains("entry spans")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
