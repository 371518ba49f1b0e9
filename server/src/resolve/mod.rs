//! Identifier resolution
//!
//! Agents send identifiers either as registered numeric ids or as literal
//! names. Before a segment reaches the analysis listeners, every literal
//! must be exchanged for its id and every id must have a known name. A
//! single miss rejects the whole segment as retryable; the caller parks the
//! segment in a [`retry::RetryBuffer`] and re-submits it later.

pub mod memory;
pub mod retry;

use async_trait::async_trait;
use thiserror::Error;

use crate::segment::wire::{SegmentObject, SegmentReference, SpanObject, UniqueId};
use crate::segment::{RawSegment, SegmentRef, Span, SpanKind};

pub use memory::MemoryRegistry;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Transient: the registry has not seen this identifier yet.
    #[error("unresolved identifier in segment {segment_id}: {what}")]
    UnresolvedIdentifier { segment_id: String, what: String },

    /// Permanent protocol violation; never retried.
    #[error("segment {segment_id} contains {count} entry spans, expected at most one")]
    MultipleEntrySpans { segment_id: String, count: usize },
}

impl AnalysisError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::UnresolvedIdentifier { .. })
    }
}

/// Registry lookup surface used during segment resolution.
///
/// Registration itself (handing out new ids) is a separate concern; the
/// resolver only answers queries and returns `None` for anything it has not
/// seen yet.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn operation_id(&self, service_id: i32, operation_name: &str) -> Option<i32>;
    async fn operation_name(&self, operation_id: i32) -> Option<String>;
    async fn address_id(&self, address: &str) -> Option<i32>;
    async fn service_name(&self, service_id: i32) -> Option<String>;
    async fn service_of_instance(&self, instance_id: i32) -> Option<i32>;
}

/// Resolve a decoded segment into the analysis model.
///
/// All-or-nothing: a partially resolved segment is never dispatched. The
/// entry-span cardinality check runs first so protocol violations are
/// rejected permanently even while identifiers are still unresolved.
pub async fn resolve_segment(
    resolver: &dyn IdentifierResolver,
    segment: &SegmentObject,
    trace_ids: &[UniqueId],
) -> Result<RawSegment, AnalysisError> {
    let segment_id = segment
        .segment_id
        .as_ref()
        .map(UniqueId::joined)
        .unwrap_or_default();

    let entry_count = segment
        .spans
        .iter()
        .filter(|s| s.kind() == SpanKind::Entry)
        .count();
    if entry_count > 1 {
        return Err(AnalysisError::MultipleEntrySpans {
            segment_id,
            count: entry_count,
        });
    }

    let unresolved = |what: String| AnalysisError::UnresolvedIdentifier {
        segment_id: segment_id.clone(),
        what,
    };

    let service_name = resolver
        .service_name(segment.service_id)
        .await
        .ok_or_else(|| unresolved(format!("service id {}", segment.service_id)))?;

    let mut spans = Vec::with_capacity(segment.spans.len());
    for span in &segment.spans {
        spans.push(resolve_span(resolver, segment.service_id, span, &segment_id).await?);
    }

    Ok(RawSegment {
        segment_id,
        service_id: segment.service_id,
        service_name,
        instance_id: segment.instance_id,
        trace_ids: trace_ids.iter().map(UniqueId::joined).collect(),
        spans,
    })
}

async fn resolve_span(
    resolver: &dyn IdentifierResolver,
    service_id: i32,
    span: &SpanObject,
    segment_id: &str,
) -> Result<Span, AnalysisError> {
    let unresolved = |what: String| AnalysisError::UnresolvedIdentifier {
        segment_id: segment_id.to_string(),
        what,
    };

    let (operation_id, operation_name) = resolve_operation(
        resolver,
        service_id,
        span.operation_id,
        &span.operation_name,
    )
    .await
    .ok_or_else(|| {
        unresolved(format!(
            "operation '{}' (id {}) on span {}",
            span.operation_name, span.operation_id, span.span_id
        ))
    })?;

    // Peers only matter on exit spans; a literal peer must exchange to an
    // address id before the segment counts as resolved.
    let peer_id = if span.kind() == SpanKind::Exit && span.peer_id == 0 && !span.peer.is_empty() {
        resolver
            .address_id(&span.peer)
            .await
            .ok_or_else(|| unresolved(format!("peer address '{}'", span.peer)))?
    } else {
        span.peer_id
    };

    let mut refs = Vec::with_capacity(span.refs.len());
    for r in &span.refs {
        refs.push(resolve_reference(resolver, r, segment_id).await?);
    }

    Ok(Span {
        span_id: span.span_id,
        parent_span_id: span.parent_span_id,
        kind: span.kind(),
        operation_id,
        operation_name,
        start_time: span.start_time,
        end_time: span.end_time,
        peer_id,
        peer: span.peer.clone(),
        is_error: span.is_error,
        refs,
    })
}

async fn resolve_reference(
    resolver: &dyn IdentifierResolver,
    r: &SegmentReference,
    segment_id: &str,
) -> Result<SegmentRef, AnalysisError> {
    let unresolved = |what: String| AnalysisError::UnresolvedIdentifier {
        segment_id: segment_id.to_string(),
        what,
    };

    let parent_service = resolver
        .service_of_instance(r.parent_instance_id)
        .await
        .ok_or_else(|| unresolved(format!("parent instance id {}", r.parent_instance_id)))?;
    let (parent_operation_id, parent_operation_name) = resolve_operation(
        resolver,
        parent_service,
        r.parent_operation_id,
        &r.parent_operation_name,
    )
    .await
    .ok_or_else(|| {
        unresolved(format!(
            "parent operation '{}' (id {})",
            r.parent_operation_name, r.parent_operation_id
        ))
    })?;

    let entry_service = resolver
        .service_of_instance(r.entry_instance_id)
        .await
        .ok_or_else(|| unresolved(format!("entry instance id {}", r.entry_instance_id)))?;
    let (entry_operation_id, entry_operation_name) = resolve_operation(
        resolver,
        entry_service,
        r.entry_operation_id,
        &r.entry_operation_name,
    )
    .await
    .ok_or_else(|| {
        unresolved(format!(
            "entry operation '{}' (id {})",
            r.entry_operation_name, r.entry_operation_id
        ))
    })?;

    let network_address_id =
        if r.network_address_id == 0 && !r.network_address.is_empty() {
            resolver
                .address_id(&r.network_address)
                .await
                .ok_or_else(|| {
                    unresolved(format!("network address '{}'", r.network_address))
                })?
        } else {
            r.network_address_id
        };

    Ok(SegmentRef {
        parent_segment_id: r
            .parent_segment_id
            .as_ref()
            .map(UniqueId::joined)
            .unwrap_or_default(),
        parent_instance_id: r.parent_instance_id,
        parent_span_id: r.parent_span_id,
        parent_operation_id,
        parent_operation_name,
        entry_instance_id: r.entry_instance_id,
        entry_operation_id,
        entry_operation_name,
        network_address_id,
    })
}

/// Resolve an operation given either its id or its literal name.
/// Returns both forms; `None` when the registry knows neither.
async fn resolve_operation(
    resolver: &dyn IdentifierResolver,
    service_id: i32,
    operation_id: i32,
    operation_name: &str,
) -> Option<(i32, String)> {
    if operation_id != 0 {
        let name = if operation_name.is_empty() {
            resolver.operation_name(operation_id).await?
        } else {
            operation_name.to_string()
        };
        return Some((operation_id, name));
    }
    if operation_name.is_empty() {
        return None;
    }
    let id = resolver.operation_id(service_id, operation_name).await?;
    Some((id, operation_name.to_string()))
}
