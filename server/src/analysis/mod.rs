//! Segment analysis: capability listeners and dispatch
//!
//! A listener declares which span shapes it cares about by returning `Some`
//! from the matching `as_*` accessor. Dispatch walks a resolved segment once
//! and fans each element out to the interested listeners, then collects the
//! partial metric records every listener built. Listener instances are
//! per-segment; they accumulate only within one dispatch pass.

pub mod dispatch;
pub mod endpoint;
pub mod instance;
pub mod node_reference;
pub mod service_reference;
pub mod trace_id;

use crate::metrics::MetricRecord;
use crate::segment::{RawSegment, SegmentRef, Span};

pub use crate::resolve::AnalysisError;
pub use dispatch::{dispatch, listener_set};

pub trait FirstSpanListener {
    fn first_span(&mut self, segment: &RawSegment, span: &Span);
}

pub trait EntrySpanListener {
    fn entry_span(&mut self, segment: &RawSegment, span: &Span);
}

pub trait ExitSpanListener {
    fn exit_span(&mut self, segment: &RawSegment, span: &Span);
}

pub trait LocalSpanListener {
    fn local_span(&mut self, segment: &RawSegment, span: &Span);
}

pub trait ReferenceListener {
    fn reference(&mut self, segment: &RawSegment, span: &Span, reference: &SegmentRef);
}

pub trait GlobalTraceIdListener {
    fn global_trace_id(&mut self, segment: &RawSegment, trace_id: &str);
}

/// Umbrella trait. Default accessors return `None`; a listener overrides
/// exactly the capabilities it implements.
pub trait SpanListener: Send {
    fn as_first(&mut self) -> Option<&mut dyn FirstSpanListener> {
        None
    }
    fn as_entry(&mut self) -> Option<&mut dyn EntrySpanListener> {
        None
    }
    fn as_exit(&mut self) -> Option<&mut dyn ExitSpanListener> {
        None
    }
    fn as_local(&mut self) -> Option<&mut dyn LocalSpanListener> {
        None
    }
    fn as_reference(&mut self) -> Option<&mut dyn ReferenceListener> {
        None
    }
    fn as_global_trace_id(&mut self) -> Option<&mut dyn GlobalTraceIdListener> {
        None
    }

    /// Called exactly once, after the whole segment has been walked.
    fn build(&mut self) -> Vec<MetricRecord>;
}
