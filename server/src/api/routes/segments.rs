//! Segment ingest endpoint
//!
//! Accepts a prost-encoded `SegmentBatch` and reports a per-segment status
//! so agents know which segments to resend. The whole batch is refused
//! while the memory watermark is set.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prost::Message;
use serde::Serialize;
use tracing::debug;

use crate::core::constants::BACKPRESSURE_RETRY_AFTER_SECS;
use crate::segment::decode::decode_segment;
use crate::segment::wire::{SegmentBatch, UniqueId};
use crate::tasks::{IngestOutcome, SegmentIntake, WatermarkService};

#[derive(Clone)]
pub struct IngestState {
    pub intake: Arc<SegmentIntake>,
    pub watermark: Arc<WatermarkService>,
}

#[derive(Serialize)]
pub struct SegmentStatus {
    pub segment_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub results: Vec<SegmentStatus>,
}

pub(crate) fn backpressure_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(
            header::RETRY_AFTER,
            BACKPRESSURE_RETRY_AFTER_SECS.to_string(),
        )],
        "Server is over its memory watermark, retry later",
    )
        .into_response()
}

pub async fn ingest(State(state): State<IngestState>, body: Bytes) -> Response {
    if state.watermark.is_high() {
        return backpressure_response();
    }

    let batch = match SegmentBatch::decode(body.as_ref()) {
        Ok(batch) => batch,
        Err(e) => {
            state.intake.note_decode_failure();
            debug!(error = %e, "Malformed segment batch");
            return (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Malformed segment batch: {e}"),
            )
                .into_response();
        }
    };

    let mut results = Vec::with_capacity(batch.segments.len());
    for upstream in batch.segments {
        let segment = match decode_segment(&upstream.segment) {
            Ok(segment) => segment,
            Err(e) => {
                state.intake.note_decode_failure();
                results.push(SegmentStatus {
                    segment_id: String::new(),
                    status: "rejected",
                    reason: Some(e.to_string()),
                });
                continue;
            }
        };
        let segment_id = segment
            .segment_id
            .as_ref()
            .map(UniqueId::joined)
            .unwrap_or_default();

        let outcome = state
            .intake
            .submit(segment, upstream.global_trace_ids)
            .await;
        results.push(match outcome {
            IngestOutcome::Accepted => SegmentStatus {
                segment_id,
                status: "accepted",
                reason: None,
            },
            IngestOutcome::Buffered => SegmentStatus {
                segment_id,
                status: "buffered",
                reason: None,
            },
            IngestOutcome::Rejected(reason) => SegmentStatus {
                segment_id,
                status: "rejected",
                reason: Some(reason),
            },
        });
    }

    (StatusCode::OK, Json(IngestResponse { results })).into_response()
}
