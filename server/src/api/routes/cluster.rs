//! Cluster endpoints: inbound record merge and membership query
//!
//! A forwarded record merges exactly like a locally produced one; the two
//! paths converge on the same shard workers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::cluster::{ClusterError, ClusterState, ShardPool};
use crate::metrics::MetricRecord;
use crate::tasks::WatermarkService;

use super::segments::backpressure_response;

#[derive(Clone)]
pub struct MergeState {
    pub shards: Arc<ShardPool>,
    pub watermark: Arc<WatermarkService>,
}

pub async fn merge(State(state): State<MergeState>, Json(record): Json<MetricRecord>) -> Response {
    if state.watermark.is_high() {
        return backpressure_response();
    }

    match state.shards.try_merge(record) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err @ ClusterError::ShardBusy { .. }) => {
            warn!(error = %err, "Rejecting forwarded record");
            backpressure_response()
        }
        Err(err) => {
            warn!(error = %err, "Cannot accept forwarded record");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

pub async fn nodes(State(cluster): State<Arc<ClusterState>>) -> Response {
    Json(cluster.view()).into_response()
}
