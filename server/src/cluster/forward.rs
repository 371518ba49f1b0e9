//! Forwarding of remote-owned records to their owning node

use std::time::Duration;

use tracing::{debug, warn};

use crate::metrics::MetricRecord;

use super::membership::NodeAddr;
use super::ClusterError;

/// Candidate nodes tried per record before giving up.
pub const FORWARD_MAX_ATTEMPTS: usize = 3;

pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Posts a record to the first reachable candidate, in ring order. The
    /// owner is candidate zero; later candidates accept the record and merge
    /// it themselves, which is safe because the merge operators commute.
    pub async fn forward(
        &self,
        candidates: &[NodeAddr],
        record: &MetricRecord,
    ) -> Result<NodeAddr, ClusterError> {
        let mut last_error: Option<ClusterError> = None;
        let mut attempts: u32 = 0;

        for node in candidates.iter().take(FORWARD_MAX_ATTEMPTS) {
            attempts += 1;
            let url = format!("http://{node}/v1/cluster/merge");
            match self.client.post(&url).json(record).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(node = %node, key = record.key(), "Forwarded record");
                        return Ok(node.clone());
                    }
                    warn!(node = %node, %status, "Remote node rejected record");
                    last_error = Some(ClusterError::Rejected {
                        node: node.to_string(),
                        status,
                    });
                }
                Err(err) => {
                    warn!(node = %node, error = %err, "Forward request failed");
                    last_error = Some(ClusterError::Forward {
                        node: node.to_string(),
                        attempts,
                        source: err,
                    });
                }
            }
        }

        Err(last_error.unwrap_or(ClusterError::NoAvailableOwner {
            key: record.key(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_with_no_candidates_reports_no_owner() {
        let forwarder = Forwarder::new(Duration::from_millis(100)).unwrap();
        let record = MetricRecord::TraceAssociation(crate::metrics::TraceAssociationRecord {
            time_bucket: 202401011234,
            trace_id: "t1".to_string(),
            segments: 1,
            service_id: 1,
        });
        let err = forwarder.forward(&[], &record).await.unwrap_err();
        assert!(matches!(err, ClusterError::NoAvailableOwner { .. }));
    }

    #[tokio::test]
    async fn test_forward_to_unreachable_node_reports_transport_error() {
        let forwarder = Forwarder::new(Duration::from_millis(200)).unwrap();
        let record = MetricRecord::TraceAssociation(crate::metrics::TraceAssociationRecord {
            time_bucket: 202401011234,
            trace_id: "t1".to_string(),
            segments: 1,
            service_id: 1,
        });
        let candidates = vec![NodeAddr {
            host: "127.0.0.1".to_string(),
            // Reserved port, nothing listens here.
            port: 1,
        }];
        let err = forwarder.forward(&candidates, &record).await.unwrap_err();
        assert!(matches!(err, ClusterError::Forward { attempts: 1, .. }));
    }

    #[test]
    fn test_rejected_status_is_retryable_only_for_backpressure() {
        let busy = ClusterError::Rejected {
            node: "a:1".to_string(),
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        };
        assert!(busy.is_transient());

        let bad = ClusterError::Rejected {
            node: "a:1".to_string(),
            status: reqwest::StatusCode::BAD_REQUEST,
        };
        assert!(!bad.is_transient());
    }
}
