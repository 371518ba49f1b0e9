//! Typed metric records and their merge algebra
//!
//! Every record declares how each of its columns combines when two partial
//! records for the same key meet: counters add (`sum_into`), last-write
//! columns overwrite (`cover`), set-once columns keep the first value
//! (`keep`), and extremes take max/min. The operators are associative and
//! commutative (except cover/keep, which are order-dependent by design), so
//! the same `merge` runs in shard workers, on the remote-merge endpoint, and
//! in the read-merge-write persistence path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bucket::Granularity;

/// Separator for composite record keys (time bucket + entity identifiers)
pub const KEY_SEPARATOR: &str = "_";

/// Latency band boundaries in milliseconds
pub const BAND_1S_MS: i64 = 1_000;
pub const BAND_3S_MS: i64 = 3_000;
pub const BAND_5S_MS: i64 = 5_000;

#[derive(Error, Debug, PartialEq)]
pub enum MergeError {
    #[error("cannot merge {incoming} record into {existing} record")]
    TypeMismatch {
        existing: &'static str,
        incoming: &'static str,
    },
    #[error("cannot merge record {incoming} into record {existing}")]
    KeyMismatch { existing: String, incoming: String },
}

// =============================================================================
// Merge operators
// =============================================================================

fn sum_into(dst: &mut i64, src: i64) {
    *dst += src;
}

/// Last write wins. Safe within a flush interval because each key is owned
/// by exactly one shard worker.
fn cover(dst: &mut i64, src: i64) {
    *dst = src;
}

/// First write wins. Zero means unset.
fn keep(dst: &mut i64, src: i64) {
    if *dst == 0 {
        *dst = src;
    }
}

fn max_into(dst: &mut i64, src: i64) {
    if src > *dst {
        *dst = src;
    }
}

// =============================================================================
// Latency bands
// =============================================================================

/// Shared latency-band column block for reference records.
///
/// Each observed call lands in exactly one band: the error band when the
/// span failed, otherwise the band its cost falls into. `summary` and
/// `cost_sum` count every call regardless of band. All columns are sums.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LatencyBands {
    pub lte_1s: i64,
    pub lte_3s: i64,
    pub lte_5s: i64,
    pub gt_5s: i64,
    pub error: i64,
    pub summary: i64,
    pub cost_sum: i64,
}

impl LatencyBands {
    /// Record one call with the given cost in milliseconds.
    pub fn observe(&mut self, cost_ms: i64, is_error: bool) {
        if is_error {
            self.error += 1;
        } else if cost_ms <= BAND_1S_MS {
            self.lte_1s += 1;
        } else if cost_ms <= BAND_3S_MS {
            self.lte_3s += 1;
        } else if cost_ms <= BAND_5S_MS {
            self.lte_5s += 1;
        } else {
            self.gt_5s += 1;
        }
        self.summary += 1;
        self.cost_sum += cost_ms;
    }

    pub fn merge(&mut self, other: &LatencyBands) {
        sum_into(&mut self.lte_1s, other.lte_1s);
        sum_into(&mut self.lte_3s, other.lte_3s);
        sum_into(&mut self.lte_5s, other.lte_5s);
        sum_into(&mut self.gt_5s, other.gt_5s);
        sum_into(&mut self.error, other.error);
        sum_into(&mut self.summary, other.summary);
        sum_into(&mut self.cost_sum, other.cost_sum);
    }
}

// =============================================================================
// Record structs
// =============================================================================

/// Call edge from a service instance to a downstream peer (from Exit spans).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeReferenceRecord {
    pub time_bucket: i64,
    pub front_instance_id: i32,
    pub behind_peer: String,
    #[serde(flatten)]
    pub bands: LatencyBands,
}

/// Call edge between endpoints, attributed to the entry endpoint of the
/// originating request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceReferenceRecord {
    pub time_bucket: i64,
    pub entry_endpoint: String,
    pub front_endpoint: String,
    pub behind_endpoint: String,
    #[serde(flatten)]
    pub bands: LatencyBands,
}

/// Per-instance throughput and liveness.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstancePerfRecord {
    pub time_bucket: i64,
    pub instance_id: i32,
    /// Sum
    pub calls: i64,
    /// Sum
    pub cost_sum: i64,
    /// Keep: first observation in the bucket
    pub first_seen: i64,
    /// Cover: most recent observation wins
    pub last_heartbeat: i64,
}

/// Per-endpoint call statistics (from Entry spans).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointRecord {
    pub time_bucket: i64,
    pub service_id: i32,
    pub endpoint: String,
    pub calls: i64,
    pub errors: i64,
    pub duration_sum: i64,
    /// Max
    pub duration_max: i64,
    /// Min, meaningful whenever `calls > 0`
    pub duration_min: i64,
}

/// Association between a global trace id and the segments that declared it.
/// Intentionally not deduplicated: the count is segment frequency.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TraceAssociationRecord {
    pub time_bucket: i64,
    pub trace_id: String,
    pub segments: i64,
    /// Keep: service that first declared the trace id in this bucket
    pub service_id: i64,
}

// =============================================================================
// Tagged union
// =============================================================================

/// A partial metric record flowing from analysis listeners through the
/// aggregation router to storage.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricRecord {
    NodeReference(NodeReferenceRecord),
    ServiceReference(ServiceReferenceRecord),
    InstancePerf(InstancePerfRecord),
    Endpoint(EndpointRecord),
    TraceAssociation(TraceAssociationRecord),
}

impl MetricRecord {
    /// Stable table names, one per record variant.
    pub const TYPES: [&'static str; 5] = [
        "node_reference",
        "service_reference",
        "instance_perf",
        "endpoint",
        "trace_association",
    ];

    pub fn record_type(&self) -> &'static str {
        match self {
            MetricRecord::NodeReference(_) => "node_reference",
            MetricRecord::ServiceReference(_) => "service_reference",
            MetricRecord::InstancePerf(_) => "instance_perf",
            MetricRecord::Endpoint(_) => "endpoint",
            MetricRecord::TraceAssociation(_) => "trace_association",
        }
    }

    pub fn time_bucket(&self) -> i64 {
        match self {
            MetricRecord::NodeReference(r) => r.time_bucket,
            MetricRecord::ServiceReference(r) => r.time_bucket,
            MetricRecord::InstancePerf(r) => r.time_bucket,
            MetricRecord::Endpoint(r) => r.time_bucket,
            MetricRecord::TraceAssociation(r) => r.time_bucket,
        }
    }

    fn set_time_bucket(&mut self, bucket: i64) {
        match self {
            MetricRecord::NodeReference(r) => r.time_bucket = bucket,
            MetricRecord::ServiceReference(r) => r.time_bucket = bucket,
            MetricRecord::InstancePerf(r) => r.time_bucket = bucket,
            MetricRecord::Endpoint(r) => r.time_bucket = bucket,
            MetricRecord::TraceAssociation(r) => r.time_bucket = bucket,
        }
    }

    pub fn granularity(&self) -> Granularity {
        Granularity::of_bucket(self.time_bucket())
    }

    /// Composite aggregation key: time bucket plus entity identifiers.
    /// Records with equal keys are mergeable.
    pub fn key(&self) -> String {
        match self {
            MetricRecord::NodeReference(r) => [
                r.time_bucket.to_string(),
                r.front_instance_id.to_string(),
                r.behind_peer.clone(),
            ]
            .join(KEY_SEPARATOR),
            MetricRecord::ServiceReference(r) => [
                r.time_bucket.to_string(),
                r.entry_endpoint.clone(),
                r.front_endpoint.clone(),
                r.behind_endpoint.clone(),
            ]
            .join(KEY_SEPARATOR),
            MetricRecord::InstancePerf(r) => [
                r.time_bucket.to_string(),
                r.instance_id.to_string(),
            ]
            .join(KEY_SEPARATOR),
            MetricRecord::Endpoint(r) => [
                r.time_bucket.to_string(),
                r.service_id.to_string(),
                r.endpoint.clone(),
            ]
            .join(KEY_SEPARATOR),
            MetricRecord::TraceAssociation(r) => {
                [r.time_bucket.to_string(), r.trace_id.clone()].join(KEY_SEPARATOR)
            }
        }
    }

    /// Merge a record for the same key into this one, column by column
    /// according to each column's operator.
    pub fn merge(&mut self, other: &MetricRecord) -> Result<(), MergeError> {
        if self.key() != other.key() {
            return Err(MergeError::KeyMismatch {
                existing: self.key(),
                incoming: other.key(),
            });
        }
        match (self, other) {
            (MetricRecord::NodeReference(a), MetricRecord::NodeReference(b)) => {
                a.bands.merge(&b.bands);
            }
            (MetricRecord::ServiceReference(a), MetricRecord::ServiceReference(b)) => {
                a.bands.merge(&b.bands);
            }
            (MetricRecord::InstancePerf(a), MetricRecord::InstancePerf(b)) => {
                sum_into(&mut a.calls, b.calls);
                sum_into(&mut a.cost_sum, b.cost_sum);
                keep(&mut a.first_seen, b.first_seen);
                cover(&mut a.last_heartbeat, b.last_heartbeat);
            }
            (MetricRecord::Endpoint(a), MetricRecord::Endpoint(b)) => {
                // A side with no calls has no minimum; with calls on both
                // sides a genuine 0ms observation is a real minimum.
                if a.calls == 0 {
                    a.duration_min = b.duration_min;
                } else if b.calls > 0 && b.duration_min < a.duration_min {
                    a.duration_min = b.duration_min;
                }
                sum_into(&mut a.calls, b.calls);
                sum_into(&mut a.errors, b.errors);
                sum_into(&mut a.duration_sum, b.duration_sum);
                max_into(&mut a.duration_max, b.duration_max);
            }
            (MetricRecord::TraceAssociation(a), MetricRecord::TraceAssociation(b)) => {
                sum_into(&mut a.segments, b.segments);
                keep(&mut a.service_id, b.service_id);
            }
            (existing, incoming) => {
                return Err(MergeError::TypeMismatch {
                    existing: existing.record_type(),
                    incoming: incoming.record_type(),
                });
            }
        }
        Ok(())
    }

    /// Copy of this record re-bucketed at a coarser granularity. The caller
    /// merges the copy into whatever is already stored under the coarser
    /// key; values are never re-derived from raw spans.
    pub fn rollup(&self, granularity: Granularity) -> MetricRecord {
        let mut rolled = self.clone();
        rolled.set_time_bucket(granularity.truncate_minute(self.time_bucket()));
        rolled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_ref(cost_ms: i64, is_error: bool) -> MetricRecord {
        let mut bands = LatencyBands::default();
        bands.observe(cost_ms, is_error);
        MetricRecord::NodeReference(NodeReferenceRecord {
            time_bucket: 202401011200,
            front_instance_id: 7,
            behind_peer: "10.0.0.2:9200".to_string(),
            bands,
        })
    }

    fn instance_perf(first_seen: i64, heartbeat: i64) -> MetricRecord {
        MetricRecord::InstancePerf(InstancePerfRecord {
            time_bucket: 202401011200,
            instance_id: 3,
            calls: 1,
            cost_sum: 40,
            first_seen,
            last_heartbeat: heartbeat,
        })
    }

    #[test]
    fn test_banding_mid_band() {
        let mut bands = LatencyBands::default();
        bands.observe(500, false);
        assert_eq!(bands.lte_1s, 1);
        assert_eq!(bands.lte_3s + bands.lte_5s + bands.gt_5s + bands.error, 0);
        assert_eq!(bands.summary, 1);
        assert_eq!(bands.cost_sum, 500);
    }

    #[test]
    fn test_banding_boundaries() {
        let mut bands = LatencyBands::default();
        bands.observe(1000, false);
        bands.observe(1001, false);
        bands.observe(5000, false);
        bands.observe(6000, false);
        assert_eq!(bands.lte_1s, 1);
        assert_eq!(bands.lte_3s, 1);
        assert_eq!(bands.lte_5s, 1);
        assert_eq!(bands.gt_5s, 1);
        assert_eq!(bands.summary, 4);
    }

    #[test]
    fn test_banding_error_overrides_cost() {
        let mut bands = LatencyBands::default();
        bands.observe(500, true);
        assert_eq!(bands.error, 1);
        assert_eq!(bands.lte_1s, 0);
        assert_eq!(bands.summary, 1);
        assert_eq!(bands.cost_sum, 500);
    }

    #[test]
    fn test_sum_merge_is_order_independent() {
        let records = [node_ref(100, false), node_ref(2000, false), node_ref(0, true)];

        let mut forward = records[0].clone();
        forward.merge(&records[1]).unwrap();
        forward.merge(&records[2]).unwrap();

        let mut backward = records[2].clone();
        backward.merge(&records[1]).unwrap();
        backward.merge(&records[0]).unwrap();

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_sum_double_delivery_doubles() {
        // At-least-once redelivery is visible in sum columns. This is the
        // accepted trade-off; cover/keep columns stay stable.
        let rec = node_ref(100, false);
        let mut acc = rec.clone();
        acc.merge(&rec).unwrap();
        match acc {
            MetricRecord::NodeReference(r) => {
                assert_eq!(r.bands.summary, 2);
                assert_eq!(r.bands.cost_sum, 200);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_keep_and_cover_double_delivery_idempotent() {
        let rec = instance_perf(1000, 2000);
        let mut acc = rec.clone();
        acc.merge(&rec).unwrap();
        match &acc {
            MetricRecord::InstancePerf(r) => {
                assert_eq!(r.first_seen, 1000);
                assert_eq!(r.last_heartbeat, 2000);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_keep_takes_first_cover_takes_last() {
        let mut acc = instance_perf(1000, 1000);
        acc.merge(&instance_perf(5000, 5000)).unwrap();
        match acc {
            MetricRecord::InstancePerf(r) => {
                assert_eq!(r.first_seen, 1000);
                assert_eq!(r.last_heartbeat, 5000);
                assert_eq!(r.calls, 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_endpoint_max_min() {
        let make = |dur: i64| {
            MetricRecord::Endpoint(EndpointRecord {
                time_bucket: 202401011200,
                service_id: 1,
                endpoint: "/orders".to_string(),
                calls: 1,
                errors: 0,
                duration_sum: dur,
                duration_max: dur,
                duration_min: dur,
            })
        };
        let mut acc = make(300);
        acc.merge(&make(100)).unwrap();
        acc.merge(&make(900)).unwrap();
        match acc {
            MetricRecord::Endpoint(r) => {
                assert_eq!(r.duration_max, 900);
                assert_eq!(r.duration_min, 100);
                assert_eq!(r.duration_sum, 1300);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_endpoint_zero_ms_minimum_survives_merge() {
        let make = |dur: i64| {
            MetricRecord::Endpoint(EndpointRecord {
                time_bucket: 202401011200,
                service_id: 1,
                endpoint: "/orders".to_string(),
                calls: 1,
                errors: 0,
                duration_sum: dur,
                duration_max: dur,
                duration_min: dur,
            })
        };
        let mut acc = make(0);
        acc.merge(&make(5)).unwrap();
        match &acc {
            MetricRecord::Endpoint(r) => assert_eq!(r.duration_min, 0),
            _ => unreachable!(),
        }
        // And arriving second, a 0ms call still lowers the minimum.
        let mut acc = make(5);
        acc.merge(&make(0)).unwrap();
        match &acc {
            MetricRecord::Endpoint(r) => assert_eq!(r.duration_min, 0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_merge_rejects_key_mismatch() {
        let mut a = node_ref(100, false);
        let b = MetricRecord::NodeReference(NodeReferenceRecord {
            time_bucket: 202401011201,
            front_instance_id: 7,
            behind_peer: "10.0.0.2:9200".to_string(),
            bands: LatencyBands::default(),
        });
        assert!(matches!(a.merge(&b), Err(MergeError::KeyMismatch { .. })));
    }

    #[test]
    fn test_merge_rejects_type_mismatch() {
        // Same-type keys can never collide across variants in practice, but
        // the remote-merge endpoint accepts arbitrary payloads.
        let mut a = node_ref(100, false);
        let b = instance_perf(1, 1);
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn test_rollup_truncates_bucket_only() {
        let rec = node_ref(100, false);
        let hour = rec.rollup(Granularity::Hour);
        assert_eq!(hour.time_bucket(), 2024010112);
        assert_eq!(hour.record_type(), rec.record_type());
        match (rec, hour) {
            (MetricRecord::NodeReference(a), MetricRecord::NodeReference(b)) => {
                assert_eq!(a.bands, b.bands);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_rollup_merges_into_existing_hour_totals() {
        let rec = node_ref(100, false);
        let mut stored = node_ref(2000, false).rollup(Granularity::Hour);
        stored.merge(&rec.rollup(Granularity::Hour)).unwrap();
        match stored {
            MetricRecord::NodeReference(r) => {
                assert_eq!(r.bands.summary, 2);
                assert_eq!(r.bands.cost_sum, 2100);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let rec = node_ref(100, false);
        let json = serde_json::to_string(&rec).unwrap();
        let back: MetricRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
