//! Shard workers for locally owned metric records
//!
//! Records the ring assigns to this node are partitioned by key hash across
//! a fixed set of single-threaded workers. Each worker owns its accumulator
//! map outright, so merges never contend on a lock. Drain hands the whole
//! dirty set to the persistence timer and resets the worker.

use std::collections::HashMap;
use std::hash::Hasher;

use rustc_hash::FxHasher;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::metrics::MetricRecord;

use super::ClusterError;

pub enum ShardCommand {
    Merge(MetricRecord),
    Drain(oneshot::Sender<Vec<MetricRecord>>),
}

pub struct ShardPool {
    senders: Vec<mpsc::Sender<ShardCommand>>,
}

fn shard_of(key: &str, shards: usize) -> usize {
    let mut hasher = FxHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() % shards as u64) as usize
}

impl ShardPool {
    /// Starts `num_shards` workers. Each worker runs until the shutdown
    /// signal fires or its channel closes.
    pub fn start(
        num_shards: usize,
        capacity: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, Vec<tokio::task::JoinHandle<()>>) {
        let mut senders = Vec::with_capacity(num_shards);
        let mut handles = Vec::with_capacity(num_shards);
        for shard_id in 0..num_shards {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(shard_worker(shard_id, rx, shutdown)));
        }
        (Self { senders }, handles)
    }

    pub fn num_shards(&self) -> usize {
        self.senders.len()
    }

    /// Merges a record into its shard, waiting for channel space.
    pub async fn merge(&self, record: MetricRecord) -> Result<(), ClusterError> {
        let shard = shard_of(&record.key(), self.senders.len());
        self.senders[shard]
            .send(ShardCommand::Merge(record))
            .await
            .map_err(|_| ClusterError::WorkersStopped)
    }

    /// Non-blocking merge for request handlers. A full channel is reported
    /// as backpressure rather than waited out.
    pub fn try_merge(&self, record: MetricRecord) -> Result<(), ClusterError> {
        let shard = shard_of(&record.key(), self.senders.len());
        self.senders[shard]
            .try_send(ShardCommand::Merge(record))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => ClusterError::ShardBusy { shard },
                mpsc::error::TrySendError::Closed(_) => ClusterError::WorkersStopped,
            })
    }

    /// Collects the dirty records of every shard, clearing them.
    pub async fn drain_all(&self) -> Result<Vec<MetricRecord>, ClusterError> {
        let mut out = Vec::new();
        for sender in &self.senders {
            let (tx, rx) = oneshot::channel();
            sender
                .send(ShardCommand::Drain(tx))
                .await
                .map_err(|_| ClusterError::WorkersStopped)?;
            let records = rx.await.map_err(|_| ClusterError::WorkersStopped)?;
            out.extend(records);
        }
        Ok(out)
    }
}

async fn shard_worker(
    shard_id: usize,
    mut rx: mpsc::Receiver<ShardCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut records: HashMap<String, MetricRecord> = HashMap::new();
    debug!(shard_id, "Shard worker started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                // A dropped sender is a shutdown too, otherwise this arm
                // resolves instantly forever and starves the channel.
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(shard_id, pending = records.len(), "Shard worker shutting down");
                    // Remaining commands are handled by the final drain the
                    // persistence timer issues before the store closes.
                    while let Ok(command) = rx.try_recv() {
                        apply(shard_id, &mut records, command);
                    }
                    break;
                }
            }

            command = rx.recv() => {
                match command {
                    Some(command) => apply(shard_id, &mut records, command),
                    None => break,
                }
            }
        }
    }
}

fn apply(shard_id: usize, records: &mut HashMap<String, MetricRecord>, command: ShardCommand) {
    match command {
        ShardCommand::Merge(incoming) => {
            let key = incoming.key();
            match records.get_mut(&key) {
                Some(existing) => {
                    if let Err(err) = existing.merge(&incoming) {
                        warn!(shard_id, key, error = %err, "Dropping unmergeable record");
                    }
                }
                None => {
                    records.insert(key, incoming);
                }
            }
        }
        ShardCommand::Drain(reply) => {
            let drained: Vec<MetricRecord> = records.drain().map(|(_, record)| record).collect();
            // The timer may have shut down between sending and receiving.
            let _ = reply.send(drained);
        }
    }
}
