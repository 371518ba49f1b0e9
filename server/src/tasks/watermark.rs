//! Memory watermark controller
//!
//! Samples this process's resident set on a fixed period. Crossing the
//! configured percentage-of-total or absolute threshold flips a shared
//! flag; ingest and remote-merge handlers consult it and shed load with
//! 503 until the sampler observes recovery. Each crossing logs exactly
//! once per direction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{get_current_pid, ProcessesToUpdate, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy)]
pub struct WatermarkConfig {
    /// Percent of total system memory; 0 disables the check.
    pub limit_percent: u8,
    /// Absolute RSS bytes; 0 disables the check.
    pub limit_bytes: u64,
    pub sample_period: Duration,
}

impl WatermarkConfig {
    pub fn enabled(&self) -> bool {
        self.limit_percent > 0 || self.limit_bytes > 0
    }
}

pub struct WatermarkService {
    high: Arc<AtomicBool>,
    tx: watch::Sender<bool>,
}

/// Whether the sampled RSS exceeds either configured threshold.
fn over_limit(rss: u64, total: u64, config: &WatermarkConfig) -> bool {
    if config.limit_bytes > 0 && rss >= config.limit_bytes {
        return true;
    }
    if config.limit_percent > 0 && total > 0 {
        return rss * 100 >= total * config.limit_percent as u64;
    }
    false
}

impl Default for WatermarkService {
    fn default() -> Self {
        Self::new()
    }
}

impl WatermarkService {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            high: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::Relaxed)
    }

    /// Channel notified once per transition, both directions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, high: bool, rss: u64, total: u64) {
        if self.high.swap(high, Ordering::Relaxed) != high {
            if high {
                warn!(rss, total, "Memory watermark exceeded, shedding ingest load");
            } else {
                debug!(rss, total, "Memory watermark cleared");
            }
            // Only transitions reach subscribers.
            let _ = self.tx.send(high);
        }
    }

    pub fn spawn(
        self: &Arc<Self>,
        config: WatermarkConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let pid = match get_current_pid() {
                Ok(pid) => pid,
                Err(e) => {
                    error!(error = e, "Cannot resolve own pid, watermark disabled");
                    return;
                }
            };
            let mut system = System::new();
            let mut interval = tokio::time::interval(config.sample_period);
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Watermark sampler shutting down");
                            break;
                        }
                    }

                    _ = interval.tick() => {
                        system.refresh_memory();
                        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                        if let Some(process) = system.process(pid) {
                            let rss = process.memory();
                            let total = system.total_memory();
                            service.set(over_limit(rss, total, &config), rss, total);
                        }
                    }
                }
            }
        })
    }
}
