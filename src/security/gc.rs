//! Garbage collection of expired admission state.
//!
//! # Responsibilities
//! - Periodically sweep every gate and the inspector's short-lived counters
//! - Never evict a blocked record
//! - Stop deterministically on shutdown
//!
//! # Design Decisions
//! - `sweep_once` is public so tests drive a single pass without a timer
//! - Eviction runs through DashMap `retain`, which holds each shard's write
//!   lock, so a sweep never interleaves with a mutation of the same record

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::observability::metrics;
use crate::security::clock::Clock;
use crate::security::inspector::AnomalyInspector;
use crate::security::rate_limit::AdmissionGate;

/// A store that can drop state that is no longer needed.
pub trait Sweep: Send + Sync {
    fn store_name(&self) -> &str;

    /// Evict expired entries; returns how many were removed.
    fn sweep(&self, now: Instant, retention: Duration) -> usize;
}

impl Sweep for AdmissionGate {
    fn store_name(&self) -> &str {
        self.name()
    }

    fn sweep(&self, now: Instant, retention: Duration) -> usize {
        AdmissionGate::sweep(self, now, retention)
    }
}

impl Sweep for AnomalyInspector {
    fn store_name(&self) -> &str {
        "inspector"
    }

    fn sweep(&self, now: Instant, retention: Duration) -> usize {
        AnomalyInspector::sweep(self, now, retention)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<(String, usize)>,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.evicted.iter().map(|(_, n)| n).sum()
    }
}

pub struct GarbageCollector {
    stores: Vec<Arc<dyn Sweep>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    retention: Duration,
}

impl GarbageCollector {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration, retention: Duration) -> Self {
        Self {
            stores: Vec::new(),
            clock,
            interval,
            retention,
        }
    }

    pub fn register(&mut self, store: Arc<dyn Sweep>) {
        self.stores.push(store);
    }

    /// One pass over every registered store.
    pub fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        for store in &self.stores {
            let evicted = store.sweep(now, self.retention);
            if evicted > 0 {
                metrics::record_gc_evicted(store.store_name(), evicted);
            }
            report.evicted.push((store.store_name().to_string(), evicted));
        }
        tracing::debug!(evicted = report.total(), "Garbage collection sweep complete");
        report
    }

    /// Sweep every `interval` until shutdown is signalled.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                stores = self.stores.len(),
                "Garbage collector starting"
            );
            let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Garbage collector received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}
