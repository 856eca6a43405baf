//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_admission_total` (counter): admission decisions by policy, outcome
//! - `guard_auto_blocks_total` (counter): identities or addresses auto-blocked, by source
//! - `guard_inspection_total` (counter): inspector verdicts by outcome
//! - `guard_audit_dropped_total` (counter): audit events lost to a full queue
//! - `guard_audit_sink_errors_total` (counter): failed sink writes
//! - `guard_gc_evicted_total` (counter): records evicted by the collector, by store
//! - `guard_tracked_identities` (gauge): live admission records per policy
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests call these helpers unconditionally.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

static DESCRIBED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;
    describe_metrics();
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

fn describe_metrics() {
    if DESCRIBED.set(()).is_err() {
        return;
    }
    describe_counter!("guard_admission_total", "Admission decisions by policy and outcome");
    describe_counter!("guard_auto_blocks_total", "Automatic blocks by source");
    describe_counter!("guard_inspection_total", "Inspector verdicts by outcome");
    describe_counter!("guard_audit_dropped_total", "Audit events dropped on a full queue");
    describe_counter!("guard_audit_sink_errors_total", "Audit sink write failures");
    describe_counter!("guard_gc_evicted_total", "Records evicted by the garbage collector");
    describe_gauge!("guard_tracked_identities", "Live admission records per policy");
}

pub fn record_admission(policy: &str, outcome: &'static str) {
    counter!("guard_admission_total", "policy" => policy.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_auto_block(source: &'static str) {
    counter!("guard_auto_blocks_total", "source" => source).increment(1);
}

pub fn record_inspection(outcome: &'static str) {
    counter!("guard_inspection_total", "outcome" => outcome).increment(1);
}

pub fn record_audit_dropped() {
    counter!("guard_audit_dropped_total").increment(1);
}

pub fn record_audit_sink_error() {
    counter!("guard_audit_sink_errors_total").increment(1);
}

pub fn record_gc_evicted(store: &str, evicted: usize) {
    counter!("guard_gc_evicted_total", "store" => store.to_string()).increment(evicted as u64);
}

pub fn record_tracked_identities(policy: &str, count: usize) {
    gauge!("guard_tracked_identities", "policy" => policy.to_string()).set(count as f64);
}
