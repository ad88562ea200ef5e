//! Prometheus metric registrations.
//!
//! The core registers these gauges/counters but does not own the HTTP
//! route that scrapes them (`/bundler_metrics` is a collaborator, per
//! spec.md §6); [`init`] is the demo driver's proof that registration
//! works end to end.

use eyre::Result;
use lazy_static::lazy_static;
use prometheus_exporter::{
    prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge},
    start,
};

lazy_static! {
    /// Data items successfully ingested (validated + at least one durable commit).
    pub static ref ITEMS_INGESTED: IntCounter =
        register_int_counter!("items_ingested_total", "data items successfully ingested").unwrap();
    /// Data items quarantined due to invalid signature or spec violation.
    pub static ref ITEMS_QUARANTINED: IntCounter =
        register_int_counter!("items_quarantined_total", "data items moved to quarantine").unwrap();
    /// Number of tier writes currently tracked as committed in the last ingest.
    pub static ref TIER_COMMITS: IntGauge =
        register_int_gauge!("tier_commits", "tiers committed by the most recent ingest").unwrap();
    /// Bytes currently held in-flight by the bundle assembler.
    pub static ref ASSEMBLER_INFLIGHT_BYTES: IntGauge =
        register_int_gauge!("assembler_inflight_bytes", "bytes prefetched but not yet piped").unwrap();
}

/// Starts the metrics server on the given address (e.g. `"0.0.0.0:9200"`).
pub fn init(addr: &str) -> Result<()> {
    match start(addr.parse()?) {
        Ok(_) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
