//! # Prometheus Metrics
//!
//! Counts committed and rejected ledger operations during a replay.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use anyhow::Context;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use vela_protocol::error::ErrorKind;

/// Holds all Prometheus metric handles for a replay.
#[derive(Clone)]
pub struct LedgerMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Operations that committed.
    pub operations_committed_total: IntCounter,
    /// Operations that aborted, labeled by error kind.
    pub operations_rejected_total: IntCounterVec,
    /// Committed events, labeled by event name.
    pub events_emitted_total: IntCounterVec,
}

impl LedgerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("vela".into()), None)?;

        let operations_committed_total = IntCounter::new(
            "operations_committed_total",
            "Total number of ledger operations that committed",
        )?;
        registry.register(Box::new(operations_committed_total.clone()))?;

        let operations_rejected_total = IntCounterVec::new(
            Opts::new(
                "operations_rejected_total",
                "Total number of ledger operations that aborted, by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(operations_rejected_total.clone()))?;

        let events_emitted_total = IntCounterVec::new(
            Opts::new(
                "events_emitted_total",
                "Total number of committed ledger events, by event name",
            ),
            &["event"],
        )?;
        registry.register(Box::new(events_emitted_total.clone()))?;

        Ok(Self {
            registry,
            operations_committed_total,
            operations_rejected_total,
            events_emitted_total,
        })
    }

    /// Records an aborted operation.
    pub fn rejected(&self, kind: ErrorKind) {
        self.operations_rejected_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Records a committed event.
    pub fn event(&self, name: &str) {
        self.events_emitted_total.with_label_values(&[name]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).context("prometheus output is not valid utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_prefix_and_labels() {
        let metrics = LedgerMetrics::new().unwrap();
        metrics.operations_committed_total.inc();
        metrics.rejected(ErrorKind::ResourceExhausted);
        metrics.rejected(ErrorKind::ResourceExhausted);
        metrics.event("purchase");

        let text = metrics.encode().unwrap();
        assert!(text.contains("vela_operations_committed_total 1"));
        assert!(text.contains("vela_operations_rejected_total{kind=\"resource_exhausted\"} 2"));
        assert!(text.contains("vela_events_emitted_total{event=\"purchase\"} 1"));
    }
}
