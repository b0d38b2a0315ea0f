//! Prometheus metrics for the coordination engine.
//!
//! Each engine owns its own `Registry`, so two engines in one process (or
//! two tests) never share counters.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

use crate::types::{ActionSource, ActionType};

const ACTIONS_TOTAL: &str = "coordination_engine_actions_total";
const CONFLICTS_TOTAL: &str = "coordination_engine_conflicts_total";

pub struct EngineMetrics {
    registry: Registry,
    actions_total: IntCounterVec,
    conflicts_total: IntCounterVec,
    active_actions: IntGauge,
    resolution_seconds: Histogram,
    engine_status: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let actions_total = register_int_counter_vec_with_registry!(
            ACTIONS_TOTAL,
            "Total actions submitted by type and source",
            &["action_type", "source"],
            registry
        )?;

        let conflicts_total = register_int_counter_vec_with_registry!(
            CONFLICTS_TOTAL,
            "Total conflicts detected by kind",
            &["conflict_type"],
            registry
        )?;

        let active_actions = register_int_gauge_with_registry!(
            "coordination_engine_active_actions",
            "Actions currently running",
            registry
        )?;

        let resolution_seconds = register_histogram_with_registry!(
            "coordination_engine_resolution_seconds",
            "Time spent processing one scheduler tick",
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0],
            registry
        )?;

        let engine_status = register_int_gauge_with_registry!(
            "coordination_engine_status",
            "Scheduler loop status (1 running, 0 stopped)",
            registry
        )?;

        Ok(Self {
            registry,
            actions_total,
            conflicts_total,
            active_actions,
            resolution_seconds,
            engine_status,
        })
    }

    pub fn record_submitted(&self, action_type: ActionType, source: ActionSource) {
        self.actions_total
            .with_label_values(&[action_type.as_str(), source.as_str()])
            .inc();
    }

    pub fn record_conflict(&self, kind: &str) {
        self.conflicts_total.with_label_values(&[kind]).inc();
    }

    pub fn set_active(&self, running: usize) {
        self.active_actions.set(running as i64);
    }

    pub fn observe_tick(&self, seconds: f64) {
        self.resolution_seconds.observe(seconds);
    }

    pub fn set_running(&self, running: bool) {
        self.engine_status.set(i64::from(running));
    }

    pub fn active_actions(&self) -> i64 {
        self.active_actions.get()
    }

    pub fn ticks_observed(&self) -> u64 {
        self.resolution_seconds.get_sample_count()
    }

    /// Sum of `coordination_engine_actions_total` over all label values.
    pub fn actions_submitted(&self) -> u64 {
        self.counter_total(ACTIONS_TOTAL)
    }

    /// Sum of `coordination_engine_conflicts_total` over all label values.
    pub fn conflicts_detected(&self) -> u64 {
        self.counter_total(CONFLICTS_TOTAL)
    }

    fn counter_total(&self, name: &str) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric().iter())
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
