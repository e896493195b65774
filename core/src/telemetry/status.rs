use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MetricsRecorder;

/// Read-only snapshot of a stage for external monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub name: String,
    pub enabled: bool,
    pub processed: usize,
    pub emitted: usize,
    pub rejected: usize,
    pub delivery_failures: usize,
    pub counters: BTreeMap<String, f64>,
}

impl StageStatus {
    pub fn new(name: &str, enabled: bool, metrics: &MetricsRecorder) -> Self {
        let snapshot = metrics.snapshot();
        Self {
            name: name.to_string(),
            enabled,
            processed: snapshot.processed,
            emitted: snapshot.emitted,
            rejected: snapshot.rejected,
            delivery_failures: snapshot.delivery_failures,
            counters: BTreeMap::new(),
        }
    }

    pub fn with_counter(mut self, name: &str, value: f64) -> Self {
        self.counters.insert(name.to_string(), value);
        self
    }

    pub fn counter(&self, name: &str) -> Option<f64> {
        self.counters.get(name).copied()
    }
}
