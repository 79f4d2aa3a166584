//! Metric references and the time-series backend boundary.
//!
//! Widgets never own metric data. They hold `MetricRef`s resolved through
//! the registry and pull (date, value) series from a `MetricStore` at
//! report time.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lightweight handle for a metric known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRef {
    pub id: String,
    pub name: String,
}

impl MetricRef {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let name = id.clone();
        Self { id, name }
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// Backend producing per-date numeric series for a metric.
///
/// Ordering is by date ascending. Values may originate as integers in the
/// backend; they cross this boundary as f64.
pub trait MetricStore {
    fn data_series(&self, metric: &MetricRef) -> Result<Vec<(NaiveDate, f64)>>;
}

/// In-memory store, used at bootstrap and in tests.
#[derive(Debug, Default)]
pub struct MemoryMetricStore {
    series: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metric_id: &str, day: NaiveDate, value: f64) {
        self.series
            .entry(metric_id.to_string())
            .or_default()
            .insert(day, value);
    }
}

impl MetricStore for MemoryMetricStore {
    fn data_series(&self, metric: &MetricRef) -> Result<Vec<(NaiveDate, f64)>> {
        Ok(self
            .series
            .get(&metric.id)
            .map(|days| days.iter().map(|(d, v)| (*d, *v)).collect())
            .unwrap_or_default())
    }
}
