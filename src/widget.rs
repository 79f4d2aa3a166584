//! Widget entity, declarative configuration API, and the derived-metric
//! computation engine.
//!
//! A widget is a named description of a derived metric: either a rate
//! (numerator/denominator ratio per date) or a group of metrics assigned to
//! chart axes. Configuration happens once, inside a definition body; the
//! reporting queries (`rate_data`, `chart_data`) are read-only and pull raw
//! series from the metric store on demand.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::WidgetError;
use crate::metric::{MetricRef, MetricStore};
use crate::registry::Registry;

// =============================================================================
// Configuration types
// =============================================================================

/// Per-metric chart options. Axis numbering starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricOptions {
    pub y_axis: u32,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self { y_axis: 1 }
    }
}

impl MetricOptions {
    pub fn apply(&mut self, patch: MetricOptionsPatch) {
        if let Some(axis) = patch.y_axis {
            self.y_axis = axis;
        }
    }
}

/// Partial options, merged over defaults or an existing entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricOptionsPatch {
    pub y_axis: Option<u32>,
}

impl MetricOptionsPatch {
    pub fn y_axis(axis: u32) -> Self {
        Self { y_axis: Some(axis) }
    }
}

/// One entry in a widget's ordered metric list. Insertion order drives
/// chart legend ordering.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSlot {
    pub id: String,
    pub metric: MetricRef,
    pub options: MetricOptions,
}

/// Ancillary widget configuration.
#[derive(Debug, Clone, Default)]
pub struct WidgetOptions {
    pub stack: bool,
    pub as_percentages: bool,
    pub numerator: Option<MetricRef>,
    pub denominator: Option<MetricRef>,
}

/// Rendering flags accepted by `graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFlag {
    Stack,
    AsPercentages,
}

/// Axis declaration shapes accepted by `set_y_axis`.
#[derive(Debug, Clone)]
pub enum AxisSpec {
    /// Explicit axis assignments: (axis number, metric ids on that axis).
    Assign(Vec<(u32, Vec<String>)>),
    /// Plain metric list, all on axis 1. Must be non-empty.
    List(Vec<String>),
}

/// One chartable series: a metric's raw points plus its axis assignment.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub metric_id: String,
    pub name: String,
    pub y_axis: u32,
    pub points: Vec<(NaiveDate, f64)>,
}

// =============================================================================
// Widget
// =============================================================================

#[derive(Debug, Default)]
pub struct Widget {
    id: String,
    name: Option<String>,
    description: Option<String>,
    bounds: (Option<f64>, Option<f64>),
    metrics: Vec<MetricSlot>,
    options: WidgetOptions,
    rate_values: OnceLock<BTreeMap<NaiveDate, f64>>,
}

impl Widget {
    /// Takes the fully composed id ("<script_id>.<suffix>"). Ids are
    /// immutable after construction.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, text: impl Into<String>) {
        self.name = Some(text.into());
    }

    /// Reporting label: the name when set, the id otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, text: impl Into<String>) {
        self.description = Some(text.into());
    }

    /// Acceptable range as (low, high), either side unbounded. Alerts built
    /// on top of the registry compare reported values against these; this
    /// layer only stores them.
    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        self.bounds
    }

    pub fn set_bounds(&mut self, low: Option<f64>, high: Option<f64>) {
        self.bounds = (low, high);
    }

    pub fn stack(&self) -> bool {
        self.options.stack
    }

    pub fn set_stack(&mut self, value: bool) {
        self.options.stack = value;
    }

    pub fn options(&self) -> &WidgetOptions {
        &self.options
    }

    pub fn metrics(&self) -> &[MetricSlot] {
        &self.metrics
    }

    pub fn metric_slot(&self, id: &str) -> Option<&MetricSlot> {
        self.metrics.iter().find(|slot| slot.id == id)
    }

    // -------------------------------------------------------------------------
    // Declarative configuration (called from definition bodies)
    // -------------------------------------------------------------------------

    /// Wholesale replacement of the metric list. Every id must resolve.
    pub fn set_metrics(&mut self, registry: &Registry, ids: &[&str]) -> Result<(), WidgetError> {
        let mut slots = Vec::with_capacity(ids.len());
        for id in ids {
            slots.push(MetricSlot {
                id: (*id).to_string(),
                metric: registry.metric(id)?.clone(),
                options: MetricOptions::default(),
            });
        }
        self.metrics = slots;
        Ok(())
    }

    /// Insert or overwrite a single metric entry, patch merged over the
    /// axis-1 default.
    pub fn add_metric(
        &mut self,
        registry: &Registry,
        id: &str,
        patch: MetricOptionsPatch,
    ) -> Result<(), WidgetError> {
        let mut options = MetricOptions::default();
        options.apply(patch);
        let slot = MetricSlot {
            id: id.to_string(),
            metric: registry.metric(id)?.clone(),
            options,
        };
        match self.metrics.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = slot,
            None => self.metrics.push(slot),
        }
        Ok(())
    }

    /// Merge into an existing entry's options, or create the entry.
    pub fn update_or_create_metric(
        &mut self,
        registry: &Registry,
        id: &str,
        patch: MetricOptionsPatch,
    ) -> Result<(), WidgetError> {
        if let Some(slot) = self.metrics.iter_mut().find(|s| s.id == id) {
            slot.options.apply(patch);
            return Ok(());
        }
        self.add_metric(registry, id, patch)
    }

    /// Axis declaration. An explicit assignment map updates or creates each
    /// named metric with its axis; a plain non-empty list is shorthand for
    /// `set_metrics` (everything on axis 1). An empty list is malformed.
    pub fn set_y_axis(&mut self, registry: &Registry, spec: AxisSpec) -> Result<(), WidgetError> {
        match spec {
            AxisSpec::Assign(pairs) => {
                for (axis, ids) in pairs {
                    for id in ids {
                        self.update_or_create_metric(
                            registry,
                            &id,
                            MetricOptionsPatch::y_axis(axis),
                        )?;
                    }
                }
                Ok(())
            }
            AxisSpec::List(ids) if !ids.is_empty() => {
                let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                self.set_metrics(registry, &refs)
            }
            AxisSpec::List(_) => Err(WidgetError::InvalidAxisSpec),
        }
    }

    pub fn set_numerator(&mut self, registry: &Registry, id: &str) -> Result<(), WidgetError> {
        self.options.numerator = Some(registry.metric(id)?.clone());
        Ok(())
    }

    pub fn set_denominator(&mut self, registry: &Registry, id: &str) -> Result<(), WidgetError> {
        self.options.denominator = Some(registry.metric(id)?.clone());
        Ok(())
    }

    /// Mark rendering flags. Percentage rendering is only supported stacked,
    /// so `AsPercentages` forces `stack` on.
    pub fn graph(&mut self, flags: &[GraphFlag]) {
        for flag in flags {
            match flag {
                GraphFlag::Stack => self.options.stack = true,
                GraphFlag::AsPercentages => self.options.as_percentages = true,
            }
        }
        if flags.contains(&GraphFlag::AsPercentages) {
            self.options.stack = true;
        }
    }

    // -------------------------------------------------------------------------
    // Computation engine
    // -------------------------------------------------------------------------

    /// Date-ordered ratio series for a rate widget. Computed once per
    /// instance; later calls return the cached map without touching the
    /// store.
    ///
    /// Semantics per date: seeded with the raw numerator value, then every
    /// date present in the denominator series is overwritten with
    /// numerator/denominator (0 when the denominator is 0, never an error),
    /// scaled by 100 when `as_percentages` is set. Dates present only in the
    /// numerator series keep the raw numerator value; callers must account
    /// for that (see tests).
    pub fn rate_data(
        &self,
        store: &dyn MetricStore,
    ) -> Result<&BTreeMap<NaiveDate, f64>, WidgetError> {
        if let Some(cached) = self.rate_values.get() {
            return Ok(cached);
        }
        let computed = self.compute_rate(store)?;
        Ok(self.rate_values.get_or_init(|| computed))
    }

    fn compute_rate(&self, store: &dyn MetricStore) -> Result<BTreeMap<NaiveDate, f64>, WidgetError> {
        let numerator = self.options.numerator.as_ref().ok_or_else(|| {
            WidgetError::NotRateWidget { id: self.id.clone() }
        })?;
        let denominator = self.options.denominator.as_ref().ok_or_else(|| {
            WidgetError::NotRateWidget { id: self.id.clone() }
        })?;

        let mut values = BTreeMap::new();
        for (date, value) in store.data_series(numerator)? {
            values.insert(date, value);
        }
        for (date, value) in store.data_series(denominator)? {
            let seeded = values.get(&date).copied().unwrap_or(0.0);
            let mut ratio = if value > 0.0 { seeded / value } else { 0.0 };
            if self.options.as_percentages {
                ratio *= 100.0;
            }
            values.insert(date, ratio);
        }
        Ok(values)
    }

    /// Metric slots grouped by axis number, insertion order kept within
    /// each axis.
    pub fn axis_groups(&self) -> BTreeMap<u32, Vec<&MetricSlot>> {
        let mut groups: BTreeMap<u32, Vec<&MetricSlot>> = BTreeMap::new();
        for slot in &self.metrics {
            groups.entry(slot.options.y_axis).or_default().push(slot);
        }
        groups
    }

    /// One raw series per metric slot, in insertion order, ready for the
    /// chart renderer.
    pub fn chart_data(&self, store: &dyn MetricStore) -> Result<Vec<ChartSeries>, WidgetError> {
        let mut series = Vec::with_capacity(self.metrics.len());
        for slot in &self.metrics {
            series.push(ChartSeries {
                metric_id: slot.id.clone(),
                name: slot.metric.name.clone(),
                y_axis: slot.options.y_axis,
                points: store.data_series(&slot.metric)?,
            });
        }
        Ok(series)
    }
}

// =============================================================================
// Capability probing
// =============================================================================

/// Optional reporting surface. Report renderers hold `&dyn Reportable` and
/// never need to know whether a concrete widget implements every accessor;
/// the defaults are the neutral values.
pub trait Reportable {
    fn name(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> Option<&str> {
        None
    }

    fn bounds(&self) -> (Option<f64>, Option<f64>) {
        (None, None)
    }

    fn metrics(&self) -> Option<&[MetricSlot]> {
        None
    }
}

impl Reportable for Widget {
    fn name(&self) -> Option<&str> {
        Some(self.label())
    }

    fn description(&self) -> Option<&str> {
        Widget::description(self)
    }

    fn bounds(&self) -> (Option<f64>, Option<f64>) {
        Widget::bounds(self)
    }

    fn metrics(&self) -> Option<&[MetricSlot]> {
        Some(&self.metrics)
    }
}

pub fn name_of(widget: &dyn Reportable) -> Option<&str> {
    widget.name()
}

pub fn description_of(widget: &dyn Reportable) -> Option<&str> {
    widget.description()
}

pub fn bounds_of(widget: &dyn Reportable) -> (Option<f64>, Option<f64>) {
    widget.bounds()
}

pub fn metrics_of(widget: &dyn Reportable) -> Option<&[MetricSlot]> {
    widget.metrics()
}

// =============================================================================
// Tests
// =============================================================================
