//! dashwidgets - definition and registry layer for dashboard widgets.
//!
//! A widget is a named, declarative description of a derived metric: a rate
//! (numerator/denominator ratio per date) or a group of metrics assigned to
//! chart axes. Definitions live in a `Catalog` keyed by source path, get
//! evaluated by the loader with circular-dependency detection, and land in a
//! shared `Registry`. Reporting queries pull raw per-date series from a
//! `MetricStore` and compute derived values on demand.

pub mod error;
pub mod loader;
pub mod logging;
pub mod metric;
pub mod registry;
pub mod storage;
pub mod widget;

pub use error::WidgetError;
pub use loader::{derive_script_id, load, Catalog, DefinitionScope, LoadStack};
pub use metric::{MemoryMetricStore, MetricRef, MetricStore};
pub use registry::Registry;
pub use storage::SqliteMetricStore;
pub use widget::{
    AxisSpec, ChartSeries, GraphFlag, MetricOptions, MetricOptionsPatch, MetricSlot, Reportable,
    Widget,
};
