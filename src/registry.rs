//! Shared registry of widgets and metrics.
//!
//! The loader is the only writer on the widget side; everything else reads.
//! The metric side is populated at bootstrap and only ever looked up.

use std::collections::HashMap;

use crate::error::WidgetError;
use crate::metric::MetricRef;
use crate::widget::Widget;

#[derive(Debug, Default)]
pub struct Registry {
    widgets: HashMap<String, Widget>,
    metrics: HashMap<String, MetricRef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_metric(&mut self, metric: MetricRef) {
        self.metrics.insert(metric.id.clone(), metric);
    }

    /// Resolve a metric id. Unknown ids are a configuration error.
    pub fn metric(&self, id: &str) -> Result<&MetricRef, WidgetError> {
        self.metrics
            .get(id)
            .ok_or_else(|| WidgetError::MetricNotFound { id: id.to_string() })
    }

    pub fn widget(&self, id: &str) -> Option<&Widget> {
        self.widgets.get(id)
    }

    pub fn widgets(&self) -> &HashMap<String, Widget> {
        &self.widgets
    }

    pub fn has_widget(&self, id: &str) -> bool {
        self.widgets.contains_key(id)
    }

    /// Insert-if-absent; a second widget under the same id is rejected and
    /// the first stays registered.
    pub fn register_widget(&mut self, widget: Widget) -> Result<(), WidgetError> {
        let id = widget.id().to_string();
        if self.widgets.contains_key(&id) {
            return Err(WidgetError::DuplicateWidget { id });
        }
        self.widgets.insert(id, widget);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_lookup() {
        let mut registry = Registry::new();
        registry.register_metric(MetricRef::new("signups"));
        assert_eq!(registry.metric("signups").unwrap().id, "signups");
        assert!(matches!(
            registry.metric("ghost"),
            Err(WidgetError::MetricNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_widget_keeps_first() {
        let mut registry = Registry::new();
        let mut first = Widget::new("acq.signups");
        first.set_name("Signups");
        registry.register_widget(first).unwrap();

        let second = Widget::new("acq.signups");
        assert!(matches!(
            registry.register_widget(second),
            Err(WidgetError::DuplicateWidget { .. })
        ));
        assert_eq!(registry.widget("acq.signups").unwrap().name(), Some("Signups"));
    }
}
