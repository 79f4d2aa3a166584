//! Definition loading: catalog path -> evaluated definition -> registered
//! widgets.
//!
//! Definitions are plain functions registered in a `Catalog` under the
//! source path they came from. Evaluating one runs it against a
//! `DefinitionScope` that exposes exactly two entry points: `widget` (define
//! and register one widget) and `require` (pull in another path first, which
//! is where circular dependencies can arise). The load stack tracks paths
//! currently being evaluated and is restored on every exit, success or
//! failure.

use std::collections::HashMap;
use std::path::Path;

use serde_json::json;

use crate::error::WidgetError;
use crate::logging::{json_log, Level};
use crate::registry::Registry;
use crate::widget::Widget;

/// Paths currently being loaded, oldest first. Not shared across concurrent
/// loads; each independent registry gets its own.
pub type LoadStack = Vec<String>;

pub type Definition =
    Box<dyn Fn(&mut DefinitionScope<'_>) -> Result<(), WidgetError> + Send + Sync>;

/// Widget definitions keyed by source path. Discovery of paths is the
/// caller's job; the catalog only evaluates what it was given.
#[derive(Default)]
pub struct Catalog {
    definitions: HashMap<String, Definition>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define<F>(&mut self, path: &str, definition: F)
    where
        F: Fn(&mut DefinitionScope<'_>) -> Result<(), WidgetError> + Send + Sync + 'static,
    {
        self.definitions.insert(path.to_string(), Box::new(definition));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.definitions.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    fn get(&self, path: &str) -> Option<&Definition> {
        self.definitions.get(path)
    }
}

/// The evaluation surface a definition body sees. Nothing else of the
/// surrounding process leaks in.
pub struct DefinitionScope<'a> {
    catalog: &'a Catalog,
    registry: &'a mut Registry,
    stack: &'a mut LoadStack,
    script_id: String,
    defined: Vec<String>,
}

impl DefinitionScope<'_> {
    /// Define one widget. The registration id composes the script id with
    /// the suffix; the body configures the fresh widget through its
    /// declarative API, resolving metrics against the registry.
    pub fn widget<F>(&mut self, suffix: &str, body: F) -> Result<String, WidgetError>
    where
        F: FnOnce(&mut Widget, &Registry) -> Result<(), WidgetError>,
    {
        let id = format!("{}.{}", self.script_id, suffix);
        if self.registry.has_widget(&id) {
            return Err(WidgetError::DuplicateWidget { id });
        }
        let mut widget = Widget::new(id.clone());
        body(&mut widget, &*self.registry)?;
        self.registry.register_widget(widget)?;
        json_log(
            Level::Info,
            "widget_registered",
            json!({ "widget": id, "script": self.script_id }),
        );
        self.defined.push(id.clone());
        Ok(id)
    }

    /// Load another path before continuing. Shares the current load stack,
    /// so self-loads at any depth are caught.
    pub fn require(&mut self, path: &str) -> Result<Vec<String>, WidgetError> {
        load(self.catalog, self.registry, self.stack, path)
    }
}

/// Stable script id from a source path: base name without extension,
/// lower-cased, every run of non-word characters collapsed to one '_'.
pub fn derive_script_id(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path);
    let mut id = String::with_capacity(stem.len());
    let mut in_gap = false;
    for ch in stem.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            id.extend(ch.to_lowercase());
            in_gap = false;
        } else if !in_gap {
            id.push('_');
            in_gap = true;
        }
    }
    id
}

/// Evaluate the definition registered under `path`, registering its widgets
/// into `registry`. Returns the ids registered by that path, in definition
/// order; each is retrievable from the registry afterwards.
///
/// A path already on the stack is a circular dependency and fails
/// immediately with the full chain. Configuration errors keep their
/// identity; any other evaluation failure is wrapped with the derived
/// script id, cause preserved.
pub fn load(
    catalog: &Catalog,
    registry: &mut Registry,
    stack: &mut LoadStack,
    path: &str,
) -> Result<Vec<String>, WidgetError> {
    if stack.iter().any(|p| p == path) {
        return Err(WidgetError::CircularDependency {
            chain: format!("{}=>{}", stack.join("=>"), path),
        });
    }
    let definition = catalog
        .get(path)
        .ok_or_else(|| WidgetError::UnknownDefinition { path: path.to_string() })?;
    let script_id = derive_script_id(path);

    stack.push(path.to_string());
    let mut scope = DefinitionScope {
        catalog,
        registry: &mut *registry,
        stack: &mut *stack,
        script_id: script_id.clone(),
        defined: Vec::new(),
    };
    let result = definition(&mut scope);
    let defined = scope.defined;
    // Restore the stack on every exit path before surfacing the outcome.
    stack.pop();

    match result {
        Ok(()) => Ok(defined),
        Err(err) if err.is_config_error() => {
            json_log(
                Level::Error,
                "widget_load_failed",
                json!({ "script": script_id, "path": path, "error": err.to_string() }),
            );
            Err(err)
        }
        Err(other) => {
            json_log(
                Level::Error,
                "widget_load_failed",
                json!({ "script": script_id, "path": path, "error": other.to_string() }),
            );
            Err(WidgetError::Definition { id: script_id, source: Box::new(other) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricRef;
    use std::error::Error as _;

    fn registry_with(ids: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for id in ids {
            registry.register_metric(MetricRef::new(*id));
        }
        registry
    }

    #[test]
    fn test_derive_script_id() {
        assert_eq!(derive_script_id("widgets/yawn_sec.rb"), "yawn_sec");
        assert_eq!(derive_script_id("widgets/Busy-Day Report.rb"), "busy_day_report");
        assert_eq!(derive_script_id("signups++.rb"), "signups_");
        assert_eq!(derive_script_id("plain"), "plain");
    }

    #[test]
    fn test_load_registers_composed_id() {
        let mut catalog = Catalog::new();
        catalog.define("widgets/Yawn-Sec.rb", |scope| {
            scope.widget("per_hour", |w, _| {
                w.set_description("Most boring widget ever");
                Ok(())
            })?;
            Ok(())
        });
        let mut registry = registry_with(&[]);
        let mut stack = LoadStack::new();

        let ids = load(&catalog, &mut registry, &mut stack, "widgets/Yawn-Sec.rb").unwrap();
        assert_eq!(ids, vec!["yawn_sec.per_hour".to_string()]);
        let w = registry.widget("yawn_sec.per_hour").unwrap();
        assert_eq!(w.description(), Some("Most boring widget ever"));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_unknown_path() {
        let catalog = Catalog::new();
        let mut registry = registry_with(&[]);
        let mut stack = LoadStack::new();
        assert!(matches!(
            load(&catalog, &mut registry, &mut stack, "nope.rb"),
            Err(WidgetError::UnknownDefinition { .. })
        ));
    }

    #[test]
    fn test_direct_cycle() {
        let mut catalog = Catalog::new();
        catalog.define("a.rb", |scope| {
            scope.require("a.rb")?;
            Ok(())
        });
        let mut registry = registry_with(&[]);
        let mut stack = LoadStack::new();

        let err = load(&catalog, &mut registry, &mut stack, "a.rb").unwrap_err();
        match err {
            WidgetError::CircularDependency { chain } => assert_eq!(chain, "a.rb=>a.rb"),
            other => panic!("expected CircularDependency, got {other:?}"),
        }
        assert!(stack.is_empty(), "stack restored after failure");
    }

    #[test]
    fn test_indirect_cycle() {
        let mut catalog = Catalog::new();
        catalog.define("a.rb", |scope| {
            scope.require("b.rb")?;
            Ok(())
        });
        catalog.define("b.rb", |scope| {
            scope.require("a.rb")?;
            Ok(())
        });
        let mut registry = registry_with(&[]);
        let mut stack = LoadStack::new();

        let err = load(&catalog, &mut registry, &mut stack, "a.rb").unwrap_err();
        match err {
            WidgetError::CircularDependency { chain } => assert_eq!(chain, "a.rb=>b.rb=>a.rb"),
            other => panic!("expected CircularDependency, got {other:?}"),
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn test_duplicate_widget_second_load_fails_first_survives() {
        let mut catalog = Catalog::new();
        catalog.define("acq.rb", |scope| {
            scope.widget("signups", |w, _| {
                w.set_name("Signups");
                Ok(())
            })?;
            Ok(())
        });
        let mut registry = registry_with(&[]);
        let mut stack = LoadStack::new();

        load(&catalog, &mut registry, &mut stack, "acq.rb").unwrap();
        let err = load(&catalog, &mut registry, &mut stack, "acq.rb").unwrap_err();
        assert!(matches!(err, WidgetError::DuplicateWidget { .. }));
        assert_eq!(registry.widget("acq.signups").unwrap().name(), Some("Signups"));
    }

    #[test]
    fn test_require_registers_dependency_first() {
        let mut catalog = Catalog::new();
        catalog.define("base.rb", |scope| {
            scope.widget("visits", |w, registry| {
                w.set_metrics(registry, &["visits"])
            })?;
            Ok(())
        });
        catalog.define("derived.rb", |scope| {
            scope.require("base.rb")?;
            scope.widget("conversion", |w, registry| {
                w.set_numerator(registry, "purchases")?;
                w.set_denominator(registry, "visits")
            })?;
            Ok(())
        });
        let mut registry = registry_with(&["visits", "purchases"]);
        let mut stack = LoadStack::new();

        load(&catalog, &mut registry, &mut stack, "derived.rb").unwrap();
        assert!(registry.has_widget("base.visits"));
        assert!(registry.has_widget("derived.conversion"));
    }

    #[test]
    fn test_evaluation_error_wrapped_with_script_id() {
        let mut catalog = Catalog::new();
        catalog.define("widgets/Busy Day.rb", |_scope| {
            Err(WidgetError::Store(anyhow::anyhow!("backend down")))
        });
        let mut registry = registry_with(&[]);
        let mut stack = LoadStack::new();

        let err = load(&catalog, &mut registry, &mut stack, "widgets/Busy Day.rb").unwrap_err();
        match &err {
            WidgetError::Definition { id, source } => {
                assert_eq!(id, "busy_day");
                assert!(source.to_string().contains("metric store"));
            }
            other => panic!("expected Definition wrapper, got {other:?}"),
        }
        assert!(err.source().is_some(), "cause chain preserved");
        assert!(stack.is_empty());
    }

    #[test]
    fn test_metric_not_found_propagates_unwrapped() {
        let mut catalog = Catalog::new();
        catalog.define("acq.rb", |scope| {
            scope.widget("signups", |w, registry| {
                w.set_metrics(registry, &["ghost"])
            })?;
            Ok(())
        });
        let mut registry = registry_with(&[]);
        let mut stack = LoadStack::new();

        let err = load(&catalog, &mut registry, &mut stack, "acq.rb").unwrap_err();
        assert!(matches!(err, WidgetError::MetricNotFound { .. }));
        assert!(!registry.has_widget("acq.signups"));
    }
}
