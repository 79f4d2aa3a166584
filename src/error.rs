//! Error taxonomy for widget definition and computation.
//!
//! Configuration mistakes (cycles, duplicate ids, bad axis shapes) get their
//! own variants so callers can match on them; anything else raised while a
//! definition runs is wrapped with the script id attached, cause preserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WidgetError {
    /// A definition, directly or transitively, tried to load itself again.
    /// The chain lists every path currently being loaded, oldest first.
    #[error("circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    /// The composed widget id is already present in the registry. The first
    /// registration stays intact.
    #[error("widget {id} already defined in registry")]
    DuplicateWidget { id: String },

    /// A metric id did not resolve through the registry.
    #[error("metric {id} not found in registry")]
    MetricNotFound { id: String },

    /// Malformed axis declaration.
    #[error("invalid y_axis spec: expected axis assignments {{axis => [metric ids]}} or a non-empty metric id list")]
    InvalidAxisSpec,

    /// No definition was registered in the catalog under this path.
    #[error("no widget definition registered for path {path}")]
    UnknownDefinition { path: String },

    /// rate_data was asked of a widget without numerator/denominator.
    #[error("widget {id} has no numerator/denominator configured")]
    NotRateWidget { id: String },

    /// Any non-configuration failure raised while evaluating a definition,
    /// tagged with the derived script id so operators can tell which
    /// definition failed.
    #[error("widget definition {id} failed")]
    Definition {
        id: String,
        #[source]
        source: Box<WidgetError>,
    },

    /// Metric store failure, propagated unmodified.
    #[error("metric store error")]
    Store(#[from] anyhow::Error),
}

impl WidgetError {
    /// Configuration errors keep their identity through the loader; only
    /// other failures get wrapped as `Definition`.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            WidgetError::CircularDependency { .. }
                | WidgetError::DuplicateWidget { .. }
                | WidgetError::MetricNotFound { .. }
                | WidgetError::InvalidAxisSpec
                | WidgetError::UnknownDefinition { .. }
        )
    }
}
