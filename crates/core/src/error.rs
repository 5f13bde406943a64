//! Dispatch error model.

use thiserror::Error;

use crate::id::RerunnerId;

/// Result type returned by host callbacks (listeners, filterers, rerunners).
///
/// Callbacks may fail with any error; the bus wraps it into a
/// [`DispatchError`] naming where the failure happened.
pub type CallbackResult<T = ()> = anyhow::Result<T>;

/// Result type used across the dispatch engine.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// A callback failed while the bus was running it.
///
/// The bus has no error taxonomy of its own: every variant carries the
/// callback's error as `source` and only records which phase it came from.
/// Callbacks after the failing one are not invoked, and the context's reserved
/// fields are left as they were at the point of failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A filterer returned an error.
    #[error("filterer failed for event `{event}`")]
    Filterer {
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A registered listener returned an error.
    #[error("listener failed for event `{event}`")]
    Listener {
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The one-off callback passed along with a trigger returned an error.
    #[error("trigger callback failed for event `{event}`")]
    Callback {
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A rerunner returned an error.
    #[error("rerunner `{id}` failed for event `{event}`")]
    Rerunner {
        event: &'static str,
        id: RerunnerId,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    pub fn filterer(event: &'static str, source: anyhow::Error) -> Self {
        Self::Filterer { event, source }
    }

    pub fn listener(event: &'static str, source: anyhow::Error) -> Self {
        Self::Listener { event, source }
    }

    pub fn callback(event: &'static str, source: anyhow::Error) -> Self {
        Self::Callback { event, source }
    }

    pub fn rerunner(event: &'static str, id: RerunnerId, source: anyhow::Error) -> Self {
        Self::Rerunner { event, id, source }
    }

    /// Name of the event being processed when the callback failed.
    pub fn event(&self) -> &'static str {
        match self {
            Self::Filterer { event, .. }
            | Self::Listener { event, .. }
            | Self::Callback { event, .. }
            | Self::Rerunner { event, .. } => event,
        }
    }

    /// The error the callback returned.
    pub fn into_source(self) -> anyhow::Error {
        match self {
            Self::Filterer { source, .. }
            | Self::Listener { source, .. }
            | Self::Callback { source, .. }
            | Self::Rerunner { source, .. } => source,
        }
    }
}
