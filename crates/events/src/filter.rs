//! Filter pipeline.
//!
//! Filterers run one after another in priority order. Each one receives the
//! value produced by the previous one and answers with a [`FilterResponse`]:
//!
//! ```text
//! payload ─► f1 ─► f2 ─► ... ─► fn ─► FilterOutcome
//!             │     │
//!             │     └─ stop_filters: skip the rest, keep this value
//!             └─ cancel_event: skip the rest, drop the event
//! ```
//!
//! `cancel_event` wins when a response sets both flags.

use hookbus_core::{DispatchError, DispatchResult};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::callback::{Filterer, Rerunner};
use crate::context::ContextHandle;
use crate::Event;

/// What a single filterer returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResponse<P> {
    pub value: P,
    /// Skip the remaining filterers but still notify listeners with `value`.
    pub stop_filters: bool,
    /// Skip the remaining filterers and do not notify anyone.
    pub cancel_event: bool,
}

impl<P> FilterResponse<P> {
    /// Pass `value` on to the next filterer.
    pub fn new(value: P) -> Self {
        Self {
            value,
            stop_filters: false,
            cancel_event: false,
        }
    }

    /// Make `value` final: no later filterer runs.
    pub fn stop(value: P) -> Self {
        Self {
            stop_filters: true,
            ..Self::new(value)
        }
    }

    /// Drop the event: no later filterer and no listener runs.
    pub fn cancel(value: P) -> Self {
        Self {
            cancel_event: true,
            ..Self::new(value)
        }
    }
}

/// Result of applying every filterer of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome<P> {
    pub value: P,
    pub cancel_event: bool,
}

impl<P> FilterOutcome<P> {
    pub fn new(value: P) -> Self {
        Self {
            value,
            cancel_event: false,
        }
    }

    pub fn cancelled(value: P) -> Self {
        Self {
            value,
            cancel_event: true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_event
    }

    pub fn into_value(self) -> P {
        self.value
    }
}

/// Extras for [`HookBus::apply_filters_with`](crate::HookBus::apply_filters_with).
pub struct ApplyOptions<E: Event, C> {
    pub(crate) call_extra: Option<JsonValue>,
    pub(crate) rerunner: Option<Rerunner<E, C>>,
}

impl<E: Event, C> Default for ApplyOptions<E, C> {
    fn default() -> Self {
        Self {
            call_extra: None,
            rerunner: None,
        }
    }
}

impl<E: Event, C> ApplyOptions<E, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposed as `reserved.call_extra` while this application runs.
    pub fn call_extra(mut self, extra: impl Into<JsonValue>) -> Self {
        self.call_extra = Some(extra.into());
        self
    }

    /// Notified again whenever the filters of `E` are rerun.
    pub fn rerunner(mut self, rerunner: Rerunner<E, C>) -> Self {
        self.rerunner = Some(rerunner);
        self
    }
}

impl<E: Event, C> core::fmt::Debug for ApplyOptions<E, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApplyOptions")
            .field("call_extra", &self.call_extra)
            .field("rerunner", &self.rerunner)
            .finish()
    }
}

/// Run `payload` through `filterers`, strictly in order.
///
/// A filterer error stops the pipeline and is returned as
/// [`DispatchError::Filterer`].
pub(crate) async fn apply<E, C>(
    filterers: &[Filterer<E, C>],
    mut payload: E::Payload,
    context: &ContextHandle<C>,
) -> DispatchResult<FilterOutcome<E::Payload>>
where
    E: Event,
{
    for (position, filterer) in filterers.iter().enumerate() {
        let response = filterer
            .call(payload, context.clone())
            .await
            .map_err(|source| DispatchError::filterer(E::NAME, source))?;

        if response.cancel_event {
            trace!(event = E::NAME, position, "filterer cancelled event");
            return Ok(FilterOutcome::cancelled(response.value));
        }

        if response.stop_filters {
            trace!(event = E::NAME, position, "filterer stopped the pipeline");
            return Ok(FilterOutcome::new(response.value));
        }

        payload = response.value;
    }

    Ok(FilterOutcome::new(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    crate::define_events! {
        Text => String,
    }

    fn append(suffix: &'static str) -> Filterer<Text, ()> {
        Filterer::<Text, ()>::map(move |value: String| format!("{value}{suffix}"))
    }

    #[tokio::test]
    async fn chains_values_in_order() {
        let filterers = vec![append("1"), append("2"), append("3")];
        let outcome = apply(&filterers, "foo".to_string(), &ContextHandle::new(())).await.unwrap();
        assert_eq!(outcome, FilterOutcome::new("foo123".to_string()));
    }

    #[tokio::test]
    async fn stop_keeps_value_and_skips_rest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let filterers = vec![
            Filterer::<Text, ()>::sync(|value, _ctx| Ok(FilterResponse::stop(format!("{value}1")))),
            Filterer::<Text, ()>::sync(move |value, _ctx| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(FilterResponse::new(format!("{value}2")))
            }),
        ];

        let outcome = apply(&filterers, "foo".to_string(), &ContextHandle::new(())).await.unwrap();

        assert_eq!(outcome, FilterOutcome::new("foo1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_wins_over_stop() {
        let filterers: Vec<Filterer<Text, ()>> = vec![Filterer::<Text, ()>::sync(|value, _ctx| {
            let mut response = FilterResponse::cancel(value);
            response.stop_filters = true;
            Ok(response)
        })];

        let outcome = apply(&filterers, "foo".to_string(), &ContextHandle::new(())).await.unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.into_value(), "foo");
    }

    #[tokio::test]
    async fn error_stops_pipeline() {
        let filterers: Vec<Filterer<Text, ()>> = vec![
            Filterer::<Text, ()>::sync(|_value, _ctx| Err(anyhow::anyhow!("nope"))),
            append("2"),
        ];

        let err = apply(&filterers, "foo".to_string(), &ContextHandle::new(())).await.unwrap_err();
        assert!(matches!(err, DispatchError::Filterer { event: "Text", .. }));
    }
}
