//! The dispatch engine.
//!
//! [`HookBus`] ties the components together:
//!
//! ```text
//! trigger_event ─► paused? ─yes─► PendingQueue ──(start)──┐
//!                    │no                                  │
//!                    ▼                                    ▼
//!            listeners or callback? ─no─► return    dispatch (FIFO)
//!                    │yes
//!                    ▼
//!     save outer, set reserved.original_event
//!                    ▼
//!     Filter pipeline ─cancel─► restore outer, return
//!                    ▼
//!     listeners in priority order, then the trigger callback
//!                    ▼
//!     restore outer reserved.original_event
//! ```
//!
//! ## Execution model
//!
//! Everything a single trigger does happens on one logical thread: each
//! callback is awaited to completion before the next one starts, so the
//! latency of a trigger is the sum of its callbacks' latencies and the
//! invocation order is exactly the priority order captured when the trigger
//! began. Registrations made while a trigger is in flight apply to the next
//! one.
//!
//! The bus is a cheap `Clone` handle. Callbacks may capture a clone and
//! re-enter it (trigger, pause, register). Internal state sits behind short
//! critical sections that are never held across an `.await`.
//!
//! ## Failures
//!
//! A failing callback aborts the pass: the error is returned, later callbacks
//! don't run, and the context's reserved fields are left as they were. There
//! are no retries and no timeouts; a callback that never completes stalls the
//! trigger that awaited it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use hookbus_core::{DispatchError, DispatchResult, RerunnerId};

use crate::callback::{Filterer, Listener};
use crate::config::BusConfig;
use crate::context::{ContextHandle, OriginalEvent};
use crate::filter::{self, ApplyOptions, FilterOutcome};
use crate::pending::{PendingEvent, PendingQueue, PendingSummary};
use crate::registry::{Registration, Registry};
use crate::rerun::RerunnerRegistry;
use crate::Event;

/// Everything the bus knows about one event type.
struct Slot<E: Event, C> {
    listeners: Registry<Listener<E, C>>,
    filterers: Registry<Filterer<E, C>>,
    rerunners: RerunnerRegistry<E, C>,
    /// Input of the most recent filter application, replayed by reruns.
    last_payload: Option<E::Payload>,
}

impl<E: Event, C> Default for Slot<E, C> {
    fn default() -> Self {
        Self {
            listeners: Registry::default(),
            filterers: Registry::default(),
            rerunners: RerunnerRegistry::default(),
            last_payload: None,
        }
    }
}

impl<E: Event, C> Slot<E, C> {
    fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.filterers.is_empty() && self.rerunners.is_empty()
    }
}

struct BusState<C> {
    running: bool,
    pending: PendingQueue<C>,
    /// `TypeId::of::<E>()` => `Slot<E, C>`.
    slots: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl<C: Send + 'static> BusState<C> {
    fn slot<E: Event>(&self) -> Option<&Slot<E, C>> {
        self.slots
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<Slot<E, C>>())
    }

    fn slot_mut<E: Event>(&mut self) -> Option<&mut Slot<E, C>> {
        self.slots
            .get_mut(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_mut::<Slot<E, C>>())
    }

    fn slot_or_default<E: Event>(&mut self) -> &mut Slot<E, C> {
        self.slots
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Slot::<E, C>::default()))
            .downcast_mut::<Slot<E, C>>()
            .expect("slots are keyed by their event type")
    }

    /// Forget an event once nothing is registered for it.
    fn prune<E: Event>(&mut self) {
        if self.slot::<E>().is_some_and(Slot::is_empty) {
            self.slots.remove(&TypeId::of::<E>());
        }
    }
}

/// In-process event bus with priority-ordered filterers and listeners.
///
/// `C` is the host part of the shared [`Context`](crate::Context).
pub struct HookBus<C> {
    state: Arc<Mutex<BusState<C>>>,
    context: ContextHandle<C>,
    name: Arc<str>,
}

impl<C> Clone for HookBus<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            context: self.context.clone(),
            name: Arc::clone(&self.name),
        }
    }
}

impl<C> core::fmt::Debug for HookBus<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HookBus").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<C: Default + Send + 'static> HookBus<C> {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default(), C::default())
    }
}

impl<C: Default + Send + 'static> Default for HookBus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + 'static> HookBus<C> {
    pub fn with_context(context: C) -> Self {
        Self::with_config(BusConfig::default(), context)
    }

    pub fn with_config(config: BusConfig, context: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                running: !config.start_paused,
                pending: PendingQueue::default(),
                slots: HashMap::new(),
            })),
            context: ContextHandle::new(context),
            name: config.name.into(),
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to the shared context, as seen by callbacks.
    pub fn context(&self) -> ContextHandle<C> {
        self.context.clone()
    }

    /// Replace the host part of the context.
    pub fn set_context(&self, host: C) {
        self.context.set(host);
    }

    // ---- registrations ----------------------------------------------------

    /// Register a listener, either bare (default priority) or as a
    /// [`Registration`] built with [`Listener::with_priority`].
    pub fn add_event_listener<E: Event>(&self, registration: impl Into<Registration<Listener<E, C>>>) {
        let registration = registration.into();
        trace!(
            bus = %self.name,
            event = E::NAME,
            priority = registration.priority.value(),
            "listener added"
        );
        self.state().slot_or_default::<E>().listeners.add(registration);
    }

    /// Remove every registration of `listener`. Returns how many there were.
    pub fn remove_event_listener<E: Event>(&self, listener: &Listener<E, C>) -> usize {
        let mut state = self.state();
        let removed = state
            .slot_mut::<E>()
            .map_or(0, |slot| slot.listeners.remove(listener));
        state.prune::<E>();
        trace!(bus = %self.name, event = E::NAME, removed, "listener removed");
        removed
    }

    /// Register a filterer, either bare (default priority) or as a
    /// [`Registration`] built with [`Filterer::with_priority`].
    pub fn add_filterer<E: Event>(&self, registration: impl Into<Registration<Filterer<E, C>>>) {
        let registration = registration.into();
        trace!(
            bus = %self.name,
            event = E::NAME,
            priority = registration.priority.value(),
            "filterer added"
        );
        self.state().slot_or_default::<E>().filterers.add(registration);
    }

    /// Remove every registration of `filterer`. Returns how many there were.
    pub fn remove_filterer<E: Event>(&self, filterer: &Filterer<E, C>) -> usize {
        let mut state = self.state();
        let removed = state
            .slot_mut::<E>()
            .map_or(0, |slot| slot.filterers.remove(filterer));
        state.prune::<E>();
        trace!(bus = %self.name, event = E::NAME, removed, "filterer removed");
        removed
    }

    /// Remove the rerunner registered under `id`. Unknown ids are ignored.
    pub fn remove_rerunner<E: Event>(&self, id: &RerunnerId) -> bool {
        let mut state = self.state();
        let removed = state
            .slot_mut::<E>()
            .is_some_and(|slot| slot.rerunners.remove(id));
        state.prune::<E>();
        trace!(bus = %self.name, event = E::NAME, %id, removed, "rerunner removed");
        removed
    }

    pub fn listener_count<E: Event>(&self) -> usize {
        self.state().slot::<E>().map_or(0, |slot| slot.listeners.len())
    }

    pub fn filterer_count<E: Event>(&self) -> usize {
        self.state().slot::<E>().map_or(0, |slot| slot.filterers.len())
    }

    pub fn rerunner_count<E: Event>(&self) -> usize {
        self.state().slot::<E>().map_or(0, |slot| slot.rerunners.len())
    }

    // ---- pause / resume ---------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Stop dispatching: later triggers are queued until [`HookBus::start`].
    ///
    /// Triggers already in flight run to completion.
    pub fn pause(&self) {
        self.state().running = false;
        debug!(bus = %self.name, "bus paused");
    }

    /// Resume dispatching and flush queued triggers in FIFO order.
    ///
    /// The queue is emptied before the first replay, so triggers issued by
    /// callbacks during the flush queue up behind it (when paused again) or
    /// dispatch immediately (when running). If the bus is paused mid-flush, or
    /// a replayed trigger fails, the events not yet replayed go back to the
    /// front of the queue.
    pub async fn start(&self) -> DispatchResult<()> {
        let mut batch = {
            let mut state = self.state();
            state.running = true;
            state.pending.take()
        };
        debug!(bus = %self.name, pending = batch.len(), "bus started");

        while let Some(event) = batch.pop_front() {
            if !self.is_running() {
                batch.push_front(event);
                debug!(
                    bus = %self.name,
                    remaining = batch.len(),
                    "bus paused during flush, requeueing"
                );
                self.state().pending.restore_front(batch);
                return Ok(());
            }

            let event_name = event.event_name();
            if let Err(err) = event.replay(self.clone()).await {
                warn!(
                    bus = %self.name,
                    event = event_name,
                    remaining = batch.len(),
                    error = %err,
                    "queued event failed, requeueing the rest"
                );
                self.state().pending.restore_front(batch);
                return Err(err);
            }
        }

        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    /// Queued triggers, oldest first.
    pub fn pending_events(&self) -> Vec<PendingSummary> {
        self.state().pending.summaries()
    }

    // ---- dispatch ---------------------------------------------------------

    /// Fire `E` with `payload`.
    ///
    /// Filterers run first, then listeners receive the filtered value. While
    /// paused, the trigger is queued and this returns immediately.
    pub async fn trigger_event<E: Event>(&self, payload: E::Payload) -> DispatchResult<()> {
        self.trigger::<E>(payload, None).await
    }

    /// Like [`HookBus::trigger_event`], with a one-off callback that runs
    /// after every registered listener, even when there are none.
    ///
    /// The callback receives the filtered value, like listeners do, not the
    /// `payload` passed here; it is skipped when a filterer cancels the event.
    /// A callback passed while paused is queued along with the payload.
    pub async fn trigger_event_with<E: Event>(
        &self,
        payload: E::Payload,
        callback: Listener<E, C>,
    ) -> DispatchResult<()> {
        self.trigger::<E>(payload, Some(callback)).await
    }

    async fn trigger<E: Event>(
        &self,
        payload: E::Payload,
        callback: Option<Listener<E, C>>,
    ) -> DispatchResult<()> {
        {
            let mut state = self.state();
            if !state.running {
                state.pending.push(PendingEvent::new::<E>(payload, callback));
                debug!(
                    bus = %self.name,
                    event = E::NAME,
                    pending = state.pending.len(),
                    "bus paused, event queued"
                );
                return Ok(());
            }
        }

        self.dispatch::<E>(payload, callback).await
    }

    /// Filter then notify, ignoring the paused flag.
    pub(crate) async fn dispatch<E: Event>(
        &self,
        payload: E::Payload,
        callback: Option<Listener<E, C>>,
    ) -> DispatchResult<()> {
        let listeners = self.state().slot::<E>().and_then(|slot| slot.listeners.ordered());
        if listeners.is_none() && callback.is_none() {
            trace!(bus = %self.name, event = E::NAME, "nothing to notify");
            return Ok(());
        }

        debug!(
            bus = %self.name,
            event = E::NAME,
            listeners = listeners.as_ref().map_or(0, |ordered| ordered.len()),
            callback = callback.is_some(),
            "dispatching event"
        );

        // A listener may trigger another event; the outer value is put back
        // once that nested trigger finishes.
        let outer = self
            .context
            .replace_original_event(Some(OriginalEvent::new::<E>(payload.clone())));

        let outcome = self.run_filters::<E>(payload, None).await?;
        if outcome.cancel_event {
            self.context.replace_original_event(outer);
            debug!(bus = %self.name, event = E::NAME, "event cancelled by filterer");
            return Ok(());
        }

        if let Some(listeners) = &listeners {
            for listener in listeners.iter() {
                listener
                    .call(outcome.value.clone(), self.context.clone())
                    .await
                    .map_err(|source| DispatchError::listener(E::NAME, source))?;
            }
        }

        if let Some(callback) = callback {
            callback
                .call(outcome.value, self.context.clone())
                .await
                .map_err(|source| DispatchError::callback(E::NAME, source))?;
        }

        self.context.replace_original_event(outer);
        Ok(())
    }

    // ---- filters ----------------------------------------------------------

    /// Run `payload` through the filterers of `E` without notifying listeners.
    pub async fn apply_filters<E: Event>(
        &self,
        payload: E::Payload,
    ) -> DispatchResult<FilterOutcome<E::Payload>> {
        self.run_filters::<E>(payload, None).await
    }

    /// Like [`HookBus::apply_filters`], with a per-call extra value exposed to
    /// filterers through the context and/or a rerunner to renotify on
    /// [`HookBus::rerun_filters`].
    pub async fn apply_filters_with<E: Event>(
        &self,
        payload: E::Payload,
        options: ApplyOptions<E, C>,
    ) -> DispatchResult<FilterOutcome<E::Payload>> {
        let ApplyOptions { call_extra, rerunner } = options;

        if let Some(rerunner) = rerunner {
            trace!(bus = %self.name, event = E::NAME, id = %rerunner.id(), "rerunner registered");
            self.state().slot_or_default::<E>().rerunners.insert(rerunner);
        }

        self.run_filters::<E>(payload, call_extra).await
    }

    /// Replay the last payload filtered for `E` and hand the new outcome to
    /// every rerunner of `E`, in registration order.
    ///
    /// Does nothing if no payload of `E` was ever filtered.
    pub async fn rerun_filters<E: Event>(&self) -> DispatchResult<()> {
        let payload = self
            .state()
            .slot::<E>()
            .and_then(|slot| slot.last_payload.clone());
        let Some(payload) = payload else {
            trace!(bus = %self.name, event = E::NAME, "no payload to rerun");
            return Ok(());
        };

        let outcome = self.run_filters::<E>(payload, None).await?;

        // Rerunners removed while the filters ran are not notified.
        let rerunners = self
            .state()
            .slot::<E>()
            .map(|slot| slot.rerunners.snapshot())
            .unwrap_or_default();
        debug!(
            bus = %self.name,
            event = E::NAME,
            rerunners = rerunners.len(),
            cancelled = outcome.cancel_event,
            "filters rerun"
        );

        for rerunner in &rerunners {
            rerunner
                .call(outcome.clone(), self.context.clone())
                .await
                .map_err(|source| DispatchError::rerunner(E::NAME, rerunner.id().clone(), source))?;
        }

        Ok(())
    }

    async fn run_filters<E: Event>(
        &self,
        payload: E::Payload,
        call_extra: Option<JsonValue>,
    ) -> DispatchResult<FilterOutcome<E::Payload>> {
        let filterers = {
            let mut state = self.state();
            match state.slot_mut::<E>() {
                Some(slot) => {
                    slot.last_payload = Some(payload.clone());
                    slot.filterers.ordered()
                }
                None => None,
            }
        };

        let Some(filterers) = filterers else {
            return Ok(FilterOutcome::new(payload));
        };

        let outer_extra = call_extra.map(|extra| self.context.replace_call_extra(Some(extra)));

        let outcome = filter::apply::<E, C>(&filterers, payload, &self.context).await?;

        if let Some(outer_extra) = outer_extra {
            self.context.replace_call_extra(outer_extra);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::filter::FilterResponse;

    crate::define_events! {
        Word => String,
        Other => u8,
    }

    #[test]
    fn slots_are_pruned_when_empty() {
        let bus = HookBus::<()>::new();
        let listener = Listener::<Word, ()>::sync(|_, _| Ok(()));

        bus.add_event_listener(listener.clone());
        assert_eq!(bus.state().slots.len(), 1);

        assert_eq!(bus.remove_event_listener(&listener), 1);
        assert!(bus.state().slots.is_empty());
    }

    #[test]
    fn removal_of_unknown_registrations_is_silent() {
        let bus = HookBus::<()>::new();
        let listener = Listener::<Word, ()>::sync(|_, _| Ok(()));
        let filterer = Filterer::<Word, ()>::map(|value| value);

        assert_eq!(bus.remove_event_listener(&listener), 0);
        assert_eq!(bus.remove_filterer(&filterer), 0);
        assert!(!bus.remove_rerunner::<Word>(&RerunnerId::from("nobody")));
        assert!(bus.state().slots.is_empty());
    }

    #[tokio::test]
    async fn filterers_without_listeners_are_never_run() {
        let bus = HookBus::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        bus.add_filterer(Filterer::<Word, ()>::sync(move |value, _| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(FilterResponse::new(value))
        }));

        bus.trigger_event::<Word>("x".to_string()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(bus.context().lock().original_event().is_none());
    }

    #[tokio::test]
    async fn events_do_not_leak_into_each_other() {
        let bus = HookBus::<Vec<String>>::new();
        bus.add_event_listener(Listener::<Word, Vec<String>>::sync(|word, ctx| {
            ctx.lock().host.push(word);
            Ok(())
        }));

        bus.trigger_event::<Other>(1).await.unwrap();
        bus.trigger_event::<Word>("hit".to_string()).await.unwrap();

        assert_eq!(bus.context().get(), vec!["hit".to_string()]);
        assert_eq!(bus.listener_count::<Other>(), 0);
        assert_eq!(bus.listener_count::<Word>(), 1);
    }

    #[tokio::test]
    async fn started_paused_from_config() {
        let bus = HookBus::with_config(BusConfig::default().with_name("test").paused(), 0u32);
        bus.add_event_listener(Listener::<Other, u32>::sync(|n, ctx| {
            ctx.lock().host += u32::from(n);
            Ok(())
        }));

        bus.trigger_event::<Other>(2).await.unwrap();
        assert_eq!(bus.name(), "test");
        assert!(!bus.is_running());
        assert_eq!(bus.context().get(), 0);

        bus.start().await.unwrap();
        assert_eq!(bus.context().get(), 2);
    }
}
