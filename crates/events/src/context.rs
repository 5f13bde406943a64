//! Shared mutable context.
//!
//! One [`Context`] lives as long as the bus. It is handed to every callback
//! through a [`ContextHandle`] and has two parts:
//!
//! - `host`: the application's own value, opaque to the bus.
//! - `reserved`: fields the engine manages while it dispatches. They live in
//!   their own struct so host data can never collide with them.

use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;

use crate::Event;

/// The event a trigger started with, before any filterer touched it.
#[derive(Clone)]
pub struct OriginalEvent {
    name: &'static str,
    type_id: TypeId,
    payload: Arc<dyn Any + Send + Sync>,
}

impl OriginalEvent {
    pub(crate) fn new<E: Event>(payload: E::Payload) -> Self {
        Self {
            name: E::NAME,
            type_id: TypeId::of::<E>(),
            payload: Arc::new(payload),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this is an `E` event.
    pub fn is<E: Event>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// The pre-filter payload, if this is an `E` event.
    pub fn payload<E: Event>(&self) -> Option<&E::Payload> {
        if !self.is::<E>() {
            return None;
        }
        self.payload.downcast_ref::<E::Payload>()
    }
}

impl core::fmt::Debug for OriginalEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OriginalEvent")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Engine-managed part of the context.
#[derive(Debug, Clone, Default)]
pub struct Reserved {
    original_event: Option<OriginalEvent>,
    call_extra: Option<JsonValue>,
}

impl Reserved {
    /// Set while a trigger's filter and notify phases run.
    pub fn original_event(&self) -> Option<&OriginalEvent> {
        self.original_event.as_ref()
    }

    /// Caller-supplied value for the filter application in progress.
    pub fn call_extra(&self) -> Option<&JsonValue> {
        self.call_extra.as_ref()
    }

    pub(crate) fn replace_original_event(&mut self, original: Option<OriginalEvent>) -> Option<OriginalEvent> {
        std::mem::replace(&mut self.original_event, original)
    }

    pub(crate) fn replace_call_extra(&mut self, extra: Option<JsonValue>) -> Option<JsonValue> {
        std::mem::replace(&mut self.call_extra, extra)
    }
}

/// Context shared by the bus and every callback.
#[derive(Debug, Clone, Default)]
pub struct Context<C> {
    /// Host-defined state.
    pub host: C,
    reserved: Reserved,
}

impl<C> Context<C> {
    pub fn new(host: C) -> Self {
        Self {
            host,
            reserved: Reserved::default(),
        }
    }

    pub fn reserved(&self) -> &Reserved {
        &self.reserved
    }

    /// Shorthand for `reserved().original_event()`.
    pub fn original_event(&self) -> Option<&OriginalEvent> {
        self.reserved.original_event()
    }

    /// Shorthand for `reserved().call_extra()`.
    pub fn call_extra(&self) -> Option<&JsonValue> {
        self.reserved.call_extra()
    }

    /// Reset the engine-managed fields.
    ///
    /// A failing callback leaves them as they were when it failed; hosts that
    /// keep using the bus afterwards can call this to start clean.
    pub fn clear_reserved(&mut self) {
        self.reserved = Reserved::default();
    }

    pub(crate) fn reserved_mut(&mut self) -> &mut Reserved {
        &mut self.reserved
    }
}

/// Shared handle to the bus context.
///
/// Cloning is cheap; all clones see the same context. Locks are short-lived:
/// take one, read or write, drop it. Never hold a guard across an `.await`.
#[derive(Debug)]
pub struct ContextHandle<C> {
    inner: Arc<Mutex<Context<C>>>,
}

impl<C> Clone for ContextHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> ContextHandle<C> {
    pub fn new(host: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Context::new(host))),
        }
    }

    /// Lock the context for in-place access.
    ///
    /// A callback that panicked while holding the lock does not make the
    /// context unusable; the poisoned guard is recovered.
    pub fn lock(&self) -> MutexGuard<'_, Context<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the context locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Context<C>) -> R) -> R {
        f(&mut *self.lock())
    }

    /// Copy of the host part.
    pub fn get(&self) -> C
    where
        C: Clone,
    {
        self.lock().host.clone()
    }

    /// Replace the host part. Engine-managed fields are left untouched.
    pub fn set(&self, host: C) {
        self.lock().host = host;
    }

    /// Install `original` and return what it displaced, so a nested trigger
    /// can hand the outer one its value back.
    pub(crate) fn replace_original_event(&self, original: Option<OriginalEvent>) -> Option<OriginalEvent> {
        self.lock().reserved_mut().replace_original_event(original)
    }

    pub(crate) fn replace_call_extra(&self, extra: Option<JsonValue>) -> Option<JsonValue> {
        self.lock().reserved_mut().replace_call_extra(extra)
    }
}

impl<C: Default> Default for ContextHandle<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::define_events! {
        Greeting => String,
        Count => u32,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Host {
        bar: Option<String>,
    }

    #[test]
    fn host_fields_are_shared_between_clones() {
        let handle = ContextHandle::new(Host::default());
        let other = handle.clone();

        assert_eq!(handle.get().bar, None);
        other.lock().host.bar = Some("foo".to_string());
        assert_eq!(handle.get().bar.as_deref(), Some("foo"));
    }

    #[test]
    fn set_replaces_host_but_keeps_reserved() {
        let handle = ContextHandle::new(Host::default());
        handle.replace_original_event(Some(OriginalEvent::new::<Greeting>("hi".to_string())));

        handle.set(Host {
            bar: Some("x".to_string()),
        });

        let ctx = handle.lock();
        assert_eq!(ctx.host.bar.as_deref(), Some("x"));
        assert!(ctx.original_event().is_some());
    }

    #[test]
    fn original_event_is_typed() {
        let handle = ContextHandle::new(());
        handle.replace_original_event(Some(OriginalEvent::new::<Greeting>("hello".to_string())));

        let ctx = handle.lock();
        let original = ctx.original_event().unwrap();
        assert_eq!(original.name(), "Greeting");
        assert!(original.is::<Greeting>());
        assert_eq!(original.payload::<Greeting>().map(String::as_str), Some("hello"));
        assert!(original.payload::<Count>().is_none());
    }

    #[test]
    fn clear_reserved_resets_engine_fields() {
        let handle = ContextHandle::new(());
        handle.replace_original_event(Some(OriginalEvent::new::<Count>(3)));
        handle.replace_call_extra(Some(serde_json::json!({"replacement": 4})));

        handle.with(|ctx| {
            assert_eq!(ctx.call_extra(), Some(&serde_json::json!({"replacement": 4})));
            ctx.clear_reserved();
        });

        let ctx = handle.lock();
        assert!(ctx.original_event().is_none());
        assert!(ctx.call_extra().is_none());
    }

    #[test]
    fn replace_hands_back_the_displaced_value() {
        let handle = ContextHandle::new(());
        handle.replace_original_event(Some(OriginalEvent::new::<Count>(1)));

        let outer = handle.replace_original_event(Some(OriginalEvent::new::<Greeting>("inner".to_string())));
        assert!(outer.as_ref().is_some_and(OriginalEvent::is::<Count>));

        handle.replace_original_event(outer);
        let ctx = handle.lock();
        assert_eq!(ctx.original_event().and_then(|o| o.payload::<Count>()), Some(&1));
    }
}
