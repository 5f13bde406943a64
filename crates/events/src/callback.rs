//! Callback handles: listeners, filterers and rerunners.
//!
//! Every callback receives its input by value plus a [`ContextHandle`] and
//! returns a boxed future. Synchronous callbacks are wrapped in a future that
//! is already complete, so the engine awaits both kinds the same way.
//!
//! The engine never holds the context lock while host code runs. Callbacks
//! lock the handle themselves, for as long as they need it, and may call back
//! into the bus (including [`HookBus::context`](crate::HookBus::context))
//! while unlocked.
//!
//! Handles are reference-counted. Clones share the callback, and removal
//! compares that shared allocation: keep a clone of the handle you register
//! if you want to remove it later.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hookbus_core::{CallbackResult, Priority, RerunnerId};

use crate::context::ContextHandle;
use crate::filter::{FilterOutcome, FilterResponse};
use crate::registry::Registration;
use crate::Event;

/// Boxed `Send` future returned by callbacks.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type CallbackFn<A, R, C> = dyn Fn(A, ContextHandle<C>) -> BoxFuture<CallbackResult<R>> + Send + Sync;

/// Type-erased callback shared by the three handle kinds.
struct Callback<A, R, C> {
    f: Arc<CallbackFn<A, R, C>>,
}

impl<A, R, C> Clone for Callback<A, R, C> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<A, R, C> Callback<A, R, C>
where
    A: Send + 'static,
    R: Send + 'static,
    C: Send + 'static,
{
    fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(A, ContextHandle<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult<R>> + Send + 'static,
    {
        let f: Arc<CallbackFn<A, R, C>> =
            Arc::new(move |input: A, ctx: ContextHandle<C>| -> BoxFuture<CallbackResult<R>> {
                Box::pin(f(input, ctx))
            });
        Self { f }
    }

    fn from_sync<F>(f: F) -> Self
    where
        F: Fn(A, &ContextHandle<C>) -> CallbackResult<R> + Send + Sync + 'static,
    {
        let f: Arc<CallbackFn<A, R, C>> =
            Arc::new(move |input: A, ctx: ContextHandle<C>| -> BoxFuture<CallbackResult<R>> {
                Box::pin(std::future::ready(f(input, &ctx)))
            });
        Self { f }
    }
}

impl<A, R, C> Callback<A, R, C> {
    fn call(&self, input: A, ctx: ContextHandle<C>) -> BoxFuture<CallbackResult<R>> {
        (self.f)(input, ctx)
    }

    fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.f), Arc::as_ptr(&other.f))
    }
}

/// Callbacks compared by identity when removed.
pub trait SameCallback {
    fn same_callback(&self, other: &Self) -> bool;
}

/// Observes an event's final, filtered payload.
pub struct Listener<E: Event, C> {
    callback: Callback<E::Payload, (), C>,
}

impl<E: Event, C: Send + 'static> Listener<E, C> {
    /// Wrap an async callback.
    ///
    /// ```ignore
    /// let listener = Listener::<UserCreated, AppCtx>::new(|user, ctx| async move {
    ///     mailer.send_welcome(&user).await?;
    ///     Ok(())
    /// });
    /// ```
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(E::Payload, ContextHandle<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        Self {
            callback: Callback::from_async(f),
        }
    }

    /// Wrap a synchronous callback.
    ///
    /// ```ignore
    /// let listener = Listener::<UserCreated, AppCtx>::sync(|user, ctx| {
    ///     ctx.lock().host.signups += 1;
    ///     Ok(())
    /// });
    /// ```
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(E::Payload, &ContextHandle<C>) -> CallbackResult + Send + Sync + 'static,
    {
        Self {
            callback: Callback::from_sync(f),
        }
    }
}

impl<E: Event, C> Listener<E, C> {
    /// Register at an explicit priority instead of the default.
    pub fn with_priority(self, priority: impl Into<Priority>) -> Registration<Self> {
        Registration::new(self, priority)
    }

    pub(crate) fn call(&self, payload: E::Payload, ctx: ContextHandle<C>) -> BoxFuture<CallbackResult> {
        self.callback.call(payload, ctx)
    }
}

impl<E: Event, C> Clone for Listener<E, C> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
        }
    }
}

impl<E: Event, C> SameCallback for Listener<E, C> {
    fn same_callback(&self, other: &Self) -> bool {
        self.callback.same(&other.callback)
    }
}

impl<E: Event, C> core::fmt::Debug for Listener<E, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Listener").field("event", &E::NAME).finish()
    }
}

/// Transforms, short-circuits or cancels an event's payload before listeners
/// see it.
pub struct Filterer<E: Event, C> {
    callback: Callback<E::Payload, FilterResponse<E::Payload>, C>,
}

impl<E: Event, C: Send + 'static> Filterer<E, C> {
    /// Wrap an async filterer.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(E::Payload, ContextHandle<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult<FilterResponse<E::Payload>>> + Send + 'static,
    {
        Self {
            callback: Callback::from_async(f),
        }
    }

    /// Wrap a synchronous filterer.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(E::Payload, &ContextHandle<C>) -> CallbackResult<FilterResponse<E::Payload>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            callback: Callback::from_sync(f),
        }
    }

    /// Synchronous filterer that only maps the value and never stops or
    /// cancels.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(E::Payload) -> E::Payload + Send + Sync + 'static,
    {
        Self::sync(move |payload, _ctx| Ok(FilterResponse::new(f(payload))))
    }
}

impl<E: Event, C> Filterer<E, C> {
    /// Register at an explicit priority instead of the default.
    pub fn with_priority(self, priority: impl Into<Priority>) -> Registration<Self> {
        Registration::new(self, priority)
    }

    pub(crate) fn call(
        &self,
        payload: E::Payload,
        ctx: ContextHandle<C>,
    ) -> BoxFuture<CallbackResult<FilterResponse<E::Payload>>> {
        self.callback.call(payload, ctx)
    }
}

impl<E: Event, C> Clone for Filterer<E, C> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
        }
    }
}

impl<E: Event, C> SameCallback for Filterer<E, C> {
    fn same_callback(&self, other: &Self) -> bool {
        self.callback.same(&other.callback)
    }
}

impl<E: Event, C> core::fmt::Debug for Filterer<E, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Filterer").field("event", &E::NAME).finish()
    }
}

/// Named callback renotified with a fresh [`FilterOutcome`] whenever the
/// filters of its event are rerun.
pub struct Rerunner<E: Event, C> {
    id: RerunnerId,
    callback: Callback<FilterOutcome<E::Payload>, (), C>,
}

impl<E: Event, C: Send + 'static> Rerunner<E, C> {
    pub fn new<F, Fut>(id: impl Into<RerunnerId>, f: F) -> Self
    where
        F: Fn(FilterOutcome<E::Payload>, ContextHandle<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        Self {
            id: id.into(),
            callback: Callback::from_async(f),
        }
    }

    pub fn sync<F>(id: impl Into<RerunnerId>, f: F) -> Self
    where
        F: Fn(FilterOutcome<E::Payload>, &ContextHandle<C>) -> CallbackResult + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            callback: Callback::from_sync(f),
        }
    }
}

impl<E: Event, C> Rerunner<E, C> {
    pub fn id(&self) -> &RerunnerId {
        &self.id
    }

    pub(crate) fn call(
        &self,
        outcome: FilterOutcome<E::Payload>,
        ctx: ContextHandle<C>,
    ) -> BoxFuture<CallbackResult> {
        self.callback.call(outcome, ctx)
    }
}

impl<E: Event, C> Clone for Rerunner<E, C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<E: Event, C> core::fmt::Debug for Rerunner<E, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rerunner")
            .field("event", &E::NAME)
            .field("id", &self.id)
            .finish()
    }
}
