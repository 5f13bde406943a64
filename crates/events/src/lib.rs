//! `hookbus-events`: in-process event bus with filter pipelines.
//!
//! Hosts declare a closed catalogue of events ([`define_events!`]), register
//! **filterers** that transform, stop or cancel a payload and **listeners**
//! that observe the final value, then fire events through a [`HookBus`].
//!
//! ```ignore
//! use hookbus_events::{define_events, FilterResponse, Filterer, HookBus, Listener};
//!
//! define_events! {
//!     pub Greeting => String,
//! }
//!
//! let bus = HookBus::<()>::new();
//! bus.add_filterer(Filterer::<Greeting, ()>::map(|s| s.to_uppercase()));
//! bus.add_event_listener(Listener::<Greeting, ()>::sync(|s, _ctx| {
//!     println!("{s}");
//!     Ok(())
//! }));
//! bus.trigger_event::<Greeting>("hi".to_string()).await?;
//! ```
//!
//! Both kinds of callback are invoked in priority order (lower first, ties in
//! registration order), one at a time, and share a mutable [`Context`].

pub mod bus;
pub mod callback;
pub mod config;
pub mod context;
pub mod event;
pub mod filter;
pub mod pending;
pub mod registry;

mod rerun;

pub use bus::HookBus;
pub use callback::{BoxFuture, Filterer, Listener, Rerunner, SameCallback};
pub use config::BusConfig;
pub use context::{Context, ContextHandle, OriginalEvent, Reserved};
pub use event::Event;
pub use filter::{ApplyOptions, FilterOutcome, FilterResponse};
pub use pending::PendingSummary;
pub use registry::Registration;

pub use hookbus_core::{CallbackResult, DispatchError, DispatchResult, Priority, RerunnerId};
