//! `hookbus-core`: leaf primitives shared by the dispatch engine.
//!
//! This crate holds the small value types the bus is built from (priorities,
//! rerunner identifiers) and the error model. It has no knowledge of events,
//! callbacks or async execution.

pub mod error;
pub mod id;
pub mod priority;

pub use error::{CallbackResult, DispatchError, DispatchResult};
pub use id::RerunnerId;
pub use priority::Priority;
