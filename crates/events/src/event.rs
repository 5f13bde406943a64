/// An entry in the host's event catalogue.
///
/// Events are marker types: the type itself is the event name, and
/// [`Event::Payload`] is the value that travels with it. The catalogue is
/// closed at compile time, so a listener for `UserCreated` can only ever be
/// handed a `UserCreated` payload.
///
/// Payloads are cloned once per listener and shared with the context while a
/// trigger runs, hence the `Clone + Send + Sync` bounds.
pub trait Event: 'static {
    /// Stable event name (e.g. "user.created"), used in logs and errors.
    const NAME: &'static str;

    /// Value carried by the event.
    type Payload: Clone + Send + Sync + 'static;
}

/// Declare event marker types and their payloads.
///
/// ```ignore
/// hookbus_events::define_events! {
///     /// A user signed up.
///     pub UserCreated => User,
///     pub CartTotal => u64,
/// }
/// ```
///
/// Each entry produces a unit struct implementing [`Event`] whose `NAME` is
/// the struct's identifier.
#[macro_export]
macro_rules! define_events {
    ($( $(#[$meta:meta])* $vis:vis $name:ident => $payload:ty ),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
            $vis struct $name;

            impl $crate::Event for $name {
                const NAME: &'static str = stringify!($name);
                type Payload = $payload;
            }
        )*
    };
}
