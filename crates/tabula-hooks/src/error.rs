//! Error returned when a synchronous subscriber vetoes an event.

use std::fmt;

use crate::hook::HandlerId;

/// Identifies which subscriber produced a [`HookError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerRef {
    /// A subscriber registered with [`Hook::add`](crate::Hook::add).
    Registered(HandlerId),
    /// A one-off subscriber passed to
    /// [`Hook::trigger_with`](crate::Hook::trigger_with), by position.
    OneOff(usize),
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered(id) => write!(f, "#{id}"),
            Self::OneOff(index) => write!(f, "one-off[{index}]"),
        }
    }
}

/// A synchronous subscriber returned an error and stopped the trigger.
///
/// The subscriber's own error is kept verbatim in [`source`](Self::source)
/// so callers can recover it with [`HookError::downcast_ref`].
#[derive(Debug, thiserror::Error)]
#[error("{hook} handler {handler} rejected the event: {source}")]
pub struct HookError {
    /// Name of the hook that was triggered.
    pub hook: String,
    /// The subscriber that failed.
    pub handler: HandlerRef,
    /// The error returned by the subscriber.
    #[source]
    pub source: anyhow::Error,
}

impl HookError {
    /// Borrow the subscriber's error as a concrete type, if it is one.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.source.downcast_ref::<E>()
    }
}
