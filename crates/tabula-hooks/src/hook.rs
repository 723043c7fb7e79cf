//! The [`Hook<T>`] subscription registry.
//!
//! A hook is either empty or populated. Triggering an empty hook is a no-op
//! apart from running any one-off subscribers passed to that call.
//!
//! # Trigger semantics
//!
//! 1. The subscriber lists are snapshotted under a read lock. Subscribers
//!    added while a trigger is in flight do not affect that trigger.
//! 2. Synchronous subscribers (registered, then one-off) run strictly in
//!    sequence on the calling task. The first error stops the sequence and
//!    is returned. Subscribers that already ran are not rolled back.
//! 3. Asynchronous subscribers are handed to the [`Dispatcher`] and never
//!    awaited. Their errors are logged and never reach the caller.
//! 4. A synchronous error returns before step 3. Async subscribers only
//!    ever see events that were not vetoed, so a reaction to a write that
//!    never happened cannot be scheduled.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::trace;

use crate::dispatcher::Dispatcher;
use crate::error::{HandlerRef, HookError};

/// Result returned by every subscriber.
pub type HandlerResult = anyhow::Result<()>;

/// A type-erased subscriber for events of type `T`.
///
/// The event is shared behind an [`Arc`] so async subscribers can outlive
/// the trigger call.
pub type Handler<T> = Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
///
/// ```rust,ignore
/// let on_created = handler(|event: Arc<Created>| async move {
///     tracing::info!(id = %event.id, "created");
///     Ok(())
/// });
/// ```
pub fn handler<T, F, Fut>(f: F) -> Handler<T>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Unique identifier of a registered subscriber, usable with
/// [`Hook::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    /// Return the raw numeric id.
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscribers<T> {
    sync: Vec<(HandlerId, Handler<T>)>,
    background: Vec<(HandlerId, Handler<T>)>,
}

/// Concurrency-safe publish/subscribe point for one event type.
pub struct Hook<T> {
    name: String,
    next_id: AtomicU64,
    subscribers: RwLock<Subscribers<T>>,
    dispatcher: Dispatcher,
}

impl<T> Hook<T>
where
    T: Send + Sync + 'static,
{
    /// Create an empty hook with its own [`Dispatcher`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_dispatcher(name, Dispatcher::default())
    }

    /// Create an empty hook that runs async subscribers on a shared
    /// dispatcher.
    pub fn with_dispatcher(name: impl Into<String>, dispatcher: Dispatcher) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Subscribers {
                sync: Vec::new(),
                background: Vec::new(),
            }),
            dispatcher,
        }
    }

    /// The hook's name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dispatcher running this hook's async subscribers.
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Append a synchronous subscriber. Subscribers run in the order they
    /// were added.
    pub fn add<F, Fut>(&self, f: F) -> HandlerId
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_handler(handler(f))
    }

    /// Append an already type-erased synchronous subscriber.
    pub fn add_handler(&self, handler: Handler<T>) -> HandlerId {
        let id = self.allocate_id();
        self.subscribers.write().sync.push((id, handler));
        trace!(hook = %self.name, handler_id = %id, "Registered sync handler");
        id
    }

    /// Append an asynchronous subscriber.
    pub fn add_async<F, Fut>(&self, f: F) -> HandlerId
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_async_handler(handler(f))
    }

    /// Append an already type-erased asynchronous subscriber.
    pub fn add_async_handler(&self, handler: Handler<T>) -> HandlerId {
        let id = self.allocate_id();
        self.subscribers.write().background.push((id, handler));
        trace!(hook = %self.name, handler_id = %id, "Registered async handler");
        id
    }

    /// Remove a subscriber. Returns `false` if the id is unknown.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.sync.len() + subs.background.len();
        subs.sync.retain(|(existing, _)| *existing != id);
        subs.background.retain(|(existing, _)| *existing != id);
        before != subs.sync.len() + subs.background.len()
    }

    /// Number of synchronous subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.read().sync.len()
    }

    /// Number of asynchronous subscribers.
    pub fn async_len(&self) -> usize {
        self.subscribers.read().background.len()
    }

    /// Whether the hook has no subscribers of either kind.
    pub fn is_empty(&self) -> bool {
        let subs = self.subscribers.read();
        subs.sync.is_empty() && subs.background.is_empty()
    }

    /// Trigger the hook with no one-off subscribers.
    pub async fn trigger(&self, event: T) -> Result<(), HookError> {
        self.trigger_with(event, &[]).await
    }

    /// Trigger the hook, running `one_off` after the registered synchronous
    /// subscribers.
    ///
    /// # Errors
    ///
    /// Returns the first synchronous subscriber error. In that case no async
    /// subscriber is dispatched for this event: they run only for events
    /// every synchronous subscriber accepted.
    pub async fn trigger_with(&self, event: T, one_off: &[Handler<T>]) -> Result<(), HookError> {
        let (sync, background) = {
            let subs = self.subscribers.read();
            (subs.sync.clone(), subs.background.clone())
        };

        let event = Arc::new(event);

        let registered = sync
            .iter()
            .map(|(id, handler)| (HandlerRef::Registered(*id), handler));
        let extra = one_off
            .iter()
            .enumerate()
            .map(|(index, handler)| (HandlerRef::OneOff(index), handler));

        for (handler_ref, handler) in registered.chain(extra) {
            handler(Arc::clone(&event))
                .await
                .map_err(|source| HookError {
                    hook: self.name.clone(),
                    handler: handler_ref,
                    source,
                })?;
        }

        for (id, handler) in background {
            self.dispatcher
                .dispatch(&self.name, id, handler(Arc::clone(&event)));
        }

        Ok(())
    }

    fn allocate_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self.subscribers.read();
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("sync", &subs.sync.len())
            .field("async", &subs.background.len())
            .finish()
    }
}
