//! Generic publish/subscribe hooks for the Tabula record store.
//!
//! A [`Hook<T>`] owns two ordered lists of subscribers for one event type:
//! synchronous subscribers run in registration order on the triggering task
//! and may veto the operation by returning an error; asynchronous subscribers
//! run on a bounded [`Dispatcher`] and can never veto.
//!
//! # Modules
//!
//! - [`hook`] -- The [`Hook<T>`] registry and trigger logic
//! - [`dispatcher`] -- Bounded, cancellable runner for async subscribers
//! - [`error`] -- [`HookError`], the veto carried back to the caller

pub mod dispatcher;
pub mod error;
pub mod hook;

pub use dispatcher::{DEFAULT_MAX_CONCURRENCY, Dispatcher};
pub use error::{HandlerRef, HookError};
pub use hook::{Handler, HandlerId, HandlerResult, Hook, handler};
