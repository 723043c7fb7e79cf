//! Bounded runner for asynchronous hook subscribers.
//!
//! Async subscribers are never awaited by the trigger. Instead of spawning
//! an unbounded detached task per subscriber, every hook hands its futures
//! to a [`Dispatcher`], which:
//!
//! - caps the number of subscribers running at once with a semaphore,
//! - tracks every spawned task so shutdown can wait for them,
//! - races each subscriber against a shared [`CancellationToken`].
//!
//! A subscriber whose body never yields cannot be interrupted; cancellation
//! takes effect at its next await point.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::hook::{HandlerId, HandlerResult};

/// Default cap on concurrently running async subscribers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

/// Shared runner for async subscribers. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher that runs at most `max_concurrency` subscribers
    /// at once. A value of zero is treated as one.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a subscriber future.
    ///
    /// Returns immediately. The future waits for a permit, then runs until
    /// it completes or the dispatcher is shut down. Errors are logged and
    /// go nowhere else.
    pub fn dispatch(
        &self,
        hook: &str,
        handler: HandlerId,
        work: BoxFuture<'static, HandlerResult>,
    ) {
        if self.cancel.is_cancelled() {
            warn!(hook, handler_id = %handler, "Dispatcher shut down, dropping async handler");
            return;
        }

        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let hook = hook.to_owned();

        self.tracker.spawn(async move {
            let run = async move {
                let _permit = permits.acquire_owned().await.ok();
                work.await
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(hook = %hook, handler_id = %handler, "Async handler cancelled");
                }
                result = run => {
                    if let Err(e) = result {
                        error!(hook = %hook, handler_id = %handler, error = %e, "Async hook handler failed");
                    }
                }
            }
        });
    }

    /// Number of async subscribers queued or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every subscriber dispatched so far has finished.
    ///
    /// The dispatcher keeps accepting work afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel all queued and running subscribers and wait for them to stop.
    ///
    /// Further dispatches are dropped with a warning.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Hook dispatcher shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.tracker.len())
            .field("available_permits", &self.permits.available_permits())
            .field("shut_down", &self.cancel.is_cancelled())
            .finish()
    }
}
