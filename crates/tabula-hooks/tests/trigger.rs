//! Behavioural tests for [`Hook::trigger`]: fail-fast sync subscribers,
//! isolated async subscribers, and concurrent registration.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tabula_hooks::{Dispatcher, HandlerRef, Hook};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
#[error("owner required")]
struct OwnerRequired;

#[derive(Debug, Clone)]
struct Created {
    table: String,
}

#[tokio::test]
async fn second_handler_failure_stops_the_third() {
    let hook: Hook<Created> = Hook::new("before_create");
    let first = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    hook.add(move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    let failing = hook.add(|_| async { Err(OwnerRequired.into()) });
    let counter = Arc::clone(&third);
    hook.add(move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let err = hook
        .trigger(Created {
            table: "organisations".to_owned(),
        })
        .await
        .expect_err("second handler vetoes");

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 0);
    assert_eq!(err.handler, HandlerRef::Registered(failing));
    assert!(err.downcast_ref::<OwnerRequired>().is_some());
}

#[tokio::test]
async fn async_failure_is_isolated_from_caller_and_siblings() {
    let hook: Hook<Created> = Hook::new("after_create");
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    hook.add_async(|_| async { anyhow::bail!("mailer unavailable") });
    let sender = tx.clone();
    hook.add_async(move |event: Arc<Created>| {
        let sender = sender.clone();
        async move {
            sender.send(event.table.clone())?;
            Ok(())
        }
    });
    drop(tx);

    let result = hook
        .trigger(Created {
            table: "invoices".to_owned(),
        })
        .await;
    assert!(result.is_ok());

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("sibling async handler ran");
    assert_eq!(received.as_deref(), Some("invoices"));
}

#[tokio::test]
async fn vetoed_events_never_reach_async_handlers() {
    let hook: Hook<Created> = Hook::new("before_delete");
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ran);
    hook.add_async(move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    let veto = hook.add(|_| async { anyhow::bail!("blocked") });

    let result = hook
        .trigger(Created {
            table: "accounts".to_owned(),
        })
        .await;
    assert!(result.is_err());

    hook.dispatcher().drain().await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    assert!(hook.remove(veto));
    hook.trigger(Created {
        table: "accounts".to_owned(),
    })
    .await
    .expect("accepted");
    hook.dispatcher().drain().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_and_trigger_are_safe() {
    let dispatcher = Dispatcher::new(8);
    let hook: Arc<Hook<Created>> = Arc::new(Hook::with_dispatcher("after_update", dispatcher));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let hook = Arc::clone(&hook);
        let calls = Arc::clone(&calls);
        tasks.push(tokio::spawn(async move {
            let counter = Arc::clone(&calls);
            hook.add(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
            hook.add_async(|_| async { Ok(()) });
            hook.trigger(Created {
                table: "accounts".to_owned(),
            })
            .await
        }));
    }

    for task in tasks {
        assert!(task.await.expect("task joined").is_ok());
    }

    assert_eq!(hook.len(), 16);
    assert_eq!(hook.async_len(), 16);
    // Each trigger sees at least the handler its own task registered.
    assert!(calls.load(Ordering::SeqCst) >= 16);

    hook.dispatcher().drain().await;
    assert_eq!(hook.dispatcher().in_flight(), 0);
}
