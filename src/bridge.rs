//! Execution bridge between async request handling and blocking datastore calls.
//!
//! The MongoDB driver is used through its synchronous API. Running such a call
//! directly on the request loop would stall every other request, so the bridge
//! moves it onto Tokio's blocking pool and suspends only the calling task.
//!
//! ```text
//!  request task ──run()──▶ spawn_blocking ──▶ worker thread
//!       ▲                                          │
//!       └──────────── DbResult<T> ◀────────────────┘
//! ```
//!
//! A cancelled token or an elapsed timeout releases the caller immediately.
//! A worker that has not started yet sees the cancellation and skips the
//! operation; one that is already running finishes in the background and its
//! result is discarded.

use std::any::Any;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::db::{DbError, DbResult};

/// Offloads blocking operations to a worker pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionBridge {
    /// Upper bound on each offloaded call, if any.
    timeout: Option<Duration>,
}

impl ExecutionBridge {
    /// Creates a bridge with an optional per-call timeout.
    #[must_use]
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs `operation` on the blocking pool and waits for its result.
    ///
    /// Without a Tokio runtime on the current thread the operation runs
    /// inline; the result is the same, only concurrency differs.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error unchanged, [`DbError::Cancelled`]
    /// if `cancel` fires first, [`DbError::Timeout`] if the configured timeout
    /// elapses, or [`DbError::Worker`] if the worker panics.
    pub async fn run<F, T>(&self, cancel: &CancellationToken, operation: F) -> DbResult<T>
    where
        F: FnOnce() -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::trace!("no Tokio runtime available, running operation inline");
            return operation();
        };

        let worker_token = cancel.child_token();
        // Cancels the worker's token if this future is dropped or times out.
        let _guard = worker_token.clone().drop_guard();

        let task = runtime.spawn_blocking(move || {
            if worker_token.is_cancelled() {
                return Err(DbError::Cancelled);
            }
            operation()
        });

        let guarded = async {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(DbError::Cancelled),
                joined = task => joined.unwrap_or_else(|e| Err(worker_error(e))),
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .unwrap_or_else(|_| {
                    Err(DbError::Timeout {
                        millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
            None => guarded.await,
        }
    }
}

fn worker_error(e: JoinError) -> DbError {
    if e.is_panic() {
        let message = panic_message(&*e.into_panic());
        tracing::error!(panic = %message, "Datastore worker panicked");
        DbError::Worker { message }
    } else {
        DbError::Worker {
            message: e.to_string(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};

    #[tokio::test]
    async fn returns_operation_value() {
        let bridge = ExecutionBridge::default();
        let value = bridge
            .run(&CancellationToken::new(), || Ok(21 * 2))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn propagates_operation_error_unchanged() {
        let bridge = ExecutionBridge::default();
        let err = bridge
            .run::<_, ()>(&CancellationToken::new(), || {
                Err(DbError::operation("E11000 duplicate key"))
            })
            .await
            .unwrap_err();
        match err {
            DbError::Operation { message } => assert_eq!(message, "E11000 duplicate key"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_panic_becomes_error() {
        let bridge = ExecutionBridge::default();
        let err = bridge
            .run::<_, ()>(&CancellationToken::new(), || panic!("driver exploded"))
            .await
            .unwrap_err();
        match err {
            DbError::Worker { message } => assert!(message.contains("driver exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_loop_stays_responsive() {
        let bridge = ExecutionBridge::default();
        let (tx, rx) = mpsc::channel::<u32>();

        // The blocking call waits for a value that only another async task
        // sends. Running it inline on this single-threaded runtime would
        // deadlock.
        let token = CancellationToken::new();
        let blocked = bridge.run(&token, move || {
            rx.recv().map_err(|e| DbError::operation(e.to_string()))
        });
        let sender = async move {
            tokio::task::yield_now().await;
            tx.send(7).unwrap();
        };

        let (value, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(blocked, sender)
        })
        .await
        .expect("bridge blocked the runtime");
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancellation_releases_caller() {
        let bridge = ExecutionBridge::default();
        let token = CancellationToken::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let canceller = {
            let token = token.clone();
            async move {
                tokio::task::yield_now().await;
                token.cancel();
            }
        };
        let blocked = bridge.run(&token, move || {
            let _ = release_rx.recv();
            Ok(())
        });

        let (result, ()) = tokio::join!(blocked, canceller);
        assert!(matches!(result, Err(DbError::Cancelled)));
        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn cancelled_token_skips_operation() {
        let bridge = ExecutionBridge::default();
        let token = CancellationToken::new();
        token.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let result = bridge
            .run(&token, move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DbError::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn timeout_elapses() {
        let bridge = ExecutionBridge::new(Some(Duration::from_millis(20)));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let result = bridge
            .run(&CancellationToken::new(), move || {
                let _ = release_rx.recv();
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DbError::Timeout { millis: 20 })));
        let _ = release_tx.send(());
    }

    #[test]
    fn runs_inline_without_runtime() {
        let bridge = ExecutionBridge::default();
        let caller = std::thread::current().id();

        let worker = futures::executor::block_on(
            bridge.run(&CancellationToken::new(), move || Ok(std::thread::current().id())),
        )
        .unwrap();
        assert_eq!(worker, caller);
    }
}
