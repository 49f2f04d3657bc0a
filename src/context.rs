//! Request-scoped cancellation and deadlines.
//!
//! Every service call runs its store futures through [`RequestContext::run`],
//! so a cancelled or timed-out request drops the in-flight query instead of
//! letting it finish in the background.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Option<watch::Receiver<bool>>,
}

/// Fires the cancellation signal of the context it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub const fn background() -> Self {
        Self {
            deadline: None,
            cancelled: None,
        }
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: None,
        }
    }

    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancelled: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this context is already done, if any.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.cancelled.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(ContextError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(ContextError::DeadlineExceeded);
        }
        None
    }

    /// Drives `fut` until it completes or the context is done, whichever comes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ContextError>
    where
        F: Future<Output = T>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let mut cancelled = self.cancelled.clone();
        let deadline = self.deadline;

        tokio::select! {
            biased;

            () = wait_cancelled(cancelled.as_mut()) => Err(ContextError::Cancelled),
            () = wait_deadline(deadline) => Err(ContextError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

async fn wait_cancelled(rx: Option<&mut watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            // A dropped handle can never fire, so park forever in that case.
            let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
            if closed {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
