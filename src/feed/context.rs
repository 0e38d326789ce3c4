//! Deadline and cancellation carried through a refresh.
//!
//! A [`FetchContext`] is cheap to clone and is handed to every fetcher. All
//! network work runs through [`FetchContext::run`], which returns
//! [`FlyfeedError::Timeout`] or [`FlyfeedError::Cancelled`] as soon as the
//! deadline passes or the owner cancels, dropping the in-flight future.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{FlyfeedError, Result};

/// Deadline and cancellation signal for one unit of work.
#[derive(Debug, Clone)]
pub struct FetchContext {
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

/// Owner side of a cancellable [`FetchContext`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every context derived from this handle.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl FetchContext {
    /// A context with no deadline that is never cancelled.
    pub fn background() -> Self {
        // Sender dropped immediately: the receiver keeps `false` forever.
        let (_, cancel) = watch::channel(false);
        Self {
            deadline: None,
            cancel,
        }
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// A context that can be cancelled through the returned handle.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, cancel) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel,
            },
            CancelHandle { sender },
        )
    }

    /// Derive a context whose deadline is the earlier of ours and `now + timeout`.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FlyfeedError::Cancelled)
        } else if self.is_expired() {
            Err(FlyfeedError::Timeout)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` to completion unless the context ends first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            loop {
                if cancel.changed().await.is_err() {
                    // Owner gone without cancelling: never fires.
                    std::future::pending::<()>().await;
                }
                if *cancel.borrow() {
                    return;
                }
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = cancelled => Err(FlyfeedError::Cancelled),
            _ = expired => Err(FlyfeedError::Timeout),
        }
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::background()
    }
}
