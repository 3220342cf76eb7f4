//! Cancellation scopes: a deadline plus an explicit cancel signal, passed
//! down to every suspension point instead of relying on ambient globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Clone)]
pub struct CancellationScope {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    Completed,
    TimedOut,
    Cancelled,
}

impl CancellationScope {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.map(|d| Instant::now() + d),
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// A child scope bounded by the earlier of the parent's remaining
    /// deadline and `timeout`; cancelling the parent cancels the child.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let child_deadline = timeout.map(|d| Instant::now() + d);
        let deadline = match (self.deadline, child_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        Self {
            deadline,
            cancelled: self.cancelled.clone(),
            notify: self.notify.clone(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `fut` to completion unless the scope expires or is cancelled
    /// first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ScopeOutcome>
    where
        F: std::future::Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(ScopeOutcome::Cancelled);
        }
        if self.is_expired() {
            return Err(ScopeOutcome::TimedOut);
        }

        tokio::select! {
            biased;
            _ = self.notify.notified(), if !self.is_cancelled() => Err(ScopeOutcome::Cancelled),
            _ = sleep_until_deadline(self.deadline) => Err(ScopeOutcome::TimedOut),
            out = fut => Ok(out),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let scope = CancellationScope::new(Some(Duration::from_millis(100)));
        let result = scope.run(async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn times_out_past_deadline() {
        let scope = CancellationScope::new(Some(Duration::from_millis(10)));
        let result = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                1
            })
            .await;
        assert_eq!(result, Err(ScopeOutcome::TimedOut));
    }

    #[tokio::test]
    async fn cancellation_propagates_to_child() {
        let parent = CancellationScope::new(None);
        let child = parent.child(Some(Duration::from_secs(10)));
        parent.cancel();
        let result = child.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(ScopeOutcome::Cancelled));
    }

    #[tokio::test]
    async fn child_deadline_is_min_of_parent_and_own() {
        let parent = CancellationScope::new(Some(Duration::from_millis(10)));
        let child = parent.child(Some(Duration::from_secs(10)));
        let result = child
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
            })
            .await;
        assert_eq!(result, Err(ScopeOutcome::TimedOut));
    }
}
