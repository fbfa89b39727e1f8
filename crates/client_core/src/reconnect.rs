//! Fixed-backoff reconnection on top of the single-connection progress
//! stream. The plain subscription never reconnects; callers opt in here.

use std::{sync::Arc, time::Duration};

use shared::domain::{BookId, ProgressEvent};

use crate::{
    error::StreamError,
    progress::{Listener, Subscription},
    GenerationClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// Consecutive reconnects allowed without receiving an event.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 0,
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Tracks reconnects spent under a policy. A connection that delivered at
/// least one event refills the budget.
#[derive(Debug)]
pub(crate) struct RetryBudget {
    policy: ReconnectPolicy,
    used: u32,
}

impl RetryBudget {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, used: 0 }
    }

    pub(crate) fn used(&self) -> u32 {
        self.used
    }

    /// Called when a connection ends. Returns the delay before the next
    /// attempt, or `None` when the budget is exhausted.
    pub(crate) fn after_connection(&mut self, delivered: usize) -> Option<Duration> {
        if delivered > 0 {
            self.used = 0;
        }
        if self.used >= self.policy.max_attempts {
            return None;
        }
        self.used += 1;
        Some(self.policy.delay)
    }
}

impl GenerationClient {
    /// Progress subscription that reopens the stream after it ends or fails,
    /// following `policy`. Every failed connection is still logged and
    /// reported to `on_error`.
    pub fn subscribe_with_reconnect<F, E>(
        &self,
        id: BookId,
        policy: ReconnectPolicy,
        on_progress: F,
        on_error: E,
    ) -> Subscription
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
        E: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.spawn_subscription(
            id,
            Listener::new(Arc::new(on_progress), Some(Arc::new(on_error))),
            policy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_policy_never_retries() {
        let mut budget = RetryBudget::new(ReconnectPolicy::none());
        assert_eq!(budget.after_connection(0), None);
        assert_eq!(budget.after_connection(5), None);
    }

    #[test]
    fn consecutive_failures_exhaust_budget() {
        let delay = Duration::from_millis(250);
        let mut budget = RetryBudget::new(ReconnectPolicy::fixed(delay, 2));
        assert_eq!(budget.after_connection(0), Some(delay));
        assert_eq!(budget.after_connection(0), Some(delay));
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.after_connection(0), None);
    }

    #[test]
    fn delivering_events_refills_budget() {
        let delay = Duration::from_millis(10);
        let mut budget = RetryBudget::new(ReconnectPolicy::fixed(delay, 1));
        assert_eq!(budget.after_connection(0), Some(delay));
        assert_eq!(budget.after_connection(3), Some(delay));
        assert_eq!(budget.used(), 1);
        assert_eq!(budget.after_connection(0), None);
    }
}
