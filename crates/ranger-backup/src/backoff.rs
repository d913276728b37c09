// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Bounded backoff across retry rounds.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BackupError, Result};

/// Sleeps between retry rounds while keeping the total under a budget.
#[derive(Debug)]
pub struct Backoffer {
    budget: Duration,
    slept: Duration,
}

impl Backoffer {
    /// Creates a backoffer allowed to sleep `budget` in total.
    pub fn new(budget: Duration) -> Self {
        Self { budget, slept: Duration::ZERO }
    }

    /// Total time slept so far.
    pub fn slept(&self) -> Duration {
        self.slept
    }

    /// Remaining budget.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.slept)
    }

    /// Sleeps for `delay`, capped at the remaining budget.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::BackoffExhausted`] if the budget is already
    /// spent, and [`BackupError::Cancelled`] if `cancel` fires while sleeping.
    pub async fn backoff(&mut self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        if self.slept >= self.budget {
            return Err(BackupError::BackoffExhausted {
                budget_ms: self.budget.as_millis() as u64,
                slept_ms: self.slept.as_millis() as u64,
            });
        }

        let delay = delay.min(self.remaining());
        debug!(
            delay_ms = delay.as_millis() as u64,
            slept_ms = self.slept.as_millis() as u64,
            "Backing off before next round"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackupError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        self.slept += delay;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_is_capped_by_budget() {
        let mut backoffer = Backoffer::new(Duration::from_millis(30));
        let cancel = CancellationToken::new();

        backoffer.backoff(Duration::from_millis(20), &cancel).await.unwrap();
        assert_eq!(backoffer.slept(), Duration::from_millis(20));

        backoffer.backoff(Duration::from_millis(50), &cancel).await.unwrap();
        assert_eq!(backoffer.slept(), Duration::from_millis(30));
        assert_eq!(backoffer.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_fatal() {
        let mut backoffer = Backoffer::new(Duration::from_millis(5));
        let cancel = CancellationToken::new();

        backoffer.backoff(Duration::from_millis(10), &cancel).await.unwrap();
        let err = backoffer.backoff(Duration::from_millis(1), &cancel).await.unwrap_err();
        assert!(matches!(err, BackupError::BackoffExhausted { budget_ms: 5, slept_ms: 5 }));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_sleep() {
        let mut backoffer = Backoffer::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = backoffer.backoff(Duration::from_secs(30), &cancel).await.unwrap_err();
        assert!(matches!(err, BackupError::Cancelled));
        assert_eq!(backoffer.slept(), Duration::ZERO);
    }
}
