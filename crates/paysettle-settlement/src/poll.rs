//! Cancellable, time-bounded polling for confirmation depth.

use paysettle_core::config::ConfirmationConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SettlementError;

/// Result of one check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    Ready(T),
    /// Not final yet. `depth` is `None` while the indexer has not seen the
    /// transaction at all.
    Pending { depth: Option<u64> },
}

/// Bounded retry loop with a fixed interval and an overall deadline.
#[derive(Debug, Clone)]
pub struct ConfirmationPoller {
    max_attempts: u32,
    interval: Duration,
    deadline: Duration,
}

impl ConfirmationPoller {
    pub fn new(max_attempts: u32, interval: Duration, deadline: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            deadline,
        }
    }

    pub fn from_config(config: &ConfirmationConfig) -> Self {
        Self::new(config.max_attempts, config.interval(), config.deadline())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Check until it reports `Ready`, the attempts run out, the deadline
    /// passes or `cancel` fires.
    ///
    /// Exhausting the attempts yields `NotFound` if the transaction never
    /// showed up and `Unconfirmed` if it did but stayed too shallow.
    pub async fn run<T, F, Fut>(
        &self,
        rail: &str,
        reference: &str,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<T, SettlementError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollState<T>, SettlementError>>,
    {
        let started = Instant::now();
        let deadline = started + self.deadline;
        let mut last_depth = None;

        for attempt in 1..=self.max_attempts {
            let state = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SettlementError::Cancelled(reference.to_string()));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(SettlementError::DeadlineExceeded {
                        reference: reference.to_string(),
                        waited: started.elapsed(),
                    });
                }
                state = check(attempt) => state?,
            };

            match state {
                PollState::Ready(value) => return Ok(value),
                PollState::Pending { depth } => {
                    last_depth = depth;
                    tracing::debug!(
                        rail = %rail,
                        reference = %reference,
                        attempt,
                        depth = ?depth,
                        "transfer not final yet"
                    );
                }
            }

            if attempt == self.max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SettlementError::Cancelled(reference.to_string()));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(SettlementError::DeadlineExceeded {
                        reference: reference.to_string(),
                        waited: started.elapsed(),
                    });
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::warn!(
            rail = %rail,
            reference = %reference,
            attempts = self.max_attempts,
            depth = ?last_depth,
            "gave up waiting for confirmations"
        );
        Err(match last_depth {
            None => SettlementError::NotFound {
                rail: rail.to_string(),
                reference: reference.to_string(),
            },
            Some(depth) => SettlementError::Unconfirmed {
                rail: rail.to_string(),
                reference: reference.to_string(),
                depth,
                attempts: self.max_attempts,
            },
        })
    }
}
