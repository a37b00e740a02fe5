//! Completion poller
//!
//! Waits for a run to leave `running` by querying its status with a growing
//! delay:
//!
//! ```text
//! call ─ 160ms ─ call ─ 192ms ─ call ─ 224ms ─ ... ─ 1024ms ─ call ─ 1024ms ...
//! ```
//!
//! The interval grows by one increment before every wait, so the first wait
//! is already one step above the starting interval. The first call is
//! immediate. At most `max_attempts` calls are made and
//! only one is in flight at a time. A failing call ends the poll at once.
//! The cancellation token is honored during both status calls and waits.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AppRunError, EngineError};
use crate::model::RunStatus;
use crate::util::{POLL_CEILING, POLL_INCREMENT, POLL_INTERVAL, POLL_MAX_ATTEMPTS};

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Starting interval, grown once before the first wait
    pub interval: Duration,
    /// Growth of the wait after each running status
    pub increment: Duration,
    /// Cap on the wait
    pub ceiling: Duration,
    /// Maximum number of status calls
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            increment: POLL_INCREMENT,
            ceiling: POLL_CEILING,
            max_attempts: POLL_MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Check the parameters describe a bounded, non-decreasing backoff
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.increment.is_zero() {
            return Err("increment must be greater than 0".to_string());
        }
        if self.interval > self.ceiling {
            return Err(format!(
                "interval ({}ms) exceeds ceiling ({}ms)",
                self.interval.as_millis(),
                self.ceiling.as_millis()
            ));
        }
        Ok(())
    }

    /// Every wait a full-length poll would go through, in order
    pub fn waits(&self) -> Vec<Duration> {
        let mut state = PollState::new(self);
        std::iter::from_fn(|| state.advance()).collect()
    }
}

/// Per-submission retry state
#[derive(Debug, Clone)]
pub struct PollState {
    attempts: u32,
    interval: Duration,
    increment: Duration,
    ceiling: Duration,
    max_attempts: u32,
}

impl PollState {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            attempts: 0,
            interval: config.interval,
            increment: config.increment,
            ceiling: config.ceiling,
            max_attempts: config.max_attempts,
        }
    }

    /// Record a status call that found the run still running.
    ///
    /// Returns the wait before the next call, or `None` when the attempt
    /// budget is spent.
    pub fn advance(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.interval = (self.interval + self.increment).min(self.ceiling);
        Some(self.interval)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Why a poll did not produce a terminal status
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("status call failed: {0}")]
    Engine(EngineError),

    #[error("run still running after {attempts} status calls")]
    Timeout { attempts: u32 },

    #[error("poll cancelled")]
    Cancelled,
}

impl PollError {
    /// Attach the run id to build the crate error
    pub fn into_run_error(self, run_id: &str) -> AppRunError {
        match self {
            PollError::Engine(source) => AppRunError::RunStatus {
                run_id: run_id.to_string(),
                source,
            },
            PollError::Timeout { attempts } => AppRunError::RunTimeout {
                run_id: run_id.to_string(),
                attempts,
            },
            PollError::Cancelled => AppRunError::RunCancelled {
                run_id: run_id.to_string(),
            },
        }
    }
}

/// Adaptive-backoff status poller
#[derive(Debug, Clone, Default)]
pub struct CompletionPoller {
    config: PollConfig,
}

impl CompletionPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Query `status_fn` until the run is no longer running
    pub async fn poll_until_done<F, Fut>(
        &self,
        run_id: &str,
        mut status_fn: F,
        cancel: &CancellationToken,
    ) -> Result<RunStatus, PollError>
    where
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<RunStatus, EngineError>>,
    {
        let mut state = PollState::new(&self.config);

        loop {
            debug!(
                run_id,
                attempts = state.attempts(),
                max_attempts = self.config.max_attempts,
                interval_ms = state.interval.as_millis() as u64,
                increment_ms = self.config.increment.as_millis() as u64,
                ceiling_ms = self.config.ceiling.as_millis() as u64,
                "Executing poll"
            );

            let status = tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                status = status_fn(run_id) => status,
            };

            let status = match status {
                Ok(status) => status,
                Err(e) => {
                    warn!(run_id, error = %e, "Status call failed, stopping poll");
                    return Err(PollError::Engine(e));
                }
            };

            if !status.is_running() {
                debug!(run_id, status = status.run.as_str(), calls = state.attempts() + 1, "Run finished");
                return Ok(status);
            }

            let Some(wait) = state.advance() else {
                warn!(run_id, attempts = state.attempts(), "Run still running, giving up");
                return Err(PollError::Timeout {
                    attempts: state.attempts(),
                });
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn waits_grow_by_increment_up_to_ceiling() {
        let waits = PollConfig::default().waits();

        assert_eq!(waits.len(), 63);
        assert_eq!(&waits[..4], &[ms(160), ms(192), ms(224), ms(256)]);
        assert!(waits.windows(2).all(|w| w[0] <= w[1]));
        assert!(waits.iter().all(|w| *w <= ms(1024)));
        assert_eq!(*waits.last().unwrap(), ms(1024));
    }

    #[test]
    fn validate_rejects_inconsistent_configs() {
        let mut config = PollConfig::default();
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PollConfig::default();
        config.interval = ms(2048);
        assert!(config.validate().is_err());

        let mut config = PollConfig::default();
        config.increment = Duration::ZERO;
        assert!(config.validate().is_err());

        assert!(PollConfig::default().validate().is_ok());
    }

    #[test]
    fn single_attempt_budget_never_waits() {
        let config = PollConfig {
            max_attempts: 1,
            ..PollConfig::default()
        };
        assert!(config.waits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_and_waits_follow_backoff() {
        let poller = CompletionPoller::default();
        let started = tokio::time::Instant::now();
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let status = poller
            .poll_until_done(
                "run-1",
                |_| {
                    let calls = Arc::clone(&calls);
                    async move {
                        let mut calls = calls.lock();
                        calls.push(started.elapsed());
                        let state = if calls.len() < 4 {
                            RunState::Running
                        } else {
                            RunState::Succeeded
                        };
                        Ok(RunStatus::new(state))
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status.run, RunState::Succeeded);
        let calls = calls.lock().clone();
        assert_eq!(calls, vec![ms(0), ms(160), ms(352), ms(576)]);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_max_attempts() {
        let poller = CompletionPoller::default();
        let count = AtomicU32::new(0);

        let err = poller
            .poll_until_done(
                "run-1",
                |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                    async { Ok(RunStatus::new(RunState::Running)) }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Timeout { attempts: 64 }));
        assert_eq!(count.load(Ordering::SeqCst), 64);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_error_stops_immediately() {
        let poller = CompletionPoller::default();
        let count = AtomicU32::new(0);

        let err = poller
            .poll_until_done(
                "run-1",
                |_| {
                    let n = count.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Ok(RunStatus::new(RunState::Running))
                        } else {
                            Err(EngineError::transport("connection reset"))
                        }
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Engine(_)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let poller = CompletionPoller::default();
        let cancel = CancellationToken::new();
        let count = AtomicU32::new(0);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ms(200)).await;
            trigger.cancel();
        });

        let err = poller
            .poll_until_done(
                "run-1",
                |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                    async { Ok(RunStatus::new(RunState::Running)) }
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn timeout_maps_to_run_timeout() {
        let err = PollError::Timeout { attempts: 64 }.into_run_error("run-1");
        assert!(matches!(err, AppRunError::RunTimeout { attempts: 64, .. }));
    }
}
