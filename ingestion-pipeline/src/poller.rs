use std::{sync::Arc, time::Duration};

use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::pipeline::ReadinessCheck;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Checks answered with "not ready" before giving up. At least one check
    /// is always made.
    pub max_attempts: u32,
    /// Wall-clock ceiling covering every check, including failed ones.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    NotReady { attempt: u32 },
    CheckFailed { consecutive_failures: u32 },
    Ready { attempt: u32 },
}

#[derive(Debug)]
pub enum PollError {
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    },
    Cancelled,
}

pub struct ReadinessPoller {
    check: Arc<dyn ReadinessCheck>,
}

impl ReadinessPoller {
    pub fn new(check: Arc<dyn ReadinessCheck>) -> Self {
        Self { check }
    }

    /// Check readiness right away and then every `interval` until a check
    /// says yes.
    ///
    /// Only answered checks count as attempts. Checks that error out are
    /// retried on the same schedule and are bounded by `timeout` alone.
    /// Returns the number of answered checks.
    #[instrument(level = "trace", skip_all, fields(owner_id = %owner_id))]
    pub async fn wait_until_ready(
        &self,
        owner_id: &str,
        settings: &PollSettings,
        cancel: &CancellationToken,
        mut on_event: impl FnMut(PollEvent),
    ) -> Result<u32, PollError> {
        let started = Instant::now();
        let deadline = started + settings.timeout;
        let mut attempts: u32 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut last_error: Option<String> = None;

        loop {
            let checked = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled),
                checked = timeout_at(deadline, self.check.check(owner_id)) => checked,
            };

            match checked {
                Ok(Ok(true)) => {
                    attempts = attempts.saturating_add(1);
                    on_event(PollEvent::Ready { attempt: attempts });
                    return Ok(attempts);
                }
                Ok(Ok(false)) => {
                    attempts = attempts.saturating_add(1);
                    consecutive_failures = 0;
                    debug!(attempt = attempts, "index not ready yet");
                    on_event(PollEvent::NotReady { attempt: attempts });
                }
                Ok(Err(err)) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(consecutive_failures, error = %err, "readiness check failed");
                    last_error = Some(err.to_string());
                    on_event(PollEvent::CheckFailed {
                        consecutive_failures,
                    });
                }
                Err(_) => {
                    last_error.get_or_insert_with(|| "readiness check timed out".to_string());
                    break;
                }
            }

            if attempts >= settings.max_attempts {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled),
                () = sleep_until((now + settings.interval).min(deadline)) => {}
            }
        }

        Err(PollError::TimedOut {
            attempts,
            elapsed: started.elapsed(),
            last_error,
        })
    }
}
