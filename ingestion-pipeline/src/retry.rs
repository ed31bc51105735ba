use std::{future::Future, time::Duration};

use common::error::AppError;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tokio_util::sync::CancellationToken;

/// Fixed-delay retry policy shared by every call site that retries remote work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so at most `max_retries + 1` calls.
    pub max_retries: u32,
    pub delay: Duration,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: E },
    /// An attempt failed with an error the classifier rejected.
    Fatal { attempts: u32, last_error: E },
    Cancelled,
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.delay).take(usize::try_from(self.max_retries).unwrap_or(usize::MAX))
    }

    /// Run `op` until it succeeds, the classifier marks an error as fatal,
    /// the retry budget is spent, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. `on_retry` is called with the
    /// retry number (1 for the second attempt) right before each retry starts.
    pub async fn run<T, E, Op, Fut, Classify, OnRetry>(
        &self,
        cancel: &CancellationToken,
        mut op: Op,
        classify: Classify,
        mut on_retry: OnRetry,
    ) -> Result<T, RetryError<E>>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classify: Fn(&E) -> bool,
        OnRetry: FnMut(u32),
    {
        let mut attempts: u32 = 0;
        let outcome = {
            let action = || {
                attempts = attempts.saturating_add(1);
                if attempts > 1 {
                    on_retry(attempts.saturating_sub(1));
                }
                op(attempts)
            };
            let retry = RetryIf::spawn(self.strategy(), action, |err: &E| classify(err));

            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = retry => Some(result),
            }
        };

        match outcome {
            None => Err(RetryError::Cancelled),
            Some(Ok(value)) => Ok(value),
            Some(Err(last_error)) if classify(&last_error) => Err(RetryError::Exhausted {
                attempts,
                last_error,
            }),
            Some(Err(last_error)) => Err(RetryError::Fatal {
                attempts,
                last_error,
            }),
        }
    }
}

/// Network failures and unexpected remote responses are worth another try;
/// rejected input is not.
pub fn is_transient(err: &AppError) -> bool {
    !matches!(err, AppError::Validation(_) | AppError::Auth(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };
    use tokio::time::Instant;

    fn flaky(failures: u32) -> impl FnMut(u32) -> std::future::Ready<Result<u32, AppError>> {
        move |attempt| {
            if attempt <= failures {
                std::future::ready(Err(AppError::Processing(format!("attempt {attempt}"))))
            } else {
                std::future::ready(Ok(attempt))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures_with_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
        let mut retries = Vec::new();
        let started = Instant::now();

        let result = policy
            .run(
                &CancellationToken::new(),
                flaky(2),
                is_transient,
                |retry| retries.push(retry),
            )
            .await
            .expect("third attempt succeeds");

        assert_eq!(result, 3);
        assert_eq!(retries, vec![1, 2]);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(10));
        let mut retries = Vec::new();

        let err = policy
            .run(
                &CancellationToken::new(),
                flaky(u32::MAX),
                is_transient,
                |retry| retries.push(retry),
            )
            .await
            .expect_err("all attempts fail");

        assert!(matches!(err, RetryError::Exhausted { attempts: 4, .. }));
        assert_eq!(retries, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_stop_immediately() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let err = policy
            .run(
                &CancellationToken::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Err::<(), _>(AppError::Validation("bad url".into())))
                },
                is_transient,
                |_| {},
            )
            .await
            .expect_err("validation errors are fatal");

        assert!(matches!(err, RetryError::Fatal { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let counted = Arc::clone(&calls);
        let err = policy
            .run(
                &cancel,
                move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Err::<(), _>(AppError::Processing("503".into())))
                },
                is_transient,
                |_| {},
            )
            .await
            .expect_err("cancelled");

        assert!(matches!(err, RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classifier_rejects_validation_and_auth() {
        assert!(is_transient(&AppError::Processing("503".into())));
        assert!(!is_transient(&AppError::Validation("bad".into())));
        assert!(!is_transient(&AppError::Auth("denied".into())));
    }
}
