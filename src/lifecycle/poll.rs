//! Interval/deadline polling shared by every lifecycle phase

use super::Phase;
use crate::error::{E2eError, E2eResult};

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Every wait and delay the orchestrator uses
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub await_create: PollPolicy,
    pub await_lock: PollPolicy,
    pub await_completion: PollPolicy,
    pub settle_delay: Duration,
    pub cleanup_settle: Duration,
    pub bulk_spacing: Duration,
    pub suite: PollPolicy,
}

/// Probe once per interval until it yields a value or the phase deadline passes.
///
/// The first probe runs one interval after the call. Retryable errors are
/// logged and polled through; any other error ends the wait.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, phase: Phase, mut probe: F) -> E2eResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Option<T>>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut ticker = interval_at(started + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = sleep_until(deadline) => break Err(E2eError::LifecycleTimeout { phase }),
            _ = ticker.tick() => {}
        }

        crate::metrics::record_poll_tick(phase.as_str());
        match timeout_at(deadline, probe()).await {
            Err(_) => break Err(E2eError::LifecycleTimeout { phase }),
            Ok(Ok(Some(value))) => break Ok(value),
            Ok(Ok(None)) => trace!("{}: condition not met yet", phase),
            Ok(Err(e)) if e.is_retryable() => debug!("{}: transient error: {}", phase, e),
            Ok(Err(e)) => break Err(e),
        }
    };

    crate::metrics::record_phase_duration(phase.as_str(), started.elapsed().as_secs_f64());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(interval_ms: u64, timeout_ms: u64) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_returns_first_value() {
        let calls = AtomicUsize::new(0);
        let value = poll_until(policy(5, 1_000), Phase::AwaitLock, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n == 2 { Some(n) } else { None }) }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_bounded_by_interval() {
        let interval = Duration::from_millis(20);
        let timeout = Duration::from_millis(100);
        let started = std::time::Instant::now();

        let err = poll_until(PollPolicy::new(interval, timeout), Phase::AwaitCreate, || async {
            Ok::<Option<()>, E2eError>(None)
        })
        .await
        .unwrap_err();

        let elapsed = started.elapsed();
        assert!(matches!(
            err,
            E2eError::LifecycleTimeout {
                phase: Phase::AwaitCreate
            }
        ));
        assert!(elapsed >= interval);
        assert!(elapsed < timeout + interval + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_retryable_errors_keep_polling() {
        let calls = AtomicUsize::new(0);
        let value = poll_until(policy(5, 1_000), Phase::AwaitCompletion, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(E2eError::rpc(Chain::Ledger, "connection reset"))
                } else {
                    Ok(Some("done"))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_fatal_errors_stop_polling() {
        let calls = AtomicUsize::new(0);
        let err = poll_until(policy(5, 1_000), Phase::AwaitLock, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Option<()>, _>(E2eError::Decode("bad hex".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::Decode(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_probe_cannot_outlive_deadline() {
        let started = std::time::Instant::now();
        let err = poll_until(policy(5, 50), Phase::AwaitCompletion, || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some(()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::LifecycleTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
