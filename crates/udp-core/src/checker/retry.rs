use tracing::{debug, info, warn};

use super::verdict::{FailureKind, StreamStatus};
use crate::address::StreamAddress;
use crate::config::CheckConfig;
use crate::probe::{ProbeOutcome, StreamProbe};

/// Verdict of the retry loop for one parsed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    pub status: StreamStatus,
    pub failure: Option<FailureKind>,
    pub reason: String,
    pub attempts: u32,
}

impl RetryOutcome {
    fn up(outcome: &ProbeOutcome, attempts: u32) -> Self {
        Self {
            status: StreamStatus::Up,
            failure: None,
            reason: outcome.to_string(),
            attempts,
        }
    }

    fn down(failure: FailureKind, reason: String, attempts: u32) -> Self {
        Self {
            status: StreamStatus::Down,
            failure: Some(failure),
            reason,
            attempts,
        }
    }
}

/// Maps a non-alive outcome to its failure category and reason.
fn classify(outcome: &ProbeOutcome) -> (FailureKind, String) {
    match outcome.failure_kind() {
        Some(kind) => (kind, outcome.to_string()),
        // Bound without data while data is required: nothing arrived.
        None => (FailureKind::Timeout, "bound but no data observed".to_string()),
    }
}

/// Probes `address` up to `retry_attempts + 1` times with a fixed delay
/// between attempts.
///
/// The first alive outcome wins. `InvalidAddress` stops immediately. On
/// exhaustion the reason of the last attempt is reported.
pub async fn check_with_retry(
    probe: &dyn StreamProbe,
    address: &StreamAddress,
    config: &CheckConfig,
) -> RetryOutcome {
    let max_attempts = config.max_attempts();
    let mut last_failure = (FailureKind::Timeout, String::from("no attempt made"));
    let mut attempts = 0;

    while attempts < max_attempts {
        attempts += 1;
        info!(stream = %address, attempt = attempts, max_attempts, "Checking stream");

        let outcome = probe
            .probe(address, config.timeout, config.require_data)
            .await;

        if outcome.is_alive(config.require_data) {
            return RetryOutcome::up(&outcome, attempts);
        }

        let (kind, reason) = classify(&outcome);
        if outcome.is_terminal() {
            warn!(stream = %address, %reason, "Address rejected, not retrying");
            return RetryOutcome::down(kind, reason, attempts);
        }
        last_failure = (kind, reason);

        if attempts < max_attempts {
            debug!(
                stream = %address,
                reason = %last_failure.1,
                delay_ms = config.retry_delay.as_millis() as u64,
                "Retrying after delay"
            );
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    let (kind, reason) = last_failure;
    warn!(stream = %address, attempts, %reason, "Stream is down");
    RetryOutcome::down(kind, reason, attempts)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Plays back scripted outcomes, repeating the last one.
    struct ScriptedProbe {
        script: Mutex<Vec<ProbeOutcome>>,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(mut script: Vec<ProbeOutcome>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StreamProbe for ScriptedProbe {
        async fn probe(&self, _: &StreamAddress, _: Duration, _: bool) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script[0].clone()
            }
        }
    }

    fn addr() -> StreamAddress {
        StreamAddress::parse("udp://239.1.1.1:1234").unwrap()
    }

    fn data() -> ProbeOutcome {
        ProbeOutcome::DataReceived {
            bytes: 1316,
            from: "10.0.0.9:4000".parse().unwrap(),
        }
    }

    fn config(retries: u32) -> CheckConfig {
        CheckConfig::default()
            .with_retry_attempts(retries)
            .with_retry_delay(10)
            .with_timeout(10)
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_short_circuits() {
        let probe = ScriptedProbe::new(vec![data()]);
        let out = check_with_retry(&probe, &addr(), &config(2)).await;
        assert_eq!(out.status, StreamStatus::Up);
        assert_eq!(out.attempts, 1);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_failures_stops_retrying() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Timeout, data(), ProbeOutcome::Timeout]);
        let out = check_with_retry(&probe, &addr(), &config(5)).await;
        assert_eq!(out.status, StreamStatus::Up);
        assert_eq!(out.attempts, 2);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retry_attempts_plus_one() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Timeout]);
        let out = check_with_retry(&probe, &addr(), &config(2)).await;
        assert_eq!(out.status, StreamStatus::Down);
        assert_eq!(out.failure, Some(FailureKind::Timeout));
        assert_eq!(out.attempts, 3);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Timeout]);
        let out = check_with_retry(&probe, &addr(), &config(0)).await;
        assert_eq!(out.attempts, 1);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_most_recent_failure() {
        let probe = ScriptedProbe::new(vec![
            ProbeOutcome::JoinFailed("No such device".into()),
            ProbeOutcome::BindFailed("Address already in use".into()),
            ProbeOutcome::Timeout,
        ]);
        let out = check_with_retry(&probe, &addr(), &config(2)).await;
        assert_eq!(out.status, StreamStatus::Down);
        assert_eq!(out.failure, Some(FailureKind::Timeout));
        assert_eq!(out.reason, "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn join_failure_is_retried() {
        let probe = ScriptedProbe::new(vec![
            ProbeOutcome::JoinFailed("No such device".into()),
            data(),
        ]);
        let out = check_with_retry(&probe, &addr(), &config(2)).await;
        assert_eq!(out.status, StreamStatus::Up);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_address_is_terminal() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::InvalidAddress("bad group".into())]);
        let out = check_with_retry(&probe, &addr(), &config(4)).await;
        assert_eq!(out.status, StreamStatus::Down);
        assert_eq!(out.failure, Some(FailureKind::InvalidAddress));
        assert_eq!(out.attempts, 1);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bound_only_counts_when_data_not_required() {
        let lenient = config(0).with_require_data(false);
        let probe = ScriptedProbe::new(vec![ProbeOutcome::BoundNoData]);
        let out = check_with_retry(&probe, &addr(), &lenient).await;
        assert_eq!(out.status, StreamStatus::Up);

        let strict = config(1).with_require_data(true);
        let probe = ScriptedProbe::new(vec![ProbeOutcome::BoundNoData]);
        let out = check_with_retry(&probe, &addr(), &strict).await;
        assert_eq!(out.status, StreamStatus::Down);
        assert_eq!(out.failure, Some(FailureKind::Timeout));
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_retry_delay_between_attempts() {
        let cfg = CheckConfig::default()
            .with_retry_attempts(2)
            .with_retry_delay(2000);
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Timeout]);

        let started = tokio::time::Instant::now();
        let out = check_with_retry(&probe, &addr(), &cfg).await;
        let elapsed = started.elapsed();

        assert_eq!(out.status, StreamStatus::Down);
        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        // No delay after the final attempt.
        assert!(elapsed < Duration::from_secs(6), "elapsed {:?}", elapsed);
    }
}
