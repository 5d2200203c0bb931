use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::retry::check_with_retry;
use super::verdict::{CheckReport, FailureKind, StreamConfig, StreamStatus, StreamVerdict};
use crate::address::StreamAddress;
use crate::config::CheckConfig;
use crate::probe::StreamProbe;

/// Parses and checks a single stream. An unparseable URL never reaches the probe.
pub async fn check_stream(
    probe: &dyn StreamProbe,
    stream: &StreamConfig,
    config: &CheckConfig,
) -> StreamVerdict {
    let address = match StreamAddress::parse(&stream.url) {
        Ok(a) => a,
        Err(e) => {
            warn!(name = %stream.name, url = %stream.url, error = %e, "Invalid stream URL");
            return StreamVerdict {
                name: stream.name.clone(),
                url: stream.url.clone(),
                status: StreamStatus::Down,
                failure: Some(FailureKind::InvalidAddress),
                reason: format!("invalid address: {}", e),
                attempts: 0,
                checked_at: Utc::now(),
            };
        }
    };

    let outcome = check_with_retry(probe, &address, config).await;
    StreamVerdict {
        name: stream.name.clone(),
        url: stream.url.clone(),
        status: outcome.status,
        failure: outcome.failure,
        reason: outcome.reason,
        attempts: outcome.attempts,
        checked_at: Utc::now(),
    }
}

/// Checks every stream with at most `max_concurrent_checks` in flight.
///
/// Returns once all streams have a verdict; verdicts keep input order.
pub async fn check_all(
    probe: &dyn StreamProbe,
    streams: &[StreamConfig],
    config: &CheckConfig,
) -> CheckReport {
    let started_at = Utc::now();
    let concurrency = config.max_concurrent_checks.max(1);

    let checks: Vec<BoxFuture<'_, StreamVerdict>> = streams
        .iter()
        .map(|s| check_stream(probe, s, config).boxed())
        .collect();
    let verdicts: Vec<StreamVerdict> = stream::iter(checks)
        .buffered(concurrency)
        .collect()
        .await;

    CheckReport::new(started_at, verdicts)
}

/// One full check cycle: the entry point a scheduler calls on its timer.
pub async fn run_check_cycle(
    probe: &dyn StreamProbe,
    streams: &[StreamConfig],
    config: &CheckConfig,
) -> CheckReport {
    info!(stream_count = streams.len(), "Starting check cycle");

    let report = check_all(probe, streams, config).await;

    for v in report.down() {
        warn!(name = %v.name, url = %v.url, reason = %v.reason, "Stream is DOWN");
    }
    info!(
        up = report.up_count(),
        down = report.down_count(),
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Check cycle complete"
    );

    report
}
