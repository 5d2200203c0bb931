use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::state::{MonitorError, MonitorState};
use crate::checker::{run_check_cycle, CheckReport, StreamConfig};
use crate::config::CheckConfig;
use crate::notify::Notification;
use crate::probe::StreamProbe;

/// Everything a cycle touches, shared between the handle and the scheduler task.
struct Shared {
    config: CheckConfig,
    streams: Vec<StreamConfig>,
    probe: Arc<dyn StreamProbe>,
    latest_report: RwLock<Option<CheckReport>>,
    last_checked: RwLock<Option<DateTime<Utc>>>,
    cycle_count: RwLock<u64>,
    down_totals: RwLock<HashMap<String, u64>>,
    notification_tx: Option<UnboundedSender<Notification>>,
    /// Held for a whole cycle; probes of two cycles would share ports.
    cycle_lock: Mutex<()>,
}

impl Shared {
    async fn run_cycle(&self, monitor_id: &str) -> CheckReport {
        let _cycle = self.cycle_lock.lock().await;
        *self.last_checked.write().await = Some(Utc::now());

        let report = run_check_cycle(self.probe.as_ref(), &self.streams, &self.config).await;

        {
            let mut totals = self.down_totals.write().await;
            for v in report.down() {
                *totals.entry(v.name.clone()).or_insert(0) += 1;
            }
        }
        *self.cycle_count.write().await += 1;
        *self.latest_report.write().await = Some(report.clone());

        if let Some(tx) = &self.notification_tx {
            let _ = tx.send(Notification::Report {
                monitor_id: monitor_id.to_string(),
                report: report.clone(),
            });
        }

        report
    }
}

/// Runs check cycles over a fixed stream list on a fixed interval.
///
/// The stream list and config are immutable for the monitor's lifetime; the
/// only state carried between cycles is the latest report and counters.
pub struct Monitor {
    id: Uuid,
    monitor_id: String,
    created_at: DateTime<Utc>,
    state: Arc<RwLock<MonitorState>>,
    stop_signal: Arc<Notify>,
    shared: Arc<Shared>,
}

impl Monitor {
    pub fn new(
        streams: Vec<StreamConfig>,
        config: CheckConfig,
        probe: Arc<dyn StreamProbe>,
        notification_tx: Option<UnboundedSender<Notification>>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            monitor_id: id.to_string(),
            id,
            created_at: Utc::now(),
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            stop_signal: Arc::new(Notify::new()),
            shared: Arc::new(Shared {
                config,
                streams,
                probe,
                latest_report: RwLock::new(None),
                last_checked: RwLock::new(None),
                cycle_count: RwLock::new(0),
                down_totals: RwLock::new(HashMap::new()),
                notification_tx,
                cycle_lock: Mutex::new(()),
            }),
        }
    }

    pub fn with_monitor_id(mut self, monitor_id: impl Into<String>) -> Self {
        self.monitor_id = monitor_id.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &CheckConfig {
        &self.shared.config
    }

    pub fn streams(&self) -> &[StreamConfig] {
        &self.shared.streams
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    pub async fn latest_report(&self) -> Option<CheckReport> {
        self.shared.latest_report.read().await.clone()
    }

    pub async fn last_checked(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_checked.read().await
    }

    pub async fn cycle_count(&self) -> u64 {
        *self.shared.cycle_count.read().await
    }

    /// Number of DOWN verdicts per stream name since the monitor was created.
    pub async fn down_totals(&self) -> HashMap<String, u64> {
        self.shared.down_totals.read().await.clone()
    }

    /// Runs one cycle on the caller's task, independent of the schedule.
    ///
    /// Waits for a scheduled cycle in progress to finish first.
    pub async fn run_once(&self) -> CheckReport {
        self.shared.run_cycle(&self.monitor_id).await
    }

    pub async fn start(&self) -> Result<(), MonitorError> {
        if self.shared.streams.is_empty() {
            return Err(MonitorError::NoStreams);
        }

        {
            let mut state = self.state.write().await;
            if *state == MonitorState::Active {
                return Ok(());
            }
            if !state.can_transition_to(MonitorState::Active) {
                return Err(MonitorError::InvalidTransition(*state));
            }
            *state = MonitorState::Active;
        }

        info!(
            monitor_id = %self.monitor_id,
            streams = self.shared.streams.len(),
            interval_ms = self.shared.config.check_interval.as_millis() as u64,
            "Starting monitor"
        );

        let state = Arc::clone(&self.state);
        let stop_signal = Arc::clone(&self.stop_signal);
        let shared = Arc::clone(&self.shared);
        let monitor_id = self.monitor_id.clone();

        tokio::spawn(async move {
            loop {
                {
                    let current_state = *state.read().await;
                    if current_state != MonitorState::Active {
                        *state.write().await = MonitorState::Stopped;
                        info!(monitor_id = %monitor_id, "Monitor stopped");
                        break;
                    }
                }

                shared.run_cycle(&monitor_id).await;

                debug!(
                    monitor_id = %monitor_id,
                    interval_ms = shared.config.check_interval.as_millis() as u64,
                    "Waiting for next cycle"
                );
                tokio::select! {
                    _ = tokio::time::sleep(shared.config.check_interval) => {}
                    _ = stop_signal.notified() => {}
                }
            }
        });

        Ok(())
    }

    /// Requests a stop. The running cycle finishes first; no further cycle starts.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if state.can_transition_to(MonitorState::Stopping) {
            *state = MonitorState::Stopping;
            self.stop_signal.notify_one();
            info!(monitor_id = %self.monitor_id, "Stopping monitor");
        }
    }
}
