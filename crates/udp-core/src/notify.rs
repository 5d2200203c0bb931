//! Alert delivery.
//!
//! A running [`Monitor`](crate::Monitor) pushes every finished report into an
//! mpsc channel. The [`AlertDispatcher`] drains that channel and, for reports
//! that contain DOWN streams, sends one Telegram message and POSTs a JSON
//! envelope to each configured webhook. Delivery failures are logged and
//! never reach the checker.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checker::CheckReport;

pub const STREAMS_DOWN: &str = "streams_down";
pub const ALL_UP: &str = "all_up";

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP {status} from {target}")]
    Status { target: String, status: u16 },
    #[error("request to {target} failed: {reason}")]
    Transport { target: String, reason: String },
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Telegram bot destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,

    /// Bot API base URL; only overridden in tests.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: default_telegram_api_base(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_retries(),
        }
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

/// Configuration for a single webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// Notification types to deliver. Empty means all.
    #[serde(default = "default_webhook_events")]
    pub events: Vec<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// Optional HMAC-SHA256 signing secret for the `X-UDP-Signature-256` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_telegram_api_base() -> String {
    TELEGRAM_API_BASE.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retries() -> u32 {
    2
}

fn default_webhook_events() -> Vec<String> {
    vec![STREAMS_DOWN.to_string()]
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            events: default_webhook_events(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_retries(),
            secret: None,
        }
    }

    pub fn accepts(&self, notification_type: &str) -> bool {
        if self.events.is_empty() {
            return true;
        }
        self.events.iter().any(|e| e == notification_type)
    }
}

/// Where alerts go.
#[derive(Debug, Clone, Default)]
pub struct AlertTargets {
    pub telegram: Option<TelegramConfig>,
    pub webhooks: Vec<WebhookConfig>,
}

impl AlertTargets {
    pub fn is_empty(&self) -> bool {
        self.telegram.is_none() && self.webhooks.is_empty()
    }
}

/// A message from the scheduler to the dispatcher.
#[derive(Debug, Clone)]
pub enum Notification {
    Report {
        monitor_id: String,
        report: CheckReport,
    },
}

impl Notification {
    pub fn notification_type(&self) -> &str {
        match self {
            Notification::Report { report, .. } if report.all_up() => ALL_UP,
            Notification::Report { .. } => STREAMS_DOWN,
        }
    }
}

/// The JSON envelope POSTed to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub version: u8,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub monitor_id: String,
    pub data: serde_json::Value,
}

impl AlertPayload {
    pub fn from_notification(notification: &Notification) -> Self {
        match notification {
            Notification::Report { monitor_id, report } => {
                let down: Vec<_> = report
                    .down()
                    .map(|v| {
                        serde_json::json!({
                            "name": v.name,
                            "url": v.url,
                            "failure": v.failure,
                            "reason": v.reason,
                            "attempts": v.attempts,
                        })
                    })
                    .collect();
                Self {
                    version: 1,
                    id: Uuid::new_v4().to_string(),
                    timestamp: report.finished_at,
                    notification_type: notification.notification_type().to_string(),
                    monitor_id: monitor_id.clone(),
                    data: serde_json::json!({
                        "report_id": report.id,
                        "up_count": report.up_count(),
                        "down_count": report.down_count(),
                        "down": down,
                    }),
                }
            }
        }
    }
}

/// Human-readable alert listing every DOWN stream, one per line.
pub fn format_alert(report: &CheckReport) -> String {
    let mut message = String::from("🚨 UDP Stream Alert 🚨\nThe following streams are DOWN:\n");
    for v in report.down() {
        message.push_str(&format!("- {} ({}): {}\n", v.name, v.url, v.reason));
    }
    message
}

/// Asynchronous alert dispatcher.
///
/// Spawned as a background tokio task, it reads reports from the
/// notification channel and fans alerts out to every configured target.
pub struct AlertDispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
    targets: AlertTargets,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Notification>,
        targets: AlertTargets,
        client: Client,
    ) -> Self {
        Self {
            rx,
            targets,
            client,
        }
    }

    /// Run the dispatcher loop. Returns when all senders are dropped.
    pub async fn run(mut self) {
        debug!(
            telegram = self.targets.telegram.is_some(),
            webhook_count = self.targets.webhooks.len(),
            "Alert dispatcher started"
        );

        while let Some(notification) = self.rx.recv().await {
            let notification_type = notification.notification_type().to_string();
            let Notification::Report { report, .. } = &notification;

            if notification_type == STREAMS_DOWN {
                if let Some(tg) = &self.targets.telegram {
                    match send_telegram(&self.client, tg, &format_alert(report)).await {
                        Ok(()) => info!(down = report.down_count(), "Telegram alert sent"),
                        Err(e) => warn!(error = %e, "Failed to send Telegram alert"),
                    }
                }
            }

            let payload = AlertPayload::from_notification(&notification);
            for wh in &self.targets.webhooks {
                if !wh.accepts(&notification_type) {
                    continue;
                }
                match send_webhook(&self.client, wh, &payload).await {
                    Ok(()) => debug!(url = %wh.url, notification_type, "Webhook delivered"),
                    Err(e) => warn!(
                        url = %wh.url,
                        notification_type,
                        error = %e,
                        "Webhook delivery failed"
                    ),
                }
            }
        }

        debug!("Alert dispatcher shutting down");
    }
}

pub fn notification_channel() -> (
    mpsc::UnboundedSender<Notification>,
    mpsc::UnboundedReceiver<Notification>,
) {
    mpsc::unbounded_channel()
}

pub fn build_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("udp-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

async fn send_telegram(
    client: &Client,
    config: &TelegramConfig,
    text: &str,
) -> Result<(), DeliveryError> {
    let body = serde_json::to_vec(&serde_json::json!({
        "chat_id": config.chat_id,
        "text": text,
    }))?;
    // The URL embeds the bot token, so errors name the target instead.
    deliver(
        client,
        &config.send_message_url(),
        "telegram",
        &body,
        None,
        Duration::from_millis(config.timeout_ms),
        config.max_retries,
    )
    .await
}

async fn send_webhook(
    client: &Client,
    config: &WebhookConfig,
    payload: &AlertPayload,
) -> Result<(), DeliveryError> {
    let body = serde_json::to_vec(payload)?;
    deliver(
        client,
        &config.url,
        &config.url,
        &body,
        config.secret.as_deref(),
        Duration::from_millis(config.timeout_ms),
        config.max_retries,
    )
    .await
}

async fn deliver(
    client: &Client,
    url: &str,
    target: &str,
    body: &[u8],
    secret: Option<&str>,
    timeout: Duration,
    max_retries: u32,
) -> Result<(), DeliveryError> {
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
            tokio::time::sleep(backoff).await;
        }

        let mut req = client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .body(body.to_vec());

        if let Some(secret) = secret {
            let signature = sign_payload(body, secret);
            req = req.header("X-UDP-Signature-256", format!("sha256={}", signature));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let err = DeliveryError::Status {
                    target: target.to_string(),
                    status,
                };
                if (400..500).contains(&status) && status != 429 {
                    return Err(err);
                }
                last_error = Some(err);
            }
            Err(e) => {
                last_error = Some(DeliveryError::Transport {
                    target: target.to_string(),
                    reason: e.without_url().to_string(),
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DeliveryError::Transport {
        target: target.to_string(),
        reason: "no attempt made".to_string(),
    }))
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{FailureKind, StreamStatus, StreamVerdict};
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verdict(name: &str, url: &str, status: StreamStatus, reason: &str) -> StreamVerdict {
        StreamVerdict {
            name: name.into(),
            url: url.into(),
            status,
            failure: (status == StreamStatus::Down).then_some(FailureKind::Timeout),
            reason: reason.into(),
            attempts: 3,
            checked_at: Utc::now(),
        }
    }

    fn mixed_report() -> CheckReport {
        CheckReport::new(
            Utc::now(),
            vec![
                verdict("news", "udp://239.1.1.1:1234", StreamStatus::Up, "received 1316 bytes"),
                verdict("sport", "udp://239.1.1.2:1234", StreamStatus::Down, "timeout"),
            ],
        )
    }

    fn healthy_report() -> CheckReport {
        CheckReport::new(
            Utc::now(),
            vec![verdict("news", "udp://239.1.1.1:1234", StreamStatus::Up, "ok")],
        )
    }

    fn report_notification(report: CheckReport) -> Notification {
        Notification::Report {
            monitor_id: "m1".into(),
            report,
        }
    }

    #[test]
    fn webhook_defaults_to_down_alerts_only() {
        let wh: WebhookConfig =
            serde_json::from_value(serde_json::json!({ "url": "https://example.com" })).unwrap();
        assert!(wh.accepts(STREAMS_DOWN));
        assert!(!wh.accepts(ALL_UP));
        assert_eq!(wh.max_retries, 2);
    }

    #[test]
    fn webhook_with_empty_filter_accepts_all() {
        let mut wh = WebhookConfig::new("https://example.com");
        wh.events.clear();
        assert!(wh.accepts(STREAMS_DOWN));
        assert!(wh.accepts(ALL_UP));
    }

    #[test]
    fn notification_type_follows_report() {
        assert_eq!(report_notification(mixed_report()).notification_type(), STREAMS_DOWN);
        assert_eq!(report_notification(healthy_report()).notification_type(), ALL_UP);
    }

    #[test]
    fn alert_lists_only_down_streams() {
        let text = format_alert(&mixed_report());
        assert!(text.contains("The following streams are DOWN"));
        assert!(text.contains("- sport (udp://239.1.1.2:1234): timeout"));
        assert!(!text.contains("news"));
    }

    #[test]
    fn payload_from_report() {
        let payload = AlertPayload::from_notification(&report_notification(mixed_report()));
        assert_eq!(payload.version, 1);
        assert_eq!(payload.notification_type, STREAMS_DOWN);
        assert_eq!(payload.monitor_id, "m1");
        assert_eq!(payload.data["up_count"], 1);
        assert_eq!(payload.data["down_count"], 1);
        assert_eq!(payload.data["down"][0]["name"], "sport");
        assert_eq!(payload.data["down"][0]["failure"], "timeout");
    }

    #[test]
    fn telegram_url_uses_api_base() {
        let mut tg = TelegramConfig::new("123:abc", "-100");
        assert_eq!(
            tg.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
        tg.api_base = "http://127.0.0.1:9999/".into();
        assert_eq!(tg.send_message_url(), "http://127.0.0.1:9999/bot123:abc/sendMessage");
    }

    #[test]
    fn hmac_signature_is_deterministic() {
        let body = b"test payload";
        let sig1 = sign_payload(body, "my-secret");
        assert_eq!(sig1, sign_payload(body, "my-secret"));
        assert_ne!(sig1, sign_payload(body, "other-secret"));
        assert_eq!(sig1.len(), 64);
    }

    async fn dispatch(targets: AlertTargets, notifications: Vec<Notification>) {
        let (tx, rx) = notification_channel();
        let dispatcher = AlertDispatcher::new(rx, targets, Client::new());
        for n in notifications {
            tx.send(n).unwrap();
        }
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), dispatcher.run())
            .await
            .expect("Dispatcher should exit after sender is dropped");
    }

    #[tokio::test]
    async fn sends_telegram_message_for_down_streams() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": "-100" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut tg = TelegramConfig::new("123:abc", "-100");
        tg.api_base = server.uri();
        let targets = AlertTargets {
            telegram: Some(tg),
            webhooks: vec![],
        };

        dispatch(
            targets,
            vec![
                report_notification(mixed_report()),
                report_notification(healthy_report()),
            ],
        )
        .await;
    }

    #[tokio::test]
    async fn signs_webhook_when_secret_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists("X-UDP-Signature-256"))
            .and(body_partial_json(serde_json::json!({ "type": "streams_down" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut wh = WebhookConfig::new(format!("{}/hook", server.uri()));
        wh.secret = Some("k".into());
        let targets = AlertTargets {
            telegram: None,
            webhooks: vec![wh],
        };

        dispatch(targets, vec![report_notification(mixed_report())]).await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/hook", server.uri());
        let err = deliver(&client, &url, &url, b"{}", None, Duration::from_secs(2), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/hook", server.uri());
        deliver(&client, &url, &url, b"{}", None, Duration::from_secs(2), 2)
            .await
            .unwrap();
    }
}
