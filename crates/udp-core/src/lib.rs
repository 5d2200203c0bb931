#![forbid(unsafe_code)]

pub mod address;
pub mod checker;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod probe;

pub use address::{AddressError, StreamAddress};
pub use checker::{
    check_all, check_stream, check_with_retry, run_check_cycle, CheckReport, FailureKind,
    RetryOutcome, StreamConfig, StreamStatus, StreamVerdict,
};
pub use config::CheckConfig;
pub use monitor::{Monitor, MonitorError, MonitorState};
pub use notify::{
    build_client, format_alert, notification_channel, AlertDispatcher, AlertPayload,
    AlertTargets, DeliveryError, Notification, TelegramConfig, WebhookConfig,
};
pub use probe::{ProbeOutcome, StreamProbe, UdpProbe};
