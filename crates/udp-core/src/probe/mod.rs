mod udp;

pub use udp::UdpProbe;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::address::StreamAddress;
use crate::checker::FailureKind;

/// Result of one probe attempt. Produced fresh per attempt and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    DataReceived { bytes: usize, from: SocketAddr },
    BoundNoData,
    BindFailed(String),
    JoinFailed(String),
    InvalidAddress(String),
    Timeout,
}

impl ProbeOutcome {
    /// Whether this outcome proves liveness under the given strictness.
    pub fn is_alive(&self, require_data: bool) -> bool {
        match self {
            Self::DataReceived { .. } => true,
            Self::BoundNoData => !require_data,
            _ => false,
        }
    }

    /// Failure category, `None` for the two success outcomes.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::DataReceived { .. } | Self::BoundNoData => None,
            Self::BindFailed(_) => Some(FailureKind::BindFailed),
            Self::JoinFailed(_) => Some(FailureKind::JoinFailed),
            Self::InvalidAddress(_) => Some(FailureKind::InvalidAddress),
            Self::Timeout => Some(FailureKind::Timeout),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::InvalidAddress(_))
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataReceived { bytes, from } => {
                write!(f, "received {} bytes from {}", bytes, from)
            }
            Self::BoundNoData => write!(f, "bound without data"),
            Self::BindFailed(reason) => write!(f, "bind failed: {}", reason),
            Self::JoinFailed(reason) => write!(f, "multicast join failed: {}", reason),
            Self::InvalidAddress(reason) => write!(f, "invalid address: {}", reason),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Trait for a single bounded liveness attempt against a stream endpoint.
///
/// Implementations own whatever resources the attempt needs and release
/// them before returning. Object-safe and Send + Sync so one probe can be
/// shared across concurrent stream checks.
#[async_trait]
pub trait StreamProbe: Send + Sync {
    async fn probe(
        &self,
        address: &StreamAddress,
        timeout: Duration,
        require_data: bool,
    ) -> ProbeOutcome;
}
