use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One configured stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub url: String,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Up,
    Down,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Why a stream was declared down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidAddress,
    JoinFailed,
    BindFailed,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress => write!(f, "Invalid Address"),
            Self::JoinFailed => write!(f, "Join Failed"),
            Self::BindFailed => write!(f, "Bind Failed"),
            Self::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Final result for one stream after its retry loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamVerdict {
    pub name: String,
    pub url: String,
    pub status: StreamStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub reason: String,
    pub attempts: u32,
    pub checked_at: DateTime<Utc>,
}

impl StreamVerdict {
    pub fn is_up(&self) -> bool {
        self.status == StreamStatus::Up
    }
}

/// Ordered verdicts of one check cycle, one per input stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub verdicts: Vec<StreamVerdict>,
}

impl CheckReport {
    pub fn new(started_at: DateTime<Utc>, verdicts: Vec<StreamVerdict>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            verdicts,
        }
    }

    pub fn down(&self) -> impl Iterator<Item = &StreamVerdict> {
        self.verdicts.iter().filter(|v| !v.is_up())
    }

    pub fn up_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_up()).count()
    }

    pub fn down_count(&self) -> usize {
        self.verdicts.len() - self.up_count()
    }

    pub fn all_up(&self) -> bool {
        self.down_count() == 0
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}
