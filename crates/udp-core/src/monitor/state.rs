use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a scheduled monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Active,
    Stopping,
    Stopped,
}

impl MonitorState {
    pub fn can_transition_to(self, target: MonitorState) -> bool {
        use MonitorState::*;
        matches!(
            (self, target),
            (Idle, Active) | (Active, Stopping) | (Stopping, Stopped) | (Stopped, Active)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    pub const ALL: [MonitorState; 4] = [Self::Idle, Self::Active, Self::Stopping, Self::Stopped];
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor has no streams to check")]
    NoStreams,
    #[error("cannot start monitor while it is {0}")]
    InvalidTransition(MonitorState),
}
