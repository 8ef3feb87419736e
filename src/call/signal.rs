//! Raw call-state signals and the two logical events derived from them.

use serde::{Deserialize, Serialize};

/// Current state of the telephony line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    #[default]
    Idle,
    OffHook,
}

/// A state notification as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSignal {
    OffHook,
    Idle,
    /// Ringing or anything unrecognized; never causes a transition.
    Other(String),
}

impl CallSignal {
    /// Accepts the bare state names (`OFFHOOK`, `IDLE`) as well as the
    /// prefixed platform constants (`EXTRA_STATE_OFFHOOK`), in any case.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let upper = trimmed.to_ascii_uppercase();
        let name = upper.strip_prefix("EXTRA_STATE_").unwrap_or(&upper);
        match name.replace(['-', '_'], "").as_str() {
            "OFFHOOK" => CallSignal::OffHook,
            "IDLE" => CallSignal::Idle,
            _ => CallSignal::Other(trimmed.to_string()),
        }
    }

    pub fn event(&self) -> Option<CallEvent> {
        match self {
            CallSignal::OffHook => Some(CallEvent::CallStarted),
            CallSignal::Idle => Some(CallEvent::CallEnded),
            CallSignal::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    CallStarted,
    CallEnded,
}
