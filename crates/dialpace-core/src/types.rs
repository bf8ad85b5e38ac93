//! Core type definitions for dialpace

use serde::{Deserialize, Serialize};

/// Placeholder destination for calls first seen through a webhook without a `to` field
pub const UNKNOWN_DESTINATION: &str = "unknown";

/// Call lifecycle status
///
/// `initiated -> progress -> connected -> {disconnected | failed | busy | no_answer}`.
/// Steps may be skipped; the tracker never rejects a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Initiated,
    Progress,
    Connected,
    Disconnected,
    Failed,
    Busy,
    NoAnswer,
}

impl CallStatus {
    /// Whether this status ends the call
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Failed | Self::Busy | Self::NoAnswer
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Progress => "progress",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Busy => "busy",
            Self::NoAnswer => "no_answer",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initiated" => Ok(Self::Initiated),
            "progress" => Ok(Self::Progress),
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "failed" => Ok(Self::Failed),
            "busy" => Ok(Self::Busy),
            "no_answer" | "noanswer" | "no-answer" => Ok(Self::NoAnswer),
            _ => Err(format!("Invalid call status: {}", s)),
        }
    }
}

/// The subset of statuses a call can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Disconnected,
    Failed,
    Busy,
    NoAnswer,
}

impl From<TerminalStatus> for CallStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Disconnected => CallStatus::Disconnected,
            TerminalStatus::Failed => CallStatus::Failed,
            TerminalStatus::Busy => CallStatus::Busy,
            TerminalStatus::NoAnswer => CallStatus::NoAnswer,
        }
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        CallStatus::from(*self).fmt(f)
    }
}
