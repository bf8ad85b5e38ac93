//! Provider webhook events
//!
//! Raw payloads arrive as loosely typed JSON. They are validated once, here, into
//! a [`CallEvent`] whose [`EventKind`] is a closed set plus an `Unrecognized`
//! catch-all, so nothing downstream inspects event strings.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DialpaceError, Result, TerminalStatus};

/// Webhook body as posted by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub vox_call_id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Recognized lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `progress` / `ringing`
    Progress,
    /// `connected` / `answer`
    Connected,
    /// Any terminal event, already mapped to its final status
    Ended(TerminalStatus),
    /// Accepted and logged, but never moves the tracker
    Unrecognized(String),
}

impl EventKind {
    /// Map a provider event name (case-insensitive) to a kind
    pub fn from_event_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "progress" | "ringing" => Self::Progress,
            "connected" | "answer" => Self::Connected,
            "busy" => Self::Ended(TerminalStatus::Busy),
            "no_answer" => Self::Ended(TerminalStatus::NoAnswer),
            "failed" => Self::Ended(TerminalStatus::Failed),
            "disconnected" | "hangup" => Self::Ended(TerminalStatus::Disconnected),
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// A validated webhook event
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub call_id: String,
    pub to: Option<String>,
    pub provider_call_id: Option<String>,
    pub kind: EventKind,
    pub ts: DateTime<Utc>,
    pub details: Option<serde_json::Value>,
}

impl TryFrom<WebhookPayload> for CallEvent {
    type Error = DialpaceError;

    fn try_from(payload: WebhookPayload) -> Result<Self> {
        let call_id = required(payload.call_id, "call_id")?;
        let event = required(payload.event, "event")?;
        let ts_raw = required(payload.ts, "ts")?;

        let ts = parse_timestamp(&ts_raw)?;

        Ok(Self {
            call_id,
            to: non_empty(payload.to),
            provider_call_id: non_empty(payload.vox_call_id),
            kind: EventKind::from_event_name(&event),
            ts,
            details: payload.details,
        })
    }
}

/// ISO-8601 date-time: RFC 3339, a basic `+hhmm` offset, or no offset (UTC)
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| DialpaceError::InvalidEvent(format!("bad ts '{}': {}", raw, e)))
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| DialpaceError::InvalidEvent(format!("missing {}", field)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(event: &str) -> WebhookPayload {
        WebhookPayload {
            call_id: Some("c-1".to_string()),
            event: Some(event.to_string()),
            ts: Some("2024-03-01T10:00:00.250Z".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_event_names_are_case_insensitive() {
        assert_eq!(EventKind::from_event_name("RINGING"), EventKind::Progress);
        assert_eq!(EventKind::from_event_name("Answer"), EventKind::Connected);
        assert_eq!(
            EventKind::from_event_name("BUSY"),
            EventKind::Ended(TerminalStatus::Busy)
        );
        assert_eq!(
            EventKind::from_event_name("No_Answer"),
            EventKind::Ended(TerminalStatus::NoAnswer)
        );
        assert_eq!(
            EventKind::from_event_name("hangup"),
            EventKind::Ended(TerminalStatus::Disconnected)
        );
        assert_eq!(
            EventKind::from_event_name("recording_ready"),
            EventKind::Unrecognized("recording_ready".to_string())
        );
    }

    #[test]
    fn test_valid_payload() {
        let mut raw = payload("failed");
        raw.vox_call_id = Some("  ".to_string());
        raw.to = Some("+15550001".to_string());

        let event = CallEvent::try_from(raw).unwrap();
        assert_eq!(event.call_id, "c-1");
        assert_eq!(event.kind, EventKind::Ended(TerminalStatus::Failed));
        assert_eq!(event.provider_call_id, None);
        assert_eq!(event.to.as_deref(), Some("+15550001"));
        assert_eq!(event.ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_missing_required_fields() {
        let mut raw = payload("progress");
        raw.call_id = None;
        assert!(matches!(
            CallEvent::try_from(raw),
            Err(DialpaceError::InvalidEvent(_))
        ));

        let mut raw = payload("progress");
        raw.event = Some(String::new());
        assert!(CallEvent::try_from(raw).is_err());

        let mut raw = payload("progress");
        raw.ts = None;
        assert!(CallEvent::try_from(raw).is_err());
    }

    #[test]
    fn test_iso8601_timestamp_forms() {
        let expected = "2024-05-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        for ts in [
            "2024-05-01T12:00:00",
            "2024-05-01T12:00:00+0000",
            "2024-05-01T14:00:00+0200",
            "2024-05-01T12:00:00+00:00",
        ] {
            let mut raw = payload("progress");
            raw.ts = Some(ts.to_string());
            assert_eq!(CallEvent::try_from(raw).unwrap().ts, expected, "{}", ts);
        }

        let mut raw = payload("progress");
        raw.ts = Some("2024-05-01T12:00:00.123".to_string());
        let event = CallEvent::try_from(raw).unwrap();
        assert_eq!(event.ts.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_unparsable_timestamp() {
        let mut raw = payload("progress");
        raw.ts = Some("yesterday".to_string());
        assert!(matches!(
            CallEvent::try_from(raw),
            Err(DialpaceError::InvalidEvent(_))
        ));
    }
}
