//! Server→client event envelope: `{ type, sessionId, data }`.

use serde::Serialize;

use woz_core::ids::SessionId;
use woz_core::session::{LogRow, Message, Session};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub session_id: String,
    pub data: serde_json::Value,
}

impl ServerEvent {
    /// Full session snapshot, sent on join and after a reset.
    pub fn state(session: &Session) -> Self {
        Self {
            event_type: "state",
            session_id: session.session_id.to_string(),
            data: serde_json::to_value(session).unwrap_or(serde_json::Value::Null),
        }
    }

    /// A single newly accepted transcript message.
    pub fn message(session_id: &SessionId, message: &Message) -> Self {
        Self {
            event_type: "message",
            session_id: session_id.to_string(),
            data: serde_json::to_value(message).unwrap_or(serde_json::Value::Null),
        }
    }

    /// The full current log sequence.
    pub fn log_update(session_id: &SessionId, log: &[LogRow]) -> Self {
        Self {
            event_type: "log_update",
            session_id: session_id.to_string(),
            data: serde_json::to_value(log).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Partial session patch carrying the updated transcript.
    pub fn state_patch_transcript(session_id: &SessionId, transcript: &[Message]) -> Self {
        Self {
            event_type: "state_patch",
            session_id: session_id.to_string(),
            data: serde_json::json!({ "transcript": transcript }),
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use woz_core::ids::MessageId;
    use woz_core::session::{now_ms, Role};

    fn sample_message() -> Message {
        Message {
            id: MessageId::from_raw("m_1"),
            timestamp: now_ms(),
            role: Role::Participant,
            message: "hi".into(),
            tone: None,
            notes: None,
            image_data_url: None,
            image_name: None,
        }
    }

    #[test]
    fn state_event_wraps_full_session() {
        let session = Session::new(SessionId::from_raw("s_1"));
        let json = ServerEvent::state(&session).to_json().unwrap();
        assert!(json.contains("\"type\":\"state\""));
        assert!(json.contains("\"sessionId\":\"s_1\""));
        assert!(json.contains("\"transcript\":[]"));
        assert!(json.contains("\"log\":[]"));
    }

    #[test]
    fn message_event_carries_one_message() {
        let sid = SessionId::from_raw("s_1");
        let json = ServerEvent::message(&sid, &sample_message()).to_json().unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"role\":\"participant\""));
    }

    #[test]
    fn log_update_event_is_an_array() {
        let sid = SessionId::from_raw("s_1");
        let event = ServerEvent::log_update(&sid, &[]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "log_update");
        assert!(value["data"].is_array());
    }

    #[test]
    fn state_patch_carries_transcript_only() {
        let sid = SessionId::from_raw("s_1");
        let event = ServerEvent::state_patch_transcript(&sid, &[sample_message()]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "state_patch");
        assert_eq!(value["data"]["transcript"][0]["message"], "hi");
        assert!(value["data"].get("log").is_none());
    }
}
