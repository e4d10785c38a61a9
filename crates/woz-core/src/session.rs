use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::{LogRowId, MessageId, SessionId};

/// Current wall-clock time as milliseconds since the Unix epoch.
/// All transcript and session timestamps are server-assigned from this.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Who authored a transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Participant,
    Wizard,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Participant => write!(f, "participant"),
            Self::Wizard => write!(f, "wizard"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "participant" => Ok(Self::Participant),
            "wizard" => Ok(Self::Wizard),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One transcript entry. Field names are camelCase on the wire to match
/// the browser clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    /// Server-assigned, ms epoch.
    pub timestamp: i64,
    pub role: Role,
    /// Trimmed text; may be empty when an image was attached instead.
    pub message: String,
    /// Wizard messages only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Wizard messages only; mirrors the linked log row's notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Inline attachment, e.g. "data:image/png;base64,....".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data_url: Option<String>,
    /// Original filename of the attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

/// One research-log entry, created per wizard message. `wizard_message_id`
/// is a lookup key into the transcript, not an owning reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRow {
    pub id: LogRowId,
    /// Copy of the wizard message's timestamp (ms epoch).
    pub timestamp: i64,
    /// Text of the nearest preceding participant message, or empty.
    pub user_message: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    pub tone: String,
    pub notes: String,
    pub wizard_message_id: MessageId,
}

/// One scenario's isolated conversation + log state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub transcript: Vec<Message>,
    pub log: Vec<LogRow>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    pub fn new(session_id: SessionId) -> Self {
        let now = now_ms();
        Self {
            session_id,
            transcript: Vec::new(),
            log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh `updated_at` without other side effects.
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Discard transcript and log wholesale, keeping the id.
    pub fn reset(&mut self) {
        let now = now_ms();
        self.transcript.clear();
        self.log.clear();
        self.created_at = now;
        self.updated_at = now;
    }

    /// Text of the most recent participant message, scanning the
    /// transcript in reverse. Empty string when none exists yet.
    pub fn last_participant_text(&self) -> &str {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Participant)
            .map(|m| m.message.as_str())
            .unwrap_or("")
    }

    pub fn log_row_mut(&mut self, id: &LogRowId) -> Option<&mut LogRow> {
        self.log.iter_mut().find(|r| &r.id == id)
    }

    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.transcript.iter_mut().find(|m| &m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant_msg(text: &str) -> Message {
        Message {
            id: MessageId::new(),
            timestamp: now_ms(),
            role: Role::Participant,
            message: text.to_string(),
            tone: None,
            notes: None,
            image_data_url: None,
            image_name: None,
        }
    }

    #[test]
    fn role_parse_and_display() {
        assert_eq!("participant".parse::<Role>().unwrap(), Role::Participant);
        assert_eq!("wizard".parse::<Role>().unwrap(), Role::Wizard);
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(Role::Wizard.to_string(), "wizard");
    }

    #[test]
    fn role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Participant).unwrap(), "\"participant\"");
        let r: Role = serde_json::from_str("\"wizard\"").unwrap();
        assert_eq!(r, Role::Wizard);
    }

    #[test]
    fn message_wire_fields_are_camel_case() {
        let msg = Message {
            id: MessageId::from_raw("m_1"),
            timestamp: 1_700_000_000_000,
            role: Role::Wizard,
            message: "hello".into(),
            tone: Some("Supportive".into()),
            notes: Some(String::new()),
            image_data_url: Some("data:image/png;base64,AAAA".into()),
            image_name: Some("pic.png".into()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["imageDataUrl"], "data:image/png;base64,AAAA");
        assert_eq!(json["imageName"], "pic.png");
        assert_eq!(json["tone"], "Supportive");
    }

    #[test]
    fn message_optional_fields_omitted_when_absent() {
        let msg = participant_msg("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tone").is_none());
        assert!(json.get("notes").is_none());
        assert!(json.get("imageDataUrl").is_none());
    }

    #[test]
    fn log_row_wire_shape() {
        let row = LogRow {
            id: LogRowId::from_raw("l_1"),
            timestamp: 42,
            user_message: "Hi".into(),
            response: "Sure".into(),
            image_name: None,
            tone: "Engaging".into(),
            notes: String::new(),
            wizard_message_id: MessageId::from_raw("m_9"),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["userMessage"], "Hi");
        assert_eq!(json["wizardMessageId"], "m_9");
        assert_eq!(json["notes"], "");
    }

    #[test]
    fn new_session_is_empty_with_matching_stamps() {
        let s = Session::new(SessionId::from_raw("s_1"));
        assert!(s.transcript.is_empty());
        assert!(s.log.is_empty());
        assert_eq!(s.created_at, s.updated_at);
    }

    #[test]
    fn reset_clears_and_restamps() {
        let mut s = Session::new(SessionId::from_raw("s_1"));
        s.transcript.push(participant_msg("hi"));
        s.created_at = 1;
        s.updated_at = 1;

        s.reset();

        assert!(s.transcript.is_empty());
        assert!(s.log.is_empty());
        assert!(s.created_at > 1);
        assert_eq!(s.session_id.as_str(), "s_1");
    }

    #[test]
    fn last_participant_text_scans_in_reverse() {
        let mut s = Session::new(SessionId::new());
        assert_eq!(s.last_participant_text(), "");

        s.transcript.push(participant_msg("first"));
        s.transcript.push(Message {
            role: Role::Wizard,
            tone: Some("Supportive".into()),
            notes: Some(String::new()),
            ..participant_msg("reply")
        });
        s.transcript.push(participant_msg("second"));

        assert_eq!(s.last_participant_text(), "second");
    }

    #[test]
    fn lookup_helpers_find_by_id() {
        let mut s = Session::new(SessionId::new());
        let msg = participant_msg("hi");
        let msg_id = msg.id.clone();
        s.transcript.push(msg);

        assert!(s.message_mut(&msg_id).is_some());
        assert!(s.message_mut(&MessageId::from_raw("m_missing")).is_none());
        assert!(s.log_row_mut(&LogRowId::from_raw("l_missing")).is_none());
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut s = Session::new(SessionId::from_raw("s_rt"));
        s.transcript.push(participant_msg("hello"));
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"sessionId\":\"s_rt\""));
        assert!(json.contains("\"createdAt\""));

        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.transcript.len(), 1);
        assert_eq!(parsed.transcript[0].message, "hello");
    }
}
