//! Protocol state machine mediating all real-time interaction.
//!
//! Every frame from every connection is dispatched here, one at a time,
//! by the server's single frame-processing loop; per-session locks in the
//! store additionally serialize against concurrent HTTP mutations. Each
//! operation returns a typed `Result` whether or not the transport
//! surfaces it — only `send_message` frames carrying an id are acked,
//! the rest fail silently by design.

use std::sync::Arc;

use woz_core::errors::RelayError;
use woz_core::ids::{LogRowId, MessageId, SessionId};
use woz_core::session::{now_ms, LogRow, Message, Role};
use woz_store::SessionStore;

use crate::client::{ClientId, ClientRegistry};
use crate::rpc::{non_empty_str, optional_str, Ack, ClientFrame};
use crate::wire::ServerEvent;

/// Shared state available to all protocol handlers.
pub struct RouterState {
    pub store: Arc<SessionStore>,
    pub registry: Arc<ClientRegistry>,
}

impl RouterState {
    pub fn new(store: Arc<SessionStore>, registry: Arc<ClientRegistry>) -> Self {
        Self { store, registry }
    }
}

/// Dispatch a protocol frame. Returns the ack to send back, if any.
pub fn dispatch(state: &RouterState, client_id: &ClientId, frame: ClientFrame) -> Option<Ack> {
    match frame.method.as_str() {
        "join" => {
            if let Err(e) = join(state, client_id, &frame.params) {
                tracing::debug!(client_id = %client_id, kind = e.error_kind(), "join skipped");
            }
            None
        }
        "send_message" => {
            let result = send_message(state, &frame.params);
            match (frame.id, result) {
                (Some(id), Ok(())) => Some(Ack::ok(id)),
                (Some(id), Err(e)) => Some(Ack::err(id, e.to_string())),
                (None, Err(e)) => {
                    tracing::debug!(client_id = %client_id, kind = e.error_kind(), "send_message dropped");
                    None
                }
                (None, Ok(())) => None,
            }
        }
        "update_log_row" => {
            if let Err(e) = update_log_row(state, &frame.params) {
                tracing::debug!(client_id = %client_id, kind = e.error_kind(), "update_log_row skipped");
            }
            None
        }
        "reset_session" => {
            if let Err(e) = reset_session(state, &frame.params) {
                tracing::debug!(client_id = %client_id, kind = e.error_kind(), "reset_session skipped");
            }
            None
        }
        other => {
            tracing::debug!(client_id = %client_id, method = other, "unknown method");
            None
        }
    }
}

fn broadcast(state: &RouterState, session_id: &SessionId, event: ServerEvent) {
    if let Some(json) = event.to_json() {
        state.registry.broadcast_to_session(session_id, &json);
    }
}

/// Bind the connection to a session's broadcast group and send it the
/// full current state. The claimed role is not validated here.
fn join(
    state: &RouterState,
    client_id: &ClientId,
    params: &serde_json::Value,
) -> Result<(), RelayError> {
    let Some(session_id) = non_empty_str(params, "sessionId") else {
        return Err(RelayError::missing("sessionId"));
    };
    let session_id = SessionId::from_raw(session_id);
    let role = optional_str(params, "role").map(str::to_string);

    state
        .registry
        .join(client_id, session_id.clone(), role.clone());

    let snapshot = state.store.get_or_create(&session_id);
    if let Some(json) = ServerEvent::state(&snapshot).to_json() {
        state.registry.send_to(client_id, json);
    }
    state.store.touch(&session_id);

    tracing::info!(
        client_id = %client_id,
        session_id = %session_id,
        role = role.as_deref().unwrap_or("unknown"),
        "client joined"
    );
    Ok(())
}

/// Validate and append a message; wizard messages additionally synthesize
/// a linked log row. Broadcasts `message` then `log_update`.
fn send_message(state: &RouterState, params: &serde_json::Value) -> Result<(), RelayError> {
    let (Some(session_id), Some(role)) = (
        non_empty_str(params, "sessionId"),
        non_empty_str(params, "role"),
    ) else {
        return Err(RelayError::missing("sessionId or role"));
    };
    let role: Role = role.parse().map_err(RelayError::InvalidRequest)?;
    let session_id = SessionId::from_raw(session_id);

    let trimmed = optional_str(params, "message").unwrap_or("").trim().to_string();
    let image_data_url = optional_str(params, "imageDataUrl")
        .filter(|url| url.starts_with("data:image/"))
        .map(str::to_string);

    // Either text or an image must be present
    if trimmed.is_empty() && image_data_url.is_none() {
        return Err(RelayError::EmptyMessage);
    }

    let image_name = image_data_url
        .is_some()
        .then(|| optional_str(params, "imageName").map(str::to_string))
        .flatten();
    let tone = (role == Role::Wizard).then(|| {
        non_empty_str(params, "tone")
            .unwrap_or("Supportive")
            .to_string()
    });

    let msg = Message {
        id: MessageId::new(),
        timestamp: now_ms(),
        role,
        message: trimmed,
        tone,
        notes: None,
        image_data_url,
        image_name,
    };

    let (msg, log) = state.store.with_session(&session_id, |s| {
        let mut msg = msg;
        if msg.role == Role::Wizard {
            let row = LogRow {
                id: LogRowId::new(),
                timestamp: msg.timestamp,
                user_message: s.last_participant_text().to_string(),
                response: msg.message.clone(),
                image_name: msg.image_name.clone(),
                tone: msg.tone.clone().unwrap_or_default(),
                notes: String::new(),
                wizard_message_id: msg.id.clone(),
            };
            msg.notes = Some(row.notes.clone());
            s.log.push(row);
        }
        s.transcript.push(msg.clone());
        s.touch();
        (msg, s.log.clone())
    });

    broadcast(state, &session_id, ServerEvent::message(&session_id, &msg));
    broadcast(state, &session_id, ServerEvent::log_update(&session_id, &log));

    tracing::debug!(
        session_id = %session_id,
        message_id = %msg.id,
        role = %msg.role,
        "message accepted"
    );
    Ok(())
}

/// Overwrite a log row's notes and mirror them onto the linked wizard
/// transcript message, atomically within one session lock. Unknown log
/// ids are a silent no-op.
fn update_log_row(state: &RouterState, params: &serde_json::Value) -> Result<(), RelayError> {
    let (Some(session_id), Some(log_id)) = (
        non_empty_str(params, "sessionId"),
        non_empty_str(params, "logId"),
    ) else {
        return Err(RelayError::missing("sessionId or logId"));
    };
    let session_id = SessionId::from_raw(session_id);
    let log_id = LogRowId::from_raw(log_id);
    let notes = optional_str(params, "notes").map(str::to_string);

    let updated = state.store.with_session(&session_id, |s| {
        let row = s.log_row_mut(&log_id)?;
        if let Some(notes) = notes {
            row.notes = notes;
        }
        let mirrored = row.notes.clone();
        let wizard_id = row.wizard_message_id.clone();

        // The back-reference is a lookup key, not ownership: a missing
        // transcript message is tolerated.
        if let Some(msg) = s.message_mut(&wizard_id) {
            msg.notes = Some(mirrored);
        }
        s.touch();
        Some((s.log.clone(), s.transcript.clone()))
    });

    let Some((log, transcript)) = updated else {
        tracing::debug!(session_id = %session_id, log_id = %log_id, "log row not found");
        return Ok(());
    };

    broadcast(state, &session_id, ServerEvent::log_update(&session_id, &log));
    broadcast(
        state,
        &session_id,
        ServerEvent::state_patch_transcript(&session_id, &transcript),
    );
    Ok(())
}

/// Discard the session's transcript and log and fan out the fresh state.
fn reset_session(state: &RouterState, params: &serde_json::Value) -> Result<(), RelayError> {
    let Some(session_id) = non_empty_str(params, "sessionId") else {
        return Err(RelayError::missing("sessionId"));
    };
    let session_id = SessionId::from_raw(session_id);

    let snapshot = state.store.reset(&session_id);
    broadcast(state, &session_id, ServerEvent::state(&snapshot));

    tracing::info!(session_id = %session_id, "session reset");
    Ok(())
}
