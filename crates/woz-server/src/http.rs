//! REST surface for session provisioning, inspection, and export.
//!
//! Every session-addressed route treats an unknown id as "create empty";
//! there is no 404 path for sessions.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use woz_core::export::session_to_csv;
use woz_core::ids::SessionId;
use woz_core::session::Session;

use crate::server::AppState;

/// Condensed per-session view for the diagnostic listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub messages: usize,
    pub log_rows: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Session> for SessionSummary {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.session_id,
            messages: s.transcript.len(),
            log_rows: s.log.len(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// `POST /session/create` — provision a fresh server-generated session id.
pub async fn create_session(State(state): State<AppState>) -> Json<serde_json::Value> {
    let session = state.store.get_or_create(&SessionId::new());
    tracing::info!(session_id = %session.session_id, "session created via http");
    Json(serde_json::json!({ "sessionId": session.session_id }))
}

/// `GET /session/{id}/state` — full session snapshot.
pub async fn session_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Session> {
    Json(state.store.get_or_create(&SessionId::from_raw(id)))
}

/// `POST /session/{id}/reset` — discard transcript and log, return the
/// fresh state. Does not fan out to joined clients; the WebSocket
/// `reset_session` frame is the broadcasting path.
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Session> {
    let session = state.store.reset(&SessionId::from_raw(id));
    tracing::info!(session_id = %session.session_id, "session reset via http");
    Json(session)
}

/// `GET /session/{id}/export.csv` — transcript as a CSV attachment.
pub async fn export_csv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let session = state.store.get_or_create(&SessionId::from_raw(id));
    let csv = session_to_csv(&session);
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"session-{}.csv\"", session.session_id),
            ),
        ],
        csv,
    )
}

/// `GET /sessions` — summaries of every session held in memory.
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let mut summaries: Vec<SessionSummary> =
        state.store.list().into_iter().map(Into::into).collect();
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Json(summaries)
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
